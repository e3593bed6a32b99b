//! Engine error types.

use weft_graph::GraphError;
use weft_resolver::ResolveError;

use crate::builder::BuildError;

/// Errors that can end a run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  /// The run was cancelled.
  #[error("run cancelled")]
  Cancelled,

  /// The run request is inconsistent (both start and stop, bad inputs, ...).
  #[error("invalid run request: {message}")]
  InvalidRequest { message: String },

  /// The graph cannot be run (unknown vertex, cycle, ...).
  #[error("invalid graph: {0}")]
  Graph(#[from] GraphError),

  /// A vertex's parameters could not be resolved.
  #[error("parameter resolution failed for vertex '{vertex_id}': {source}")]
  Resolution {
    vertex_id: String,
    #[source]
    source: ResolveError,
  },

  /// A field marked as a stored variable names a variable that does not exist.
  #[error("variable '{name}' for field '{field}' of vertex '{vertex_id}' not found")]
  VariableNotFound {
    vertex_id: String,
    field: String,
    name: String,
  },

  /// The component build failed.
  #[error("build failed for vertex '{vertex_id}' output '{output}': {source}")]
  Build {
    vertex_id: String,
    output: String,
    #[source]
    source: BuildError,
  },
}

impl EngineError {
  /// The vertex the error is attributed to, if any.
  pub fn vertex_id(&self) -> Option<&str> {
    match self {
      EngineError::Resolution { vertex_id, .. }
      | EngineError::VariableNotFound { vertex_id, .. }
      | EngineError::Build { vertex_id, .. } => Some(vertex_id),
      _ => None,
    }
  }
}
