use thiserror::Error;

/// Errors that can occur while resolving a vertex's parameters.
#[derive(Debug, Error)]
pub enum ResolveError {
  /// The vertex is not part of the graph.
  #[error("vertex not found: {0}")]
  VertexNotFound(String),

  /// A table field held something other than a list of records.
  #[error("field '{field}' on vertex {vertex_id} must be a list of records to build a table, got {found}")]
  InvalidTable {
    vertex_id: String,
    field: String,
    found: &'static str,
  },

  /// A dict field held a list with something other than mappings in it.
  #[error("field '{field}' on vertex {vertex_id} can only merge mappings, got {found}")]
  InvalidDict {
    vertex_id: String,
    field: String,
    found: &'static str,
  },
}
