use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
  #[error("vertex not found: {0}")]
  VertexNotFound(String),

  #[error("duplicate vertex id: {0}")]
  DuplicateVertex(String),

  #[error("edge references unknown vertex: from={from}, to={to}")]
  InvalidEdge { from: String, to: String },

  #[error("edge into vertex {vertex_id} targets unknown field '{field}'")]
  UnknownTargetField { vertex_id: String, field: String },

  #[error("group {group_id} has no interior target for field '{field}'")]
  MissingProxyTarget { group_id: String, field: String },

  #[error("edge into group {group_id} field '{field}' has no target handle type")]
  MissingHandleType { group_id: String, field: String },

  #[error("group {group_id} has no sink vertex to take its outgoing edges")]
  NoGroupSink { group_id: String },

  #[error("cycle detected among vertices: {}", .vertices.join(", "))]
  Cycle { vertices: Vec<String> },
}
