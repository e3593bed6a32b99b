use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use weft_config::FlowData;

use crate::error::GraphError;
use crate::flatten::flatten;
use crate::vertex::{Edge, Vertex};

/// Executable graph: an arena of vertices keyed by id plus a dependency index.
#[derive(Debug, Clone)]
pub struct Graph {
  /// Identity of the flow this graph was built from. Fresh per construction
  /// unless set with [`Graph::with_flow_id`].
  flow_id: String,
  vertices: IndexMap<String, Vertex>,
  edges: Vec<Edge>,
  /// vertex_id -> upstream vertex_ids, in first-edge order.
  predecessors: HashMap<String, Vec<String>>,
  /// vertex_id -> downstream vertex_ids, in first-edge order.
  successors: HashMap<String, Vec<String>>,
}

impl Graph {
  /// Flatten `flow` and build a validated graph from the result.
  pub fn from_flow(flow: &FlowData) -> Result<Self, GraphError> {
    let flat = flatten(flow)?;
    let vertices = flat.nodes.into_iter().map(Vertex::from_node).collect();
    let edges = flat.edges.into_iter().map(Edge::from_data).collect();
    Self::new(vertices, edges)
  }

  /// Build a graph from already-flat vertices and edges.
  pub fn new(vertices: Vec<Vertex>, edges: Vec<Edge>) -> Result<Self, GraphError> {
    let mut arena = IndexMap::with_capacity(vertices.len());
    for vertex in vertices {
      if arena.contains_key(&vertex.id) {
        return Err(GraphError::DuplicateVertex(vertex.id));
      }
      arena.insert(vertex.id.clone(), vertex);
    }

    for edge in &edges {
      let (Some(_), Some(target)) = (arena.get(&edge.source_id), arena.get(&edge.target_id)) else {
        return Err(GraphError::InvalidEdge {
          from: edge.source_id.clone(),
          to: edge.target_id.clone(),
        });
      };
      if !target.has_field(&edge.target_param) {
        return Err(GraphError::UnknownTargetField {
          vertex_id: edge.target_id.clone(),
          field: edge.target_param.clone(),
        });
      }
    }

    let mut graph = Self {
      flow_id: uuid::Uuid::new_v4().to_string(),
      vertices: arena,
      edges,
      predecessors: HashMap::new(),
      successors: HashMap::new(),
    };
    graph.rebuild_index();
    Ok(graph)
  }

  /// Recompute predecessors/successors from the current edge list.
  fn rebuild_index(&mut self) {
    let mut predecessors: HashMap<String, Vec<String>> = HashMap::new();
    let mut successors: HashMap<String, Vec<String>> = HashMap::new();

    // Initialize all vertices
    for id in self.vertices.keys() {
      predecessors.entry(id.clone()).or_default();
      successors.entry(id.clone()).or_default();
    }

    let mut seen = HashSet::new();
    for edge in &self.edges {
      if !seen.insert((edge.source_id.as_str(), edge.target_id.as_str())) {
        continue;
      }
      successors
        .entry(edge.source_id.clone())
        .or_default()
        .push(edge.target_id.clone());
      predecessors
        .entry(edge.target_id.clone())
        .or_default()
        .push(edge.source_id.clone());
    }

    self.predecessors = predecessors;
    self.successors = successors;
  }

  pub fn with_flow_id(mut self, flow_id: impl Into<String>) -> Self {
    self.flow_id = flow_id.into();
    self
  }

  pub fn flow_id(&self) -> &str {
    &self.flow_id
  }

  pub fn vertex(&self, id: &str) -> Option<&Vertex> {
    self.vertices.get(id)
  }

  /// Like [`Graph::vertex`] but failing with [`GraphError::VertexNotFound`].
  pub fn get_vertex(&self, id: &str) -> Result<&Vertex, GraphError> {
    self
      .vertices
      .get(id)
      .ok_or_else(|| GraphError::VertexNotFound(id.to_string()))
  }

  /// Find a vertex by id, falling back to display name.
  pub fn vertex_by_name(&self, name: &str) -> Option<&Vertex> {
    self
      .vertices
      .get(name)
      .or_else(|| self.vertices.values().find(|v| v.answers_to(name)))
  }

  pub fn contains(&self, id: &str) -> bool {
    self.vertices.contains_key(id)
  }

  /// Vertices in insertion order.
  pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
    self.vertices.values()
  }

  pub fn vertex_ids(&self) -> impl Iterator<Item = &str> {
    self.vertices.keys().map(String::as_str)
  }

  pub fn edges(&self) -> &[Edge] {
    &self.edges
  }

  /// Edges feeding `vertex_id`, in edge order.
  pub fn inbound_edges<'a>(&'a self, vertex_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
    self.edges.iter().filter(move |e| e.target_id == vertex_id)
  }

  /// Edges leaving `vertex_id`, in edge order.
  pub fn outbound_edges<'a>(&'a self, vertex_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
    self.edges.iter().filter(move |e| e.source_id == vertex_id)
  }

  /// Get upstream vertices for a given vertex.
  pub fn predecessors(&self, vertex_id: &str) -> &[String] {
    self
      .predecessors
      .get(vertex_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Get downstream vertices for a given vertex.
  pub fn successors(&self, vertex_id: &str) -> &[String] {
    self
      .successors
      .get(vertex_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  pub fn input_vertices(&self) -> impl Iterator<Item = &Vertex> {
    self.vertices.values().filter(|v| v.is_input)
  }

  pub fn output_vertices(&self) -> impl Iterator<Item = &Vertex> {
    self.vertices.values().filter(|v| v.is_output)
  }

  /// Remove a vertex and every edge touching it.
  pub fn remove_vertex(&mut self, id: &str) -> Result<Vertex, GraphError> {
    let vertex = self
      .vertices
      .shift_remove(id)
      .ok_or_else(|| GraphError::VertexNotFound(id.to_string()))?;
    self.edges.retain(|e| e.source_id != id && e.target_id != id);
    self.rebuild_index();
    Ok(vertex)
  }

  pub fn len(&self) -> usize {
    self.vertices.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vertices.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use weft_config::{EdgeData, NodeData, OutputDef, Template, TemplateField};

  fn node(id: &str) -> NodeData {
    NodeData::new(
      id,
      "Passthrough",
      Template::new()
        .with_field("input", TemplateField::new("str", json!("")))
        .with_field("extra", TemplateField::new("str", json!(""))),
    )
    .with_outputs(vec![OutputDef::new("out", &["str"])])
  }

  fn chain() -> FlowData {
    FlowData::new(
      vec![node("A"), node("B"), node("C")],
      vec![
        EdgeData::new("A", "out", "B", "input"),
        EdgeData::new("B", "out", "C", "input"),
      ],
    )
  }

  #[test]
  fn test_dependency_index() {
    let graph = Graph::from_flow(&chain()).unwrap();

    assert_eq!(graph.len(), 3);
    assert!(graph.predecessors("A").is_empty());
    assert_eq!(graph.predecessors("B"), &["A".to_string()]);
    assert_eq!(graph.successors("B"), &["C".to_string()]);
    assert!(graph.successors("missing").is_empty());
  }

  #[test]
  fn test_parallel_edges_indexed_once() {
    let mut flow = chain();
    flow.edges.push(EdgeData::new("A", "out", "B", "extra"));
    let graph = Graph::from_flow(&flow).unwrap();

    assert_eq!(graph.predecessors("B").len(), 1);
    assert_eq!(graph.inbound_edges("B").count(), 2);
  }

  #[test]
  fn test_dangling_edge_rejected() {
    let mut flow = chain();
    flow.edges.push(EdgeData::new("A", "out", "Z", "input"));

    let err = Graph::from_flow(&flow).unwrap_err();
    assert!(matches!(err, GraphError::InvalidEdge { ref to, .. } if to == "Z"));
  }

  #[test]
  fn test_unknown_target_field_rejected() {
    let mut flow = chain();
    flow.edges.push(EdgeData::new("A", "out", "C", "nope"));

    let err = Graph::from_flow(&flow).unwrap_err();
    assert!(matches!(
      err,
      GraphError::UnknownTargetField { ref vertex_id, ref field } if vertex_id == "C" && field == "nope"
    ));
  }

  #[test]
  fn test_duplicate_vertex_rejected() {
    let flow = FlowData::new(vec![node("A"), node("A")], vec![]);
    assert!(matches!(
      Graph::from_flow(&flow),
      Err(GraphError::DuplicateVertex(id)) if id == "A"
    ));
  }

  #[test]
  fn test_remove_vertex_rebuilds_index() {
    let mut graph = Graph::from_flow(&chain()).unwrap();
    let removed = graph.remove_vertex("B").unwrap();

    assert_eq!(removed.id, "B");
    assert!(graph.successors("A").is_empty());
    assert!(graph.predecessors("C").is_empty());
    assert!(graph.edges().is_empty());
    assert!(matches!(
      graph.remove_vertex("B"),
      Err(GraphError::VertexNotFound(_))
    ));
  }

  #[test]
  fn test_vertex_by_name() {
    let flow = FlowData::new(vec![node("A").with_display_name("First")], vec![]);
    let graph = Graph::from_flow(&flow).unwrap();

    assert_eq!(graph.vertex_by_name("First").unwrap().id, "A");
    assert_eq!(graph.vertex_by_name("A").unwrap().id, "A");
    assert!(graph.vertex_by_name("Second").is_none());
  }

  #[test]
  fn test_flow_id_distinct_per_graph() {
    let first = Graph::from_flow(&chain()).unwrap();
    let second = Graph::from_flow(&chain()).unwrap();

    assert_ne!(first.flow_id(), second.flow_id());
    assert_eq!(first.clone().flow_id(), first.flow_id());
    assert_eq!(second.with_flow_id("flow-1").flow_id(), "flow-1");
  }
}
