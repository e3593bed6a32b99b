use std::collections::BTreeSet;

use crate::error::GraphError;
use crate::graph::Graph;

/// Input kinds in the order a run should prefer them as its entry point.
pub const DEFAULT_INPUT_PRIORITY: [&str; 2] = ["webhook", "chat"];

impl Graph {
  /// `vertex_id` plus every vertex it transitively depends on.
  ///
  /// The result is closed under predecessors.
  pub fn upstream_closure(&self, vertex_id: &str) -> Result<BTreeSet<String>, GraphError> {
    self.get_vertex(vertex_id)?;

    let mut visited = BTreeSet::new();
    let mut stack = vec![vertex_id.to_string()];
    while let Some(current) = stack.pop() {
      if !visited.insert(current.clone()) {
        continue;
      }
      stack.extend(
        self
          .predecessors(&current)
          .iter()
          .filter(|p| !visited.contains(*p))
          .cloned(),
      );
    }
    Ok(visited)
  }

  /// `vertex_id` plus every vertex transitively depending on it.
  ///
  /// Vertices that `vertex_id` itself depends on are excluded, so the run
  /// that starts at `vertex_id` never re-enters what was consumed upstream
  /// of it, even through a cycle.
  pub fn downstream_closure(&self, vertex_id: &str) -> Result<BTreeSet<String>, GraphError> {
    let mut excluded = self.upstream_closure(vertex_id)?;
    excluded.remove(vertex_id);

    let mut visited = BTreeSet::new();
    let mut stack = vec![vertex_id.to_string()];
    while let Some(current) = stack.pop() {
      if excluded.contains(&current) || !visited.insert(current.clone()) {
        continue;
      }
      stack.extend(
        self
          .successors(&current)
          .iter()
          .filter(|s| !visited.contains(*s) && !excluded.contains(*s))
          .cloned(),
      );
    }
    Ok(visited)
  }

  /// Pick the entry point among this graph's input vertices.
  pub fn entry_point<P: AsRef<str>>(&self, priority: &[P]) -> Option<&str> {
    let candidates: Vec<&str> = self.input_vertices().map(|v| v.id.as_str()).collect();
    find_entry_point(&candidates, priority)
  }
}

/// Return the first candidate whose id contains the highest-priority kind.
///
/// Matching is case-insensitive. Returns `None` when no candidate matches any
/// kind.
pub fn find_entry_point<'a, P: AsRef<str>>(candidates: &[&'a str], priority: &[P]) -> Option<&'a str> {
  let lowered: Vec<String> = candidates.iter().map(|c| c.to_lowercase()).collect();
  for kind in priority {
    let kind = kind.as_ref().to_lowercase();
    if let Some(index) = lowered.iter().position(|c| c.contains(&kind)) {
      return Some(candidates[index]);
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use weft_config::{EdgeData, FlowData, NodeData, OutputDef, Template, TemplateField};

  fn node(id: &str, component_type: &str) -> NodeData {
    NodeData::new(
      id,
      component_type,
      Template::new().with_field("input", TemplateField::new("str", json!("")).list()),
    )
    .with_outputs(vec![OutputDef::new("out", &["str"])])
  }

  // P -> A -> B -> C
  //      S ---^
  fn diamond() -> Graph {
    let flow = FlowData::new(
      vec![
        node("P", "X"),
        node("A", "X"),
        node("B", "X"),
        node("C", "X"),
        node("S", "X"),
      ],
      vec![
        EdgeData::new("P", "out", "A", "input"),
        EdgeData::new("A", "out", "B", "input"),
        EdgeData::new("S", "out", "B", "input"),
        EdgeData::new("B", "out", "C", "input"),
      ],
    );
    Graph::from_flow(&flow).unwrap()
  }

  fn set(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn test_upstream_closure() {
    let graph = diamond();
    assert_eq!(graph.upstream_closure("B").unwrap(), set(&["A", "B", "P", "S"]));
    assert_eq!(graph.upstream_closure("P").unwrap(), set(&["P"]));
  }

  #[test]
  fn test_downstream_closure_skips_ancestors() {
    let graph = diamond();
    assert_eq!(graph.downstream_closure("A").unwrap(), set(&["A", "B", "C"]));
    assert_eq!(graph.downstream_closure("C").unwrap(), set(&["C"]));
  }

  #[test]
  fn test_closure_unknown_vertex() {
    let graph = diamond();
    assert!(matches!(
      graph.upstream_closure("nope"),
      Err(GraphError::VertexNotFound(id)) if id == "nope"
    ));
    assert!(graph.downstream_closure("nope").is_err());
  }

  #[test]
  fn test_find_entry_point_priority() {
    let candidates = ["ChatInput-1", "Webhook-2", "TextInput-3"];
    assert_eq!(
      find_entry_point(&candidates, &DEFAULT_INPUT_PRIORITY),
      Some("Webhook-2")
    );
    assert_eq!(
      find_entry_point(&["ChatInput-1", "TextInput-3"], &DEFAULT_INPUT_PRIORITY),
      Some("ChatInput-1")
    );
    assert_eq!(find_entry_point(&["TextInput-3"], &DEFAULT_INPUT_PRIORITY), None);
  }

  #[test]
  fn test_find_entry_point_first_match_wins() {
    let candidates = ["chatinput-b", "ChatInput-a"];
    assert_eq!(find_entry_point(&candidates, &["chat"]), Some("chatinput-b"));
  }

  #[test]
  fn test_graph_entry_point_uses_input_vertices() {
    let flow = FlowData::new(
      vec![node("ChatInput-1", "ChatInput"), node("Prompt-1", "Prompt")],
      vec![EdgeData::new("ChatInput-1", "out", "Prompt-1", "input")],
    );
    let graph = Graph::from_flow(&flow).unwrap();
    assert_eq!(graph.entry_point(&DEFAULT_INPUT_PRIORITY), Some("ChatInput-1"));
  }
}
