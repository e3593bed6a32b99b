use std::collections::{BTreeSet, HashMap};

use crate::error::GraphError;
use crate::graph::Graph;

impl Graph {
  /// Dependency-respecting order of the vertices in `scope` (all vertices
  /// when `None`). Ties are broken by vertex id.
  pub fn run_order(&self, scope: Option<&BTreeSet<String>>) -> Result<Vec<String>, GraphError> {
    Ok(self.layers(scope)?.into_iter().flatten().collect())
  }

  /// Group the vertices in `scope` into layers: every vertex sits in the
  /// layer after the last of its in-scope predecessors.
  ///
  /// Fails with [`GraphError::Cycle`] naming every vertex that could not be
  /// placed.
  pub fn layers(&self, scope: Option<&BTreeSet<String>>) -> Result<Vec<Vec<String>>, GraphError> {
    let members: BTreeSet<&str> = match scope {
      Some(scope) => scope
        .iter()
        .map(String::as_str)
        .filter(|id| self.contains(id))
        .collect(),
      None => self.vertex_ids().collect(),
    };

    let mut in_degree: HashMap<&str, usize> = members
      .iter()
      .map(|id| {
        let degree = self
          .predecessors(id)
          .iter()
          .filter(|p| members.contains(p.as_str()))
          .count();
        (*id, degree)
      })
      .collect();

    let mut layers = Vec::new();
    let mut current: Vec<&str> = members
      .iter()
      .copied()
      .filter(|id| in_degree.get(id) == Some(&0))
      .collect();
    let mut placed = 0;

    while !current.is_empty() {
      placed += current.len();
      let mut next = BTreeSet::new();
      for id in &current {
        for successor in self.successors(id) {
          if let Some(degree) = in_degree.get_mut(successor.as_str()) {
            *degree -= 1;
            if *degree == 0 {
              next.insert(successor.as_str());
            }
          }
        }
      }
      layers.push(current.iter().map(|id| id.to_string()).collect());
      current = next.into_iter().collect();
    }

    if placed < members.len() {
      let vertices = in_degree
        .into_iter()
        .filter(|(_, degree)| *degree > 0)
        .map(|(id, _)| id.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
      return Err(GraphError::Cycle { vertices });
    }

    Ok(layers)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use weft_config::{EdgeData, FlowData, NodeData, OutputDef, Template, TemplateField};

  fn node(id: &str) -> NodeData {
    NodeData::new(
      id,
      "X",
      Template::new().with_field("input", TemplateField::new("str", json!("")).list()),
    )
    .with_outputs(vec![OutputDef::new("out", &["str"])])
  }

  fn graph(ids: &[&str], edges: &[(&str, &str)]) -> Graph {
    let flow = FlowData::new(
      ids.iter().map(|id| node(id)).collect(),
      edges
        .iter()
        .map(|(from, to)| EdgeData::new(*from, "out", *to, "input"))
        .collect(),
    );
    Graph::from_flow(&flow).unwrap()
  }

  #[test]
  fn test_chain_order() {
    let graph = graph(&["C", "B", "A"], &[("A", "B"), ("B", "C")]);
    assert_eq!(graph.run_order(None).unwrap(), vec!["A", "B", "C"]);
  }

  #[test]
  fn test_ties_broken_by_id() {
    let graph = graph(&["z", "m", "a", "end"], &[("z", "end"), ("m", "end"), ("a", "end")]);
    let layers = graph.layers(None).unwrap();
    assert_eq!(layers, vec![vec!["a", "m", "z"], vec!["end"]]);
  }

  #[test]
  fn test_layers_wait_for_longest_path() {
    let graph = graph(&["A", "B", "C"], &[("A", "B"), ("B", "C"), ("A", "C")]);
    let layers = graph.layers(None).unwrap();
    assert_eq!(layers, vec![vec!["A"], vec!["B"], vec!["C"]]);
  }

  #[test]
  fn test_scoped_order_ignores_outside_predecessors() {
    let graph = graph(&["A", "B", "C"], &[("A", "B"), ("B", "C")]);
    let scope: BTreeSet<String> = ["B", "C"].iter().map(|s| s.to_string()).collect();
    assert_eq!(graph.run_order(Some(&scope)).unwrap(), vec!["B", "C"]);
  }

  #[test]
  fn test_cycle_detected() {
    let graph = graph(&["A", "B", "C", "D"], &[("A", "B"), ("B", "C"), ("C", "B"), ("C", "D")]);
    let err = graph.run_order(None).unwrap_err();
    match err {
      GraphError::Cycle { vertices } => assert_eq!(vertices, vec!["B", "C", "D"]),
      other => panic!("expected cycle, got {other:?}"),
    }
  }
}
