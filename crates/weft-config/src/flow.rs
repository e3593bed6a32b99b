use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::edge::EdgeData;
use crate::node::NodeData;

/// The node/edge lists of a flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowData {
  #[serde(default)]
  pub nodes: Vec<NodeData>,
  #[serde(default)]
  pub edges: Vec<EdgeData>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// The nested flow carried by a group node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NestedFlow {
  pub data: FlowData,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl FlowData {
  pub fn new(nodes: Vec<NodeData>, edges: Vec<EdgeData>) -> Self {
    Self {
      nodes,
      edges,
      extra: Map::new(),
    }
  }

  /// Parse a flow from JSON.
  ///
  /// Accepts either a bare `{nodes, edges}` object or an exported flow
  /// document whose graph lives under `data`.
  pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
    let value: Value = serde_json::from_str(input)?;
    Self::from_value(value)
  }

  pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
    match value {
      Value::Object(mut document)
        if !document.contains_key("nodes") && document.get("data").is_some_and(Value::is_object) =>
      {
        let data = document.remove("data").unwrap_or(Value::Null);
        serde_json::from_value(data)
      }
      other => serde_json::from_value(other),
    }
  }

  pub fn node(&self, id: &str) -> Option<&NodeData> {
    self.nodes.iter().find(|node| node.id == id)
  }

  pub fn node_mut(&mut self, id: &str) -> Option<&mut NodeData> {
    self.nodes.iter_mut().find(|node| node.id == id)
  }

  /// Whether any node (at this level) is a group.
  pub fn has_groups(&self) -> bool {
    self.nodes.iter().any(NodeData::is_group)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_from_json_bare() {
    let flow = FlowData::from_json(r#"{ "nodes": [], "edges": [] }"#).unwrap();
    assert!(flow.nodes.is_empty());
  }

  #[test]
  fn test_from_json_exported_document() {
    let document = json!({
      "name": "Basic Prompting",
      "data": {
        "nodes": [{
          "id": "A",
          "data": { "type": "ChatInput", "node": { "template": {} } }
        }],
        "edges": []
      }
    });

    let flow = FlowData::from_json(&document.to_string()).unwrap();
    assert_eq!(flow.nodes.len(), 1);
    assert!(flow.node("A").is_some());
    assert!(!flow.has_groups());
  }

  #[test]
  fn test_from_json_invalid() {
    assert!(FlowData::from_json("{ not json").is_err());
  }
}
