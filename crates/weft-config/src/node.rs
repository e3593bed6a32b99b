use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::flow::NestedFlow;
use crate::template::Template;

/// A node as exported by the flow editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
  pub id: String,
  /// Editor node kind (`genericNode`, `groupNode`, ...).
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub kind: Option<String>,
  pub data: NodeInfo,
  /// Set on nodes that were spliced out of a group during flattening.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub parent_node_id: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
  /// Component type name (`ChatInput`, `Prompt`, ...).
  #[serde(rename = "type", default)]
  pub component_type: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  pub node: NodeSpec,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
  #[serde(default)]
  pub template: Template,
  #[serde(default)]
  pub outputs: Vec<OutputDef>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub display_name: Option<String>,
  #[serde(default)]
  pub frozen: bool,
  /// Present only on group nodes.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub flow: Option<Box<NestedFlow>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub is_input: Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub is_output: Option<bool>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// A declared output of a component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputDef {
  pub name: String,
  /// Name of the component method that produces this output.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub method: Option<String>,
  /// Declared return types of the output method.
  #[serde(default)]
  pub types: Vec<String>,
  /// Outputs flagged here form the component's mutually exclusive branch
  /// group: once one of them is needed, all of them run.
  #[serde(default)]
  pub group_outputs: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub display_name: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl OutputDef {
  pub fn new(name: impl Into<String>, types: &[&str]) -> Self {
    let name = name.into();
    Self {
      method: Some(name.clone()),
      name,
      types: types.iter().map(|t| t.to_string()).collect(),
      ..Default::default()
    }
  }

  pub fn grouped(mut self) -> Self {
    self.group_outputs = true;
    self
  }
}

impl NodeData {
  /// Create a generic component node.
  pub fn new(id: impl Into<String>, component_type: impl Into<String>, template: Template) -> Self {
    Self {
      id: id.into(),
      kind: Some("genericNode".to_string()),
      data: NodeInfo {
        component_type: component_type.into(),
        id: None,
        node: NodeSpec {
          template,
          ..Default::default()
        },
        extra: Map::new(),
      },
      parent_node_id: None,
      extra: Map::new(),
    }
  }

  pub fn with_outputs(mut self, outputs: Vec<OutputDef>) -> Self {
    self.data.node.outputs = outputs;
    self
  }

  pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
    self.data.node.display_name = Some(name.into());
    self
  }

  /// Turn this node into a group wrapping `flow`.
  pub fn with_flow(mut self, flow: crate::FlowData) -> Self {
    self.kind = Some("groupNode".to_string());
    self.data.node.flow = Some(Box::new(NestedFlow {
      data: flow,
      extra: Map::new(),
    }));
    self
  }

  pub fn is_group(&self) -> bool {
    self.data.node.flow.is_some()
  }

  pub fn display_name(&self) -> Option<&str> {
    self.data.node.display_name.as_deref()
  }

  pub fn template(&self) -> &Template {
    &self.data.node.template
  }

  pub fn template_mut(&mut self) -> &mut Template {
    &mut self.data.node.template
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_deserialize_editor_node() {
    let node: NodeData = serde_json::from_value(json!({
      "id": "ChatInput-abc12",
      "type": "genericNode",
      "position": { "x": 10, "y": 20 },
      "data": {
        "type": "ChatInput",
        "id": "ChatInput-abc12",
        "node": {
          "display_name": "Chat Input",
          "template": {
            "_type": "Component",
            "input_value": { "type": "str", "value": "", "show": true }
          },
          "outputs": [
            { "name": "message", "method": "message_response", "types": ["Message"] }
          ]
        }
      }
    }))
    .unwrap();

    assert_eq!(node.id, "ChatInput-abc12");
    assert_eq!(node.data.component_type, "ChatInput");
    assert_eq!(node.display_name(), Some("Chat Input"));
    assert_eq!(node.data.node.outputs[0].types, vec!["Message"]);
    assert!(!node.is_group());
    assert_eq!(node.extra.get("position"), Some(&json!({ "x": 10, "y": 20 })));
  }

  #[test]
  fn test_group_outputs_default_false() {
    let output: OutputDef =
      serde_json::from_value(json!({ "name": "true_result", "types": ["Message"] })).unwrap();
    assert!(!output.group_outputs);
    assert!(output.method.is_none());
  }
}
