use serde::{Deserialize, Serialize};
use weft_config::{EdgeData, NodeData, OutputDef, TargetHandle, Template};

/// A concrete component in an executable graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
  pub id: String,
  pub component_type: String,
  pub display_name: Option<String>,
  pub template: Template,
  pub outputs: Vec<OutputDef>,
  pub is_input: bool,
  pub is_output: bool,
  /// Frozen vertices reuse their first build result.
  pub frozen: bool,
  /// Group the vertex was spliced out of, if any.
  pub parent_node_id: Option<String>,
}

impl Vertex {
  pub fn from_node(node: NodeData) -> Self {
    let component_type = node.data.component_type;
    let spec = node.data.node;
    let is_input = spec
      .is_input
      .unwrap_or_else(|| component_type.ends_with("Input") || component_type == "Webhook");
    let is_output = spec
      .is_output
      .unwrap_or_else(|| component_type.ends_with("Output"));

    Self {
      id: node.id,
      component_type,
      display_name: spec.display_name,
      template: spec.template,
      outputs: spec.outputs,
      is_input,
      is_output,
      frozen: spec.frozen,
      parent_node_id: node.parent_node_id,
    }
  }

  /// Display name if set, otherwise the id.
  pub fn name(&self) -> &str {
    self.display_name.as_deref().unwrap_or(&self.id)
  }

  /// Whether `name` refers to this vertex by id or display name.
  pub fn answers_to(&self, name: &str) -> bool {
    self.id == name || self.display_name.as_deref() == Some(name)
  }

  pub fn output(&self, name: &str) -> Option<&OutputDef> {
    self.outputs.iter().find(|output| output.name == name)
  }

  pub fn has_field(&self, name: &str) -> bool {
    self.template.contains(name)
  }
}

/// A dependency between two vertices, feeding one output into one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
  pub source_id: String,
  pub target_id: String,
  /// Template field on the target that receives the value.
  pub target_param: String,
  /// Output on the source that produces the value. `None` means the
  /// source's first output.
  pub source_output: Option<String>,
  pub target_handle: TargetHandle,
}

impl Edge {
  pub fn from_data(edge: EdgeData) -> Self {
    let target_handle = edge.data.target_handle;
    Self {
      source_id: edge.source,
      target_id: edge.target,
      target_param: target_handle.field_name.clone(),
      source_output: edge.data.source_handle.name,
      target_handle,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use weft_config::TemplateField;

  #[test]
  fn test_io_flags_derived_from_type() {
    let chat = Vertex::from_node(NodeData::new("ChatInput-1", "ChatInput", Template::new()));
    assert!(chat.is_input);
    assert!(!chat.is_output);

    let hook = Vertex::from_node(NodeData::new("Webhook-1", "Webhook", Template::new()));
    assert!(hook.is_input);

    let out = Vertex::from_node(NodeData::new("ChatOutput-1", "ChatOutput", Template::new()));
    assert!(out.is_output);
  }

  #[test]
  fn test_explicit_flags_win() {
    let mut node = NodeData::new("Custom-1", "ChatInput", Template::new());
    node.data.node.is_input = Some(false);
    let vertex = Vertex::from_node(node);
    assert!(!vertex.is_input);
  }

  #[test]
  fn test_answers_to_id_and_display_name() {
    let node = NodeData::new(
      "Prompt-1",
      "Prompt",
      Template::new().with_field("template", TemplateField::new("str", "x".into())),
    )
    .with_display_name("Greeting");
    let vertex = Vertex::from_node(node);

    assert!(vertex.answers_to("Prompt-1"));
    assert!(vertex.answers_to("Greeting"));
    assert!(!vertex.answers_to("prompt-1"));
    assert_eq!(vertex.name(), "Greeting");
    assert!(vertex.has_field("template"));
  }

  #[test]
  fn test_edge_from_data() {
    let edge = Edge::from_data(EdgeData::new("A", "message", "B", "question"));
    assert_eq!(edge.source_id, "A");
    assert_eq!(edge.target_id, "B");
    assert_eq!(edge.target_param, "question");
    assert_eq!(edge.source_output.as_deref(), Some("message"));
  }
}
