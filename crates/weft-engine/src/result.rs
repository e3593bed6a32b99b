use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::builder::BuildOutput;

/// Output name used for vertices that declare no outputs.
pub const DEFAULT_OUTPUT: &str = "result";

/// The result of building one vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexBuild {
  pub vertex_id: String,
  pub display_name: Option<String>,
  /// The materialized parameters the builder was given.
  pub inputs: Map<String, Value>,
  /// Built outputs, in declaration order.
  pub outputs: IndexMap<String, BuildOutput>,
  /// Whether the result came from the frozen-vertex cache.
  #[serde(default)]
  pub cached: bool,
}

impl VertexBuild {
  /// The named output, or the first one when `name` is `None`.
  pub fn output(&self, name: Option<&str>) -> Option<&BuildOutput> {
    match name {
      Some(name) => self.outputs.get(name),
      None => self.outputs.values().next(),
    }
  }

  /// Value of the named output.
  pub fn value(&self, name: &str) -> Option<&Value> {
    self.outputs.get(name).map(|output| &output.value)
  }
}

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
  pub run_id: String,
  /// Vertices in the order they were built.
  pub call_order: Vec<String>,
  /// Vertices skipped because every branch leading to them was suppressed.
  pub inactive: Vec<String>,
  /// Builds of the requested output vertices, in build order.
  pub outputs: Vec<VertexBuild>,
}

impl RunSummary {
  pub fn output_of(&self, vertex_id: &str) -> Option<&VertexBuild> {
    self.outputs.iter().find(|build| build.vertex_id == vertex_id)
  }
}

/// Items yielded by a run stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
  /// A vertex finished building.
  Built(VertexBuild),
  /// The run completed. Always the last item.
  Finished(RunSummary),
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn build() -> VertexBuild {
    let mut outputs = IndexMap::new();
    outputs.insert("true_result".to_string(), BuildOutput::new(json!("yes")));
    outputs.insert("false_result".to_string(), BuildOutput::suppressed(json!(null)));
    VertexBuild {
      vertex_id: "If-1".to_string(),
      display_name: None,
      inputs: Map::new(),
      outputs,
      cached: false,
    }
  }

  #[test]
  fn test_output_defaults_to_first() {
    let build = build();
    assert_eq!(build.output(None).unwrap().value, json!("yes"));
    assert!(build.output(Some("false_result")).unwrap().is_suppressed());
    assert!(build.output(Some("missing")).is_none());
    assert_eq!(build.value("true_result"), Some(&json!("yes")));
  }

  #[test]
  fn test_run_event_tagged() {
    let event = RunEvent::Finished(RunSummary {
      run_id: "r".to_string(),
      call_order: vec![],
      inactive: vec![],
      outputs: vec![],
    });
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["event"], json!("finished"));
  }
}
