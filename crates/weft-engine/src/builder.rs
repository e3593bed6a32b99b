//! The component build capability.
//!
//! The engine does not know what a component does. For every selected output
//! of a vertex it hands a [`ComponentBuilder`] the vertex, the output and the
//! materialized parameters, and gets back a value plus a routing decision.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use weft_config::OutputDef;
use weft_graph::Vertex;

/// Error returned by a component build.
pub type BuildError = Box<dyn std::error::Error + Send + Sync>;

/// Whether an output's value flows to the vertices wired to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
  #[default]
  Continue,
  /// The value was produced but the branch is not taken; downstream edges
  /// from this output are dead.
  Suppress,
}

/// The result of building one output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildOutput {
  pub value: Value,
  #[serde(default)]
  pub route: Route,
}

impl BuildOutput {
  pub fn new(value: Value) -> Self {
    Self {
      value,
      route: Route::Continue,
    }
  }

  /// A value that must not propagate downstream.
  pub fn suppressed(value: Value) -> Self {
    Self {
      value,
      route: Route::Suppress,
    }
  }

  pub fn is_suppressed(&self) -> bool {
    self.route == Route::Suppress
  }
}

/// Everything a builder gets to build one output of one vertex.
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
  pub run_id: &'a str,
  pub vertex: &'a Vertex,
  /// `None` for vertices that declare no outputs.
  pub output: Option<&'a OutputDef>,
  pub params: &'a Map<String, Value>,
}

impl BuildRequest<'_> {
  /// Name of the method that produces the requested output, if declared.
  pub fn method(&self) -> Option<&str> {
    self.output.and_then(|o| o.method.as_deref())
  }
}

/// Component build capability.
///
/// Implementations instantiate and run the component behind a vertex. An
/// error ends the run; the engine does not retry.
#[async_trait]
pub trait ComponentBuilder: Send + Sync {
  async fn build(&self, request: BuildRequest<'_>) -> Result<BuildOutput, BuildError>;
}

/// Builder that echoes a vertex's parameters back as every output.
///
/// Useful for dry runs that only need to see how values move through a flow.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughBuilder;

#[async_trait]
impl ComponentBuilder for PassthroughBuilder {
  async fn build(&self, request: BuildRequest<'_>) -> Result<BuildOutput, BuildError> {
    Ok(BuildOutput::new(Value::Object(request.params.clone())))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use weft_config::{NodeData, Template};

  #[tokio::test]
  async fn test_passthrough_echoes_params() {
    let vertex = Vertex::from_node(NodeData::new("A", "Echo", Template::new()));
    let output = OutputDef::new("text", &["str"]);
    let mut params = Map::new();
    params.insert("input_value".to_string(), json!("hi"));

    let request = BuildRequest {
      run_id: "run-1",
      vertex: &vertex,
      output: Some(&output),
      params: &params,
    };
    assert_eq!(request.method(), Some("text"));

    let built = PassthroughBuilder.build(request).await.unwrap();
    assert_eq!(built.value, json!({ "input_value": "hi" }));
    assert!(!built.is_suppressed());
  }

  #[test]
  fn test_route_serde() {
    let out = BuildOutput::suppressed(json!(1));
    let value = serde_json::to_value(&out).unwrap();
    assert_eq!(value, json!({ "value": 1, "route": "suppress" }));
  }
}
