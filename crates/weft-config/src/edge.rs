use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::template::ProxyRef;

/// An edge as exported by the flow editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  pub source: String,
  pub target: String,
  #[serde(default)]
  pub data: EdgeInfo,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeInfo {
  #[serde(rename = "sourceHandle", default)]
  pub source_handle: SourceHandle,
  #[serde(rename = "targetHandle", default)]
  pub target_handle: TargetHandle,
}

/// Describes which output of the source node an edge carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceHandle {
  #[serde(default)]
  pub id: String,
  /// Output name on the source node.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(rename = "dataType", default, skip_serializing_if = "Option::is_none")]
  pub data_type: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub output_types: Vec<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// Describes which template field of the target node an edge feeds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetHandle {
  #[serde(rename = "fieldName", default)]
  pub field_name: String,
  #[serde(default)]
  pub id: String,
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub field_type: Option<String>,
  #[serde(rename = "inputTypes", default, skip_serializing_if = "Option::is_none")]
  pub input_types: Option<Vec<String>>,
  /// Set when the target is a group: names the interior field this edge feeds.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub proxy: Option<ProxyRef>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl EdgeData {
  /// Create an edge from `source`'s `output` into `target`'s `field`.
  pub fn new(
    source: impl Into<String>,
    output: impl Into<String>,
    target: impl Into<String>,
    field: impl Into<String>,
  ) -> Self {
    let source = source.into();
    let target = target.into();
    Self {
      id: None,
      data: EdgeInfo {
        source_handle: SourceHandle {
          id: source.clone(),
          name: Some(output.into()),
          ..Default::default()
        },
        target_handle: TargetHandle {
          field_name: field.into(),
          id: target.clone(),
          field_type: Some("str".to_string()),
          ..Default::default()
        },
      },
      source,
      target,
      extra: Map::new(),
    }
  }

  /// Attach a proxy to the target handle (edges into a group).
  pub fn with_proxy(mut self, id: impl Into<String>, field: impl Into<String>) -> Self {
    self.data.target_handle.proxy = Some(ProxyRef {
      id: id.into(),
      field: field.into(),
    });
    self
  }

  pub fn field_name(&self) -> &str {
    &self.data.target_handle.field_name
  }

  pub fn source_output(&self) -> Option<&str> {
    self.data.source_handle.name.as_deref()
  }
}
