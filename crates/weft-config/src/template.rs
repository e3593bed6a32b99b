use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Marker key a component template uses to carry its component type.
const TYPE_MARKER: &str = "_type";

/// Points a group template field at the interior node field it stands in for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyRef {
  pub id: String,
  pub field: String,
}

/// A single field descriptor inside a component template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateField {
  /// Declared field type (`str`, `int`, `file`, `table`, a component type, ...).
  #[serde(rename = "type", default)]
  pub field_type: String,
  #[serde(default)]
  pub value: Value,
  #[serde(default)]
  pub required: bool,
  #[serde(default)]
  pub show: bool,
  #[serde(default)]
  pub advanced: bool,
  /// Whether the field accepts a list of values (and a list of upstream edges).
  #[serde(rename = "list", default)]
  pub is_list: bool,
  /// Whether `value` names a stored variable rather than being the value itself.
  #[serde(default)]
  pub load_from_db: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub display_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub file_path: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub proxy: Option<ProxyRef>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl TemplateField {
  /// Create a visible field of the given type holding `value`.
  pub fn new(field_type: impl Into<String>, value: Value) -> Self {
    Self {
      field_type: field_type.into(),
      value,
      show: true,
      ..Default::default()
    }
  }

  pub fn required(mut self) -> Self {
    self.required = true;
    self
  }

  pub fn list(mut self) -> Self {
    self.is_list = true;
    self
  }

  pub fn hidden(mut self) -> Self {
    self.show = false;
    self
  }

  pub fn with_default(mut self, default: Value) -> Self {
    self.default = Some(default);
    self
  }

  pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
    self.file_path = Some(path.into());
    self
  }

  pub fn with_proxy(mut self, id: impl Into<String>, field: impl Into<String>) -> Self {
    self.proxy = Some(ProxyRef {
      id: id.into(),
      field: field.into(),
    });
    self
  }

  pub fn load_from_db(mut self) -> Self {
    self.load_from_db = true;
    self
  }
}

/// Ordered field name -> descriptor map of a component.
///
/// On the wire the template is a flat object; the `_type` marker is lifted
/// into [`Template::component_type`] and never treated as a field. Entries
/// that are not objects are not fields either and are dropped on load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Template {
  pub component_type: Option<String>,
  pub fields: IndexMap<String, TemplateField>,
}

impl Template {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add (or replace) a field, returning the template for chaining.
  pub fn with_field(mut self, name: impl Into<String>, field: TemplateField) -> Self {
    self.fields.insert(name.into(), field);
    self
  }

  pub fn get(&self, name: &str) -> Option<&TemplateField> {
    self.fields.get(name)
  }

  pub fn get_mut(&mut self, name: &str) -> Option<&mut TemplateField> {
    self.fields.get_mut(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.fields.contains_key(name)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &TemplateField)> {
    self.fields.iter()
  }
}

impl TryFrom<Map<String, Value>> for Template {
  type Error = serde_json::Error;

  fn try_from(raw: Map<String, Value>) -> Result<Self, Self::Error> {
    let mut template = Template::default();
    for (key, value) in raw {
      if key == TYPE_MARKER {
        template.component_type = value.as_str().map(str::to_string);
        continue;
      }
      if value.is_object() {
        let field: TemplateField = serde_json::from_value(value)?;
        template.fields.insert(key, field);
      }
    }
    Ok(template)
  }
}

impl From<Template> for Map<String, Value> {
  fn from(template: Template) -> Self {
    let mut raw = Map::new();
    if let Some(component_type) = template.component_type {
      raw.insert(TYPE_MARKER.to_string(), Value::String(component_type));
    }
    for (key, field) in template.fields {
      raw.insert(key, serde_json::to_value(field).unwrap_or(Value::Null));
    }
    raw
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_type_marker_is_not_a_field() {
    let template: Template = serde_json::from_value(json!({
      "_type": "ChatInput",
      "input_value": { "type": "str", "value": "hi", "show": true },
      "code": { "type": "code", "value": "class X: ...", "show": false }
    }))
    .unwrap();

    assert_eq!(template.component_type.as_deref(), Some("ChatInput"));
    assert_eq!(template.fields.len(), 2);
    assert!(!template.contains("_type"));
    assert_eq!(template.get("input_value").unwrap().value, json!("hi"));
  }

  #[test]
  fn test_field_order_preserved() {
    let template: Template = serde_json::from_value(json!({
      "zeta": { "type": "str" },
      "alpha": { "type": "int" },
      "mid": { "type": "bool" }
    }))
    .unwrap();

    let names: Vec<&str> = template.fields.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["zeta", "alpha", "mid"]);
  }

  #[test]
  fn test_non_object_entries_dropped() {
    let template: Template = serde_json::from_value(json!({
      "field": { "type": "str" },
      "stray": 42
    }))
    .unwrap();

    assert_eq!(template.fields.len(), 1);
  }

  #[test]
  fn test_unknown_field_keys_preserved() {
    let template: Template = serde_json::from_value(json!({
      "query": { "type": "str", "info": "search text", "input_types": ["Message"] }
    }))
    .unwrap();

    let field = template.get("query").unwrap();
    assert_eq!(field.extra.get("info"), Some(&json!("search text")));

    let back = serde_json::to_value(&template).unwrap();
    assert_eq!(back["query"]["input_types"], json!(["Message"]));
  }

  #[test]
  fn test_list_and_proxy_keys() {
    let field: TemplateField = serde_json::from_value(json!({
      "type": "str",
      "list": true,
      "proxy": { "id": "Prompt-1", "field": "template" }
    }))
    .unwrap();

    assert!(field.is_list);
    assert_eq!(
      field.proxy,
      Some(ProxyRef {
        id: "Prompt-1".to_string(),
        field: "template".to_string()
      })
    );
  }
}
