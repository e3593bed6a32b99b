use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::flow::FlowData;

/// Per-node template overrides, keyed by node id or display name.
pub type Tweaks = IndexMap<String, Map<String, Value>>;

/// Apply tweaks to a flow, including nodes nested inside groups.
///
/// A tweak for a `file` field sets its `file_path`; any other field gets its
/// `value` replaced. Fields the template does not declare are ignored.
/// Returns the number of nodes that were changed.
pub fn apply_tweaks(flow: &mut FlowData, tweaks: &Tweaks) -> usize {
  let mut tweaked = 0;
  for node in &mut flow.nodes {
    let overrides = tweaks.get(&node.id).or_else(|| {
      node
        .data
        .node
        .display_name
        .as_ref()
        .and_then(|name| tweaks.get(name))
    });

    if let Some(overrides) = overrides {
      let mut changed = false;
      for (field_name, value) in overrides {
        let Some(field) = node.data.node.template.get_mut(field_name) else {
          continue;
        };
        if field.field_type == "file"
          && let Some(path) = value.as_str()
        {
          field.file_path = Some(path.to_string());
        } else {
          field.value = value.clone();
        }
        changed = true;
      }
      if changed {
        tweaked += 1;
      }
    }

    if let Some(nested) = node.data.node.flow.as_mut() {
      tweaked += apply_tweaks(&mut nested.data, tweaks);
    }
  }
  tweaked
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{NodeData, Template, TemplateField};
  use serde_json::json;

  fn flow() -> FlowData {
    let prompt = NodeData::new(
      "Prompt-1",
      "Prompt",
      Template::new()
        .with_field("template", TemplateField::new("str", json!("Hello {name}")))
        .with_field("doc", TemplateField::new("file", Value::Null)),
    )
    .with_display_name("Greeting");

    FlowData::new(vec![prompt], vec![])
  }

  #[test]
  fn test_tweak_by_id() {
    let mut flow = flow();
    let mut tweaks = Tweaks::new();
    let mut fields = Map::new();
    fields.insert("template".to_string(), json!("Bye {name}"));
    tweaks.insert("Prompt-1".to_string(), fields);

    assert_eq!(apply_tweaks(&mut flow, &tweaks), 1);
    assert_eq!(
      flow.nodes[0].template().get("template").unwrap().value,
      json!("Bye {name}")
    );
  }

  #[test]
  fn test_tweak_by_display_name_sets_file_path() {
    let mut flow = flow();
    let mut tweaks = Tweaks::new();
    let mut fields = Map::new();
    fields.insert("doc".to_string(), json!("flow-1/report.pdf"));
    fields.insert("unknown".to_string(), json!(1));
    tweaks.insert("Greeting".to_string(), fields);

    assert_eq!(apply_tweaks(&mut flow, &tweaks), 1);
    let doc = flow.nodes[0].template().get("doc").unwrap();
    assert_eq!(doc.file_path.as_deref(), Some("flow-1/report.pdf"));
    assert_eq!(doc.value, Value::Null);
    assert!(!flow.nodes[0].template().contains("unknown"));
  }

  #[test]
  fn test_tweak_reaches_nested_nodes() {
    let inner = flow();
    let group = NodeData::new("Group-1", "Group", Template::new()).with_flow(inner);
    let mut outer = FlowData::new(vec![group], vec![]);

    let mut tweaks = Tweaks::new();
    let mut fields = Map::new();
    fields.insert("template".to_string(), json!("nested"));
    tweaks.insert("Prompt-1".to_string(), fields);

    assert_eq!(apply_tweaks(&mut outer, &tweaks), 1);
    let nested = &outer.nodes[0].data.node.flow.as_ref().unwrap().data;
    assert_eq!(nested.nodes[0].template().get("template").unwrap().value, json!("nested"));
  }
}
