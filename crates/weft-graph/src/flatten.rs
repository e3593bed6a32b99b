//! Group flattening.
//!
//! A group node wraps a nested flow and exposes some interior fields through
//! `proxy` markers on its own template. Flattening splices the interior nodes
//! into the parent flow, retargets the edges that crossed the group boundary
//! and copies the group's field values onto the proxied interior fields.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, warn};
use weft_config::{FlowData, NodeData, ProxyRef, TargetHandle};

use crate::error::GraphError;

/// (group id, group field) -> (interior node id, interior field).
///
/// Built while flattening one level so the level above can follow proxies
/// that point at a group which no longer exists.
type ProxyAliases = HashMap<(String, String), (String, String)>;

/// Return a copy of `flow` with every group (at any depth) flattened away.
///
/// Flattening an already-flat flow returns an equal flow.
pub fn flatten(flow: &FlowData) -> Result<FlowData, GraphError> {
  flatten_level(flow).map(|(flat, _)| flat)
}

fn flatten_level(flow: &FlowData) -> Result<(FlowData, ProxyAliases), GraphError> {
  let mut flat = flow.clone();
  let mut aliases = ProxyAliases::new();
  let mut processed = HashSet::new();
  let mut queue: VecDeque<String> = flat.nodes.iter().map(|n| n.id.clone()).collect();

  while let Some(node_id) = queue.pop_front() {
    if !processed.insert(node_id.clone()) {
      continue;
    }
    let Some(group) = flat.node(&node_id).filter(|n| n.is_group()).cloned() else {
      continue;
    };
    let spliced = ungroup(&mut flat, &group, &mut aliases)?;
    queue.extend(spliced);
  }

  Ok((flat, aliases))
}

/// Replace `group` in `flow` by its (flattened) interior. Returns the ids of
/// the spliced nodes.
fn ungroup(
  flow: &mut FlowData,
  group: &NodeData,
  aliases: &mut ProxyAliases,
) -> Result<Vec<String>, GraphError> {
  let Some(nested) = group.data.node.flow.as_deref() else {
    return Ok(Vec::new());
  };
  let group_id = group.id.as_str();

  // Nested groups first, so the interior is flat before it is spliced.
  let (mut inner, inner_aliases) = flatten_level(&nested.data)?;

  for node in &mut inner.nodes {
    node.parent_node_id = Some(group_id.to_string());
    node.data.node.frozen = group.data.node.frozen;
  }

  let boundary = rewire_boundary_edges(flow, group, &inner, &inner_aliases)?;
  apply_proxied_fields(group, &mut inner, &inner_aliases, aliases)?;

  let spliced: Vec<String> = inner.nodes.iter().map(|n| n.id.clone()).collect();
  flow.nodes.retain(|n| n.id != group_id);
  flow.edges.retain(|e| e.source != group_id && e.target != group_id);
  flow.nodes.extend(inner.nodes);
  flow.edges.extend(inner.edges);
  flow.edges.extend(boundary);

  debug!(
    group_id = %group_id,
    interior = spliced.len(),
    "group_flattened"
  );
  Ok(spliced)
}

/// Resolve a proxy to an interior (node, field), following aliases left by
/// groups that were nested inside this one.
fn resolve_proxy(
  group_id: &str,
  field: &str,
  proxy: &ProxyRef,
  inner: &FlowData,
  inner_aliases: &ProxyAliases,
) -> Result<(String, String), GraphError> {
  let key = (proxy.id.clone(), proxy.field.clone());
  let (node_id, node_field) = inner_aliases.get(&key).cloned().unwrap_or(key);
  if inner.node(&node_id).is_none() {
    return Err(GraphError::MissingProxyTarget {
      group_id: group_id.to_string(),
      field: field.to_string(),
    });
  }
  Ok((node_id, node_field))
}

/// The interior node that takes over the group's outgoing edges: the first
/// node, in node order, with no outgoing interior edge.
fn find_sink(group_id: &str, inner: &FlowData) -> Result<String, GraphError> {
  let sources: HashSet<&str> = inner.edges.iter().map(|e| e.source.as_str()).collect();
  let sinks: Vec<&str> = inner
    .nodes
    .iter()
    .map(|n| n.id.as_str())
    .filter(|id| !sources.contains(id))
    .collect();

  match sinks.as_slice() {
    [] => Err(GraphError::NoGroupSink {
      group_id: group_id.to_string(),
    }),
    [only] => Ok(only.to_string()),
    [first, ..] => {
      warn!(
        group_id = %group_id,
        sinks = ?sinks,
        chosen = %first,
        "ambiguous_group_sink"
      );
      Ok(first.to_string())
    }
  }
}

fn rewire_boundary_edges(
  flow: &FlowData,
  group: &NodeData,
  inner: &FlowData,
  inner_aliases: &ProxyAliases,
) -> Result<Vec<weft_config::EdgeData>, GraphError> {
  let group_id = group.id.as_str();
  let mut sink: Option<String> = None;
  let mut rewired = Vec::new();

  for edge in flow
    .edges
    .iter()
    .filter(|e| e.source == group_id || e.target == group_id)
  {
    let mut edge = edge.clone();

    if edge.target == group_id {
      let handle = edge.data.target_handle.clone();
      let field = handle.field_name.clone();
      let proxy = handle
        .proxy
        .clone()
        .or_else(|| group.template().get(&field).and_then(|f| f.proxy.clone()))
        .ok_or_else(|| GraphError::MissingProxyTarget {
          group_id: group_id.to_string(),
          field: field.clone(),
        })?;
      let (target_id, target_field) =
        resolve_proxy(group_id, &field, &proxy, inner, inner_aliases)?;
      let field_type = handle
        .field_type
        .clone()
        .ok_or_else(|| GraphError::MissingHandleType {
          group_id: group_id.to_string(),
          field: field.clone(),
        })?;

      edge.data.target_handle = TargetHandle {
        field_name: target_field,
        id: target_id.clone(),
        field_type: Some(field_type),
        input_types: handle.input_types,
        proxy: None,
        extra: handle.extra,
      };
      edge.target = target_id;
      edge.extra.remove("targetHandle");
    }

    if edge.source == group_id {
      let sink_id = match &sink {
        Some(id) => id.clone(),
        None => {
          let id = find_sink(group_id, inner)?;
          sink = Some(id.clone());
          id
        }
      };
      edge.data.source_handle.id = sink_id.clone();
      edge.source = sink_id;
      edge.extra.remove("sourceHandle");
    }

    rewired.push(edge);
  }

  Ok(rewired)
}

/// Copy each proxied group field onto the interior field it stands in for.
///
/// The interior field takes the group's value, type, required flag, file path
/// and variable flag. It keeps its own visibility, and its own display name
/// unless the group field supplies one.
fn apply_proxied_fields(
  group: &NodeData,
  inner: &mut FlowData,
  inner_aliases: &ProxyAliases,
  aliases: &mut ProxyAliases,
) -> Result<(), GraphError> {
  let group_id = group.id.as_str();

  for (field_name, outer) in group.template().iter() {
    let Some(proxy) = &outer.proxy else {
      continue;
    };
    let (node_id, inner_field) = resolve_proxy(group_id, field_name, proxy, inner, inner_aliases)?;

    let target = inner
      .node_mut(&node_id)
      .and_then(|node| node.template_mut().get_mut(&inner_field))
      .ok_or_else(|| GraphError::MissingProxyTarget {
        group_id: group_id.to_string(),
        field: field_name.clone(),
      })?;

    target.value = outer.value.clone();
    if !outer.field_type.is_empty() {
      target.field_type = outer.field_type.clone();
    }
    target.required = outer.required;
    target.load_from_db = outer.load_from_db;
    if outer.file_path.is_some() {
      target.file_path = outer.file_path.clone();
    }
    if outer.display_name.is_some() {
      target.display_name = outer.display_name.clone();
    }

    aliases.insert(
      (group_id.to_string(), field_name.clone()),
      (node_id, inner_field),
    );
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use weft_config::{EdgeData, OutputDef, Template, TemplateField};

  fn component(id: &str) -> NodeData {
    NodeData::new(
      id,
      "Component",
      Template::new()
        .with_field("text", TemplateField::new("str", json!("inner")))
        .with_field("input", TemplateField::new("str", json!("")).list()),
    )
    .with_outputs(vec![OutputDef::new("out", &["str"])])
  }

  // Group G wraps X -> Y; its "text" field proxies X.text.
  fn grouped_flow() -> FlowData {
    let inner = FlowData::new(
      vec![component("X"), component("Y")],
      vec![EdgeData::new("X", "out", "Y", "input")],
    );
    let mut outer_field = TemplateField::new("str", json!("from outside")).with_proxy("X", "text");
    outer_field.display_name = Some("Outer Text".to_string());
    outer_field.show = false;
    let mut group = NodeData::new(
      "G",
      "Group",
      Template::new().with_field("text", outer_field),
    )
    .with_flow(inner);
    group.data.node.frozen = true;

    FlowData::new(
      vec![component("A"), group, component("Z")],
      vec![
        EdgeData::new("A", "out", "G", "text").with_proxy("X", "text"),
        EdgeData::new("G", "out", "Z", "input"),
      ],
    )
  }

  #[test]
  fn test_interior_nodes_spliced_and_tagged() {
    let flat = flatten(&grouped_flow()).unwrap();

    let ids: Vec<&str> = flat.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["A", "Z", "X", "Y"]);
    assert!(!flat.has_groups());

    for id in ["X", "Y"] {
      let node = flat.node(id).unwrap();
      assert_eq!(node.parent_node_id.as_deref(), Some("G"));
      assert!(node.data.node.frozen);
    }
    assert!(flat.node("A").unwrap().parent_node_id.is_none());
  }

  #[test]
  fn test_inbound_edge_retargeted_to_proxy() {
    let flat = flatten(&grouped_flow()).unwrap();

    let inbound = flat.edges.iter().find(|e| e.source == "A").unwrap();
    assert_eq!(inbound.target, "X");
    assert_eq!(inbound.data.target_handle.field_name, "text");
    assert_eq!(inbound.data.target_handle.id, "X");
    assert!(inbound.data.target_handle.proxy.is_none());
  }

  #[test]
  fn test_outbound_edge_resourced_to_sink() {
    let flat = flatten(&grouped_flow()).unwrap();

    let outbound = flat.edges.iter().find(|e| e.target == "Z").unwrap();
    assert_eq!(outbound.source, "Y");
    assert_eq!(outbound.data.source_handle.id, "Y");
    assert!(flat.edges.iter().all(|e| e.source != "G" && e.target != "G"));
  }

  #[test]
  fn test_proxied_field_takes_outer_value_keeps_visibility() {
    let flat = flatten(&grouped_flow()).unwrap();

    let field = flat.node("X").unwrap().template().get("text").unwrap();
    assert_eq!(field.value, json!("from outside"));
    assert!(field.show);
    assert_eq!(field.display_name.as_deref(), Some("Outer Text"));

    let untouched = flat.node("Y").unwrap().template().get("text").unwrap();
    assert_eq!(untouched.value, json!("inner"));
  }

  #[test]
  fn test_flat_flow_unchanged() {
    let flat = flatten(&grouped_flow()).unwrap();
    assert_eq!(flatten(&flat).unwrap(), flat);
  }

  #[test]
  fn test_input_not_mutated() {
    let flow = grouped_flow();
    let before = flow.clone();
    let _ = flatten(&flow).unwrap();
    assert_eq!(flow, before);
  }

  #[test]
  fn test_nested_groups_follow_aliases() {
    // Inner group H wraps X; its "text" proxies X.text.
    let inner_group = NodeData::new(
      "H",
      "Group",
      Template::new().with_field(
        "text",
        TemplateField::new("str", json!("middle")).with_proxy("X", "text"),
      ),
    )
    .with_flow(FlowData::new(vec![component("X")], vec![]));

    // Outer group G wraps H; its "text" proxies H.text.
    let outer_group = NodeData::new(
      "G",
      "Group",
      Template::new().with_field(
        "text",
        TemplateField::new("str", json!("top")).with_proxy("H", "text"),
      ),
    )
    .with_flow(FlowData::new(vec![inner_group], vec![]));

    let flow = FlowData::new(
      vec![component("A"), outer_group],
      vec![EdgeData::new("A", "out", "G", "text").with_proxy("H", "text")],
    );

    let flat = flatten(&flow).unwrap();
    let ids: Vec<&str> = flat.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["A", "X"]);
    assert_eq!(flat.edges[0].target, "X");
    assert_eq!(flat.edges[0].data.target_handle.field_name, "text");
    assert_eq!(
      flat.node("X").unwrap().template().get("text").unwrap().value,
      json!("top")
    );
  }

  #[test]
  fn test_missing_proxy_target_is_error() {
    let mut flow = grouped_flow();
    flow.edges[0] = EdgeData::new("A", "out", "G", "text").with_proxy("Missing", "text");

    let err = flatten(&flow).unwrap_err();
    assert!(matches!(
      err,
      GraphError::MissingProxyTarget { ref group_id, ref field } if group_id == "G" && field == "text"
    ));
  }

  #[test]
  fn test_missing_handle_type_is_error() {
    let mut flow = grouped_flow();
    flow.edges[0].data.target_handle.field_type = None;

    assert!(matches!(
      flatten(&flow),
      Err(GraphError::MissingHandleType { .. })
    ));
  }

  #[test]
  fn test_handle_without_proxy_falls_back_to_template() {
    let mut flow = grouped_flow();
    flow.edges[0].data.target_handle.proxy = None;

    let flat = flatten(&flow).unwrap();
    let inbound = flat.edges.iter().find(|e| e.source == "A").unwrap();
    assert_eq!(inbound.target, "X");
  }

  #[test]
  fn test_ambiguous_sink_picks_first() {
    let inner = FlowData::new(vec![component("X"), component("Y")], vec![]);
    let group = NodeData::new("G", "Group", Template::new()).with_flow(inner);
    let flow = FlowData::new(
      vec![group, component("Z")],
      vec![EdgeData::new("G", "out", "Z", "input")],
    );

    let flat = flatten(&flow).unwrap();
    let outbound = flat.edges.iter().find(|e| e.target == "Z").unwrap();
    assert_eq!(outbound.source, "X");
  }

  #[test]
  fn test_group_without_sink_is_error() {
    let inner = FlowData::new(
      vec![component("X"), component("Y")],
      vec![
        EdgeData::new("X", "out", "Y", "input"),
        EdgeData::new("Y", "out", "X", "input"),
      ],
    );
    let group = NodeData::new("G", "Group", Template::new()).with_flow(inner);
    let flow = FlowData::new(
      vec![group, component("Z")],
      vec![EdgeData::new("G", "out", "Z", "input")],
    );

    assert!(matches!(
      flatten(&flow),
      Err(GraphError::NoGroupSink { group_id }) if group_id == "G"
    ));
  }
}
