use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};
use weft_config::TemplateField;
use weft_graph::Graph;
use weft_storage::Storage;

use crate::error::ResolveError;
use crate::field::{
  FieldSpec, coerce_bool, coerce_float, coerce_int, coerce_str, is_truthy, kind_of, merge_dict,
};
use crate::literal::parse_literal;
use crate::params::{ParamValue, ResolvedParams, Upstream};
use crate::table::Table;

/// Resolver turns a vertex's edges and template into build parameters.
pub trait Resolver: Send + Sync {
  /// Resolve the parameters of `vertex_id`.
  ///
  /// This process:
  /// 1. Maps each inbound edge to an upstream reference
  /// 2. Coerces each remaining visible field by its declared type
  /// 3. Applies defaults to optional fields left without a value
  ///
  /// Fails without returning partial parameters.
  fn resolve(&self, graph: &Graph, vertex_id: &str) -> Result<ResolvedParams, ResolveError>;
}

/// Standard resolver implementation that resolves file fields against a
/// storage backend.
pub struct StandardResolver<S: Storage> {
  storage: S,
}

impl<S: Storage> StandardResolver<S> {
  /// Create a new resolver with the given storage.
  pub fn new(storage: S) -> Self {
    Self { storage }
  }

  /// Resolve a stored `namespace/file` path to a full storage path.
  ///
  /// A path without a directory part is taken as already resolved, and so is
  /// one the storage refuses.
  fn full_path(&self, vertex_id: &str, field_name: &str, file_path: &str) -> String {
    let path = Path::new(file_path);
    let namespace = path
      .parent()
      .and_then(Path::to_str)
      .filter(|dir| !dir.is_empty());
    let file_name = path.file_name().and_then(|name| name.to_str());

    let (Some(namespace), Some(file_name)) = (namespace, file_name) else {
      return file_path.to_string();
    };
    match self.storage.build_full_path(namespace, file_name) {
      Ok(full) => full.to_string_lossy().into_owned(),
      Err(e) => {
        warn!(
          vertex_id = %vertex_id,
          field = %field_name,
          error = %e,
          "file_path_unresolved"
        );
        file_path.to_string()
      }
    }
  }

  fn resolve_file(&self, vertex_id: &str, field_name: &str, field: &TemplateField) -> ParamValue {
    match field.file_path.as_deref().filter(|p| !p.is_empty()) {
      Some(file_path) => ParamValue::Value(Value::String(self.full_path(vertex_id, field_name, file_path))),
      None if field.required => {
        warn!(
          vertex_id = %vertex_id,
          field = %field_name,
          "required_file_missing"
        );
        ParamValue::Value(Value::Null)
      }
      None if field.is_list => ParamValue::Value(Value::Array(Vec::new())),
      None => ParamValue::Value(Value::Null),
    }
  }

  /// Resolve one template field by its declared type. `None` leaves the
  /// parameter unset.
  fn resolve_field(
    &self,
    vertex_id: &str,
    field_name: &str,
    field: &TemplateField,
  ) -> Result<Option<ParamValue>, ResolveError> {
    let value = &field.value;
    let param = match FieldSpec::of(&field.field_type) {
      FieldSpec::File => Some(self.resolve_file(vertex_id, field_name, field)),
      FieldSpec::Handle => None,
      FieldSpec::Code if field_name == "code" => Some(ParamValue::Value(value.clone())),
      FieldSpec::Code => match value {
        Value::Null => None,
        Value::String(source) => Some(ParamValue::Value(parse_literal(source).unwrap_or_else(|e| {
          debug!(
            vertex_id = %vertex_id,
            field = %field_name,
            error = %e,
            "code_literal_kept_raw"
          );
          value.clone()
        }))),
        other => Some(ParamValue::Value(other.clone())),
      },
      FieldSpec::Dict => merge_dict(value)
        .map_err(|found| ResolveError::InvalidDict {
          vertex_id: vertex_id.to_string(),
          field: field_name.to_string(),
          found,
        })?
        .map(ParamValue::Value),
      FieldSpec::Int => (!value.is_null()).then(|| ParamValue::Value(coerce_int(value))),
      FieldSpec::Float => (!value.is_null()).then(|| ParamValue::Value(coerce_float(value))),
      FieldSpec::Str => coerce_str(value).map(ParamValue::Value),
      FieldSpec::Bool => coerce_bool(value).map(ParamValue::Value),
      FieldSpec::Table => match value {
        Value::Null => None,
        Value::Array(records) => Some(ParamValue::Table(Table::from_records(records).ok_or_else(
          || ResolveError::InvalidTable {
            vertex_id: vertex_id.to_string(),
            field: field_name.to_string(),
            found: "list with non-record items",
          },
        )?)),
        other => {
          return Err(ResolveError::InvalidTable {
            vertex_id: vertex_id.to_string(),
            field: field_name.to_string(),
            found: kind_of(other),
          });
        }
      },
      FieldSpec::Literal => is_truthy(value).then(|| ParamValue::Value(value.clone())),
    };
    Ok(param)
  }
}

impl<S: Storage> Resolver for StandardResolver<S> {
  fn resolve(&self, graph: &Graph, vertex_id: &str) -> Result<ResolvedParams, ResolveError> {
    let vertex = graph
      .vertex(vertex_id)
      .ok_or_else(|| ResolveError::VertexNotFound(vertex_id.to_string()))?;
    let mut resolved = ResolvedParams::default();

    // Edge pass
    for edge in graph.inbound_edges(vertex_id) {
      let Some(field) = vertex.template.get(&edge.target_param) else {
        continue;
      };
      let upstream = Upstream {
        vertex_id: edge.source_id.clone(),
        output: edge.source_output.clone(),
      };

      if field.is_list {
        if let Some(ParamValue::UpstreamList(list)) = resolved.params.get_mut(&edge.target_param) {
          list.push(upstream);
        } else {
          resolved
            .params
            .insert(edge.target_param.clone(), ParamValue::UpstreamList(vec![upstream]));
        }
      } else if let Value::Object(map) = &field.value
        && map.len() == 1
        && let Some(key) = map.keys().next()
      {
        resolved.params.insert(
          edge.target_param.clone(),
          ParamValue::UpstreamMap {
            key: key.clone(),
            upstream,
          },
        );
      } else {
        resolved
          .params
          .insert(edge.target_param.clone(), ParamValue::Upstream(upstream));
      }
    }

    // Field pass
    for (field_name, field) in vertex.template.iter() {
      if field_name == "_type" || resolved.contains(field_name) {
        continue;
      }
      if !field.show && field_name != "code" {
        continue;
      }

      let spec = FieldSpec::of(&field.field_type);
      if field.load_from_db && spec.is_literal() && spec != FieldSpec::File {
        resolved.load_from_db.push(field_name.clone());
      }

      if let Some(param) = self.resolve_field(vertex_id, field_name, field)? {
        resolved.params.insert(field_name.clone(), param);
      }

      let unresolved = resolved
        .params
        .get(field_name)
        .is_none_or(ParamValue::is_null);
      if !unresolved {
        continue;
      }
      if field.required {
        resolved
          .params
          .insert(field_name.clone(), ParamValue::Value(Value::Null));
      } else if let Some(default) = field.default.as_ref().filter(|d| is_truthy(d)) {
        resolved
          .params
          .insert(field_name.clone(), ParamValue::Value(default.clone()));
      } else {
        resolved.params.shift_remove(field_name);
      }
    }

    Ok(resolved)
  }
}
