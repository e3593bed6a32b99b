use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::table::Table;

/// Reference to an output of an upstream vertex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Upstream {
  pub vertex_id: String,
  /// `None` means the vertex's first output.
  pub output: Option<String>,
}

/// A resolved parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
  /// A literal value taken from the template.
  Value(Value),
  /// A table built from a list of records.
  Table(Table),
  /// The value of one upstream output.
  Upstream(Upstream),
  /// Upstream outputs collected into a list, in edge order.
  UpstreamList(Vec<Upstream>),
  /// One upstream output placed under `key` in a mapping.
  UpstreamMap { key: String, upstream: Upstream },
}

impl ParamValue {
  pub fn is_null(&self) -> bool {
    matches!(self, ParamValue::Value(Value::Null))
  }

  pub fn as_value(&self) -> Option<&Value> {
    match self {
      ParamValue::Value(value) => Some(value),
      _ => None,
    }
  }
}

/// A vertex's parameters, in template order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedParams {
  pub params: IndexMap<String, ParamValue>,
  /// Fields whose value names a stored variable.
  pub load_from_db: Vec<String>,
}

impl ResolvedParams {
  pub fn get(&self, name: &str) -> Option<&ParamValue> {
    self.params.get(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.params.contains_key(name)
  }

  /// Set a literal value, replacing whatever was resolved for `name`.
  pub fn set_value(&mut self, name: impl Into<String>, value: Value) {
    self.params.insert(name.into(), ParamValue::Value(value));
  }

  /// Every upstream reference, in parameter order.
  pub fn upstreams(&self) -> impl Iterator<Item = &Upstream> {
    self.params.values().flat_map(|param| match param {
      ParamValue::Upstream(upstream) | ParamValue::UpstreamMap { upstream, .. } => {
        std::slice::from_ref(upstream)
      }
      ParamValue::UpstreamList(list) => list.as_slice(),
      ParamValue::Value(_) | ParamValue::Table(_) => &[],
    })
  }

  /// Replace upstream references with values.
  ///
  /// `lookup` returns `None` for references that produced nothing usable
  /// (an inactive or suppressed source, or one outside the run); those are
  /// left out. A list keeps its remaining items in order.
  pub fn materialize<F>(&self, lookup: F) -> Map<String, Value>
  where
    F: Fn(&Upstream) -> Option<Value>,
  {
    let mut out = Map::new();
    for (name, param) in &self.params {
      let value = match param {
        ParamValue::Value(value) => Some(value.clone()),
        ParamValue::Table(table) => Some(table.to_value()),
        ParamValue::Upstream(upstream) => lookup(upstream),
        ParamValue::UpstreamList(list) => Some(Value::Array(list.iter().filter_map(&lookup).collect())),
        ParamValue::UpstreamMap { key, upstream } => lookup(upstream).map(|value| {
          let mut map = Map::new();
          map.insert(key.clone(), value);
          Value::Object(map)
        }),
      };
      if let Some(value) = value {
        out.insert(name.clone(), value);
      }
    }
    out
  }
}
