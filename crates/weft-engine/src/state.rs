//! Typed run state.
//!
//! A [`StateModel`] declares named, typed fields. Some are bound to a vertex
//! output and fill in as the run builds that vertex; others are plain typed
//! slots the caller sets. [`StateModel::instantiate`] gives a fresh
//! [`StateRecord`] where every field is still undefined.

use std::fmt;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::warn;
use weft_graph::Graph;

use crate::result::VertexBuild;

/// State record shared between a run and its caller.
pub type SharedState = Arc<Mutex<StateRecord>>;

/// Errors raised when declaring or updating state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
  #[error("state field '{field}' binds unknown vertex '{vertex_id}'")]
  UnknownVertex { field: String, vertex_id: String },

  #[error("state field '{field}' binds unknown output '{output}' of vertex '{vertex_id}'")]
  UnknownOutput {
    field: String,
    vertex_id: String,
    output: String,
  },

  #[error("output '{output}' of vertex '{vertex_id}' declares no type for state field '{field}'")]
  UntypedOutput {
    field: String,
    vertex_id: String,
    output: String,
  },

  #[error("unsupported type '{type_name}' for state field '{field}'")]
  UnsupportedType { field: String, type_name: String },

  #[error("default for state field '{field}' is not a {expected}")]
  DefaultMismatch { field: String, expected: ValueType },

  #[error("state field '{0}' declared twice")]
  DuplicateField(String),

  #[error("unknown state field '{0}'")]
  UnknownField(String),

  #[error("state field '{field}' expects {expected}, got {found}")]
  TypeMismatch {
    field: String,
    expected: ValueType,
    found: &'static str,
  },
}

/// Type of a state field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
  Str,
  Int,
  Float,
  Bool,
  Dict,
  List,
  Any,
  /// A component-level type such as `Message` or `Data`. Not checked.
  Named(String),
}

impl ValueType {
  /// Parse one of the supported plain type names.
  pub fn parse(name: &str) -> Option<Self> {
    match name {
      "str" => Some(ValueType::Str),
      "int" => Some(ValueType::Int),
      "float" => Some(ValueType::Float),
      "bool" => Some(ValueType::Bool),
      "dict" => Some(ValueType::Dict),
      "list" => Some(ValueType::List),
      "any" => Some(ValueType::Any),
      _ => None,
    }
  }

  /// The type a declared output type list maps to.
  fn of_output(types: &[String]) -> Option<Self> {
    match types {
      [] => None,
      [single] => Some(ValueType::parse(single).unwrap_or_else(|| ValueType::Named(single.clone()))),
      _ => Some(ValueType::Any),
    }
  }

  /// The narrowest type that holds `value`.
  pub fn of_value(value: &Value) -> Self {
    match value {
      Value::Null => ValueType::Any,
      Value::Bool(_) => ValueType::Bool,
      Value::Number(n) if n.is_f64() => ValueType::Float,
      Value::Number(_) => ValueType::Int,
      Value::String(_) => ValueType::Str,
      Value::Array(_) => ValueType::List,
      Value::Object(_) => ValueType::Dict,
    }
  }

  pub fn accepts(&self, value: &Value) -> bool {
    match (self, value) {
      (ValueType::Any | ValueType::Named(_), _) => true,
      (ValueType::Str, Value::String(_)) => true,
      (ValueType::Int, Value::Number(n)) => !n.is_f64(),
      (ValueType::Float, Value::Number(_)) => true,
      (ValueType::Bool, Value::Bool(_)) => true,
      (ValueType::Dict, Value::Object(_)) => true,
      (ValueType::List, Value::Array(_)) => true,
      _ => false,
    }
  }
}

impl fmt::Display for ValueType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ValueType::Str => f.write_str("str"),
      ValueType::Int => f.write_str("int"),
      ValueType::Float => f.write_str("float"),
      ValueType::Bool => f.write_str("bool"),
      ValueType::Dict => f.write_str("dict"),
      ValueType::List => f.write_str("list"),
      ValueType::Any => f.write_str("any"),
      ValueType::Named(name) => f.write_str(name),
    }
  }
}

fn kind_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "bool",
    Value::Number(n) if n.is_f64() => "float",
    Value::Number(_) => "int",
    Value::String(_) => "str",
    Value::Array(_) => "list",
    Value::Object(_) => "dict",
  }
}

/// A vertex output a state field follows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBinding {
  pub vertex_id: String,
  pub output: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateField {
  pub name: String,
  pub ty: ValueType,
  pub default: Option<Value>,
  pub binding: Option<OutputBinding>,
}

/// Declared shape of a run's state.
#[derive(Debug, Clone, PartialEq)]
pub struct StateModel {
  pub name: String,
  pub fields: IndexMap<String, StateField>,
}

impl StateModel {
  pub fn builder(name: impl Into<String>) -> StateModelBuilder {
    StateModelBuilder {
      model: StateModel {
        name: name.into(),
        fields: IndexMap::new(),
      },
    }
  }

  pub fn field(&self, name: &str) -> Option<&StateField> {
    self.fields.get(name)
  }

  /// A record with every field undefined.
  pub fn instantiate(&self) -> StateRecord {
    StateRecord {
      model: self.clone(),
      values: self
        .fields
        .keys()
        .map(|name| (name.clone(), StateValue::Undefined))
        .collect(),
    }
  }

  /// Convenience for a record shared with a run.
  pub fn shared(&self) -> SharedState {
    Arc::new(Mutex::new(self.instantiate()))
  }
}

/// Builds a [`StateModel`], validating every field as it is added.
#[derive(Debug, Clone)]
pub struct StateModelBuilder {
  model: StateModel,
}

impl StateModelBuilder {
  /// A field that follows `output` of `vertex_id`, typed by the output's
  /// declared return types.
  pub fn output(
    self,
    field: impl Into<String>,
    graph: &Graph,
    vertex_id: &str,
    output: &str,
  ) -> Result<Self, StateError> {
    let field = field.into();
    let Some(vertex) = graph.vertex(vertex_id) else {
      return Err(StateError::UnknownVertex {
        field,
        vertex_id: vertex_id.to_string(),
      });
    };
    let Some(declared) = vertex.output(output) else {
      return Err(StateError::UnknownOutput {
        field,
        vertex_id: vertex_id.to_string(),
        output: output.to_string(),
      });
    };
    let Some(ty) = ValueType::of_output(&declared.types) else {
      return Err(StateError::UntypedOutput {
        field,
        vertex_id: vertex_id.to_string(),
        output: output.to_string(),
      });
    };

    let binding = OutputBinding {
      vertex_id: vertex_id.to_string(),
      output: output.to_string(),
    };
    self.push(StateField {
      name: field,
      ty,
      default: None,
      binding: Some(binding),
    })
  }

  /// A field of a named plain type, optionally with a default.
  pub fn typed(
    self,
    field: impl Into<String>,
    type_name: &str,
    default: Option<Value>,
  ) -> Result<Self, StateError> {
    let field = field.into();
    let Some(ty) = ValueType::parse(type_name) else {
      return Err(StateError::UnsupportedType {
        field,
        type_name: type_name.to_string(),
      });
    };
    if let Some(default) = &default
      && !ty.accepts(default)
    {
      return Err(StateError::DefaultMismatch { field, expected: ty });
    }
    self.push(StateField {
      name: field,
      ty,
      default,
      binding: None,
    })
  }

  /// A field typed after its default value.
  pub fn value(self, field: impl Into<String>, default: Value) -> Result<Self, StateError> {
    let ty = ValueType::of_value(&default);
    self.push(StateField {
      name: field.into(),
      ty,
      default: Some(default),
      binding: None,
    })
  }

  pub fn build(self) -> StateModel {
    self.model
  }

  fn push(mut self, field: StateField) -> Result<Self, StateError> {
    if self.model.fields.contains_key(&field.name) {
      return Err(StateError::DuplicateField(field.name));
    }
    self.model.fields.insert(field.name.clone(), field);
    Ok(self)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
  Undefined,
  Defined(Value),
}

impl StateValue {
  pub fn as_value(&self) -> Option<&Value> {
    match self {
      StateValue::Defined(value) => Some(value),
      StateValue::Undefined => None,
    }
  }
}

/// Values of a [`StateModel`]'s fields.
#[derive(Debug, Clone, PartialEq)]
pub struct StateRecord {
  model: StateModel,
  values: IndexMap<String, StateValue>,
}

impl StateRecord {
  pub fn model(&self) -> &StateModel {
    &self.model
  }

  pub fn get(&self, field: &str) -> Result<&StateValue, StateError> {
    self
      .values
      .get(field)
      .ok_or_else(|| StateError::UnknownField(field.to_string()))
  }

  pub fn is_defined(&self, field: &str) -> bool {
    matches!(self.values.get(field), Some(StateValue::Defined(_)))
  }

  /// The field's value, else its declared default.
  pub fn value_or_default(&self, field: &str) -> Result<Option<&Value>, StateError> {
    match self.get(field)? {
      StateValue::Defined(value) => Ok(Some(value)),
      StateValue::Undefined => Ok(self.model.field(field).and_then(|f| f.default.as_ref())),
    }
  }

  /// Set a field, replacing any previous value.
  pub fn set(&mut self, field: &str, value: Value) -> Result<(), StateError> {
    let Some(declared) = self.model.field(field) else {
      return Err(StateError::UnknownField(field.to_string()));
    };
    if !declared.ty.accepts(&value) {
      return Err(StateError::TypeMismatch {
        field: field.to_string(),
        expected: declared.ty.clone(),
        found: kind_name(&value),
      });
    }
    self.values.insert(field.to_string(), StateValue::Defined(value));
    Ok(())
  }

  /// Store the outputs of `build` in the fields bound to them.
  ///
  /// Every output that ran is recorded, suppressed or not, and values are
  /// stored without the type check [`StateRecord::set`] applies: a `null`
  /// output is still a defined field. Returns the names of the fields set.
  pub fn apply(&mut self, build: &VertexBuild) -> Vec<String> {
    let bound: Vec<(String, String)> = self
      .model
      .fields
      .values()
      .filter_map(|field| {
        let binding = field.binding.as_ref()?;
        (binding.vertex_id == build.vertex_id).then(|| (field.name.clone(), binding.output.clone()))
      })
      .collect();

    let mut updated = Vec::new();
    for (field, output) in bound {
      let Some(built) = build.outputs.get(&output) else {
        continue;
      };
      if let Some(declared) = self.model.field(&field)
        && !built.value.is_null()
        && !declared.ty.accepts(&built.value)
      {
        warn!(
          field = %field,
          vertex_id = %build.vertex_id,
          expected = %declared.ty,
          found = kind_name(&built.value),
          "state_type_mismatch"
        );
      }
      self.values.insert(field.clone(), StateValue::Defined(built.value.clone()));
      updated.push(field);
    }
    updated
  }

  /// Defined fields as a JSON object, in declaration order.
  pub fn to_json(&self) -> Value {
    let map: Map<String, Value> = self
      .values
      .iter()
      .filter_map(|(name, value)| value.as_value().map(|v| (name.clone(), v.clone())))
      .collect();
    Value::Object(map)
  }
}
