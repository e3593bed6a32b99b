use serde_json::{Map, Number, Value};

/// How a template field's declared type is resolved.
///
/// [`FieldSpec::of`] is the one place a type name is mapped to its handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSpec {
  /// A stored file; `file_path` is resolved against the storage root.
  File,
  /// Source text. The field named `code` passes through, others are parsed as
  /// a literal.
  Code,
  /// A mapping, or a list of mappings to merge.
  Dict,
  Int,
  Float,
  /// Text with `\n`, `\t` and `\r` escapes unescaped.
  Str,
  Bool,
  /// A list of records turned into a [`crate::Table`].
  Table,
  /// Other literal types, passed through when truthy.
  Literal,
  /// A component-typed input that can only be fed through an edge.
  Handle,
}

impl FieldSpec {
  pub fn of(field_type: &str) -> Self {
    match field_type {
      "file" => FieldSpec::File,
      "code" => FieldSpec::Code,
      "dict" | "NestedDict" => FieldSpec::Dict,
      "int" => FieldSpec::Int,
      "float" | "slider" => FieldSpec::Float,
      "str" => FieldSpec::Str,
      "bool" => FieldSpec::Bool,
      "table" => FieldSpec::Table,
      "Any" | "prompt" | "tab" | "link" | "query" | "sortableList" | "tools" | "mcp" | "auth"
      | "connect" | "model" => FieldSpec::Literal,
      _ => FieldSpec::Handle,
    }
  }

  /// Whether the field's value comes from the template at all.
  pub fn is_literal(&self) -> bool {
    !matches!(self, FieldSpec::Handle)
  }
}

/// JSON kind name, for error messages.
pub(crate) fn kind_of(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "bool",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "list",
    Value::Object(_) => "mapping",
  }
}

pub(crate) fn is_truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
    Value::String(s) => !s.is_empty(),
    Value::Array(items) => !items.is_empty(),
    Value::Object(map) => !map.is_empty(),
  }
}

/// Integer coercion; anything that does not convert is kept as-is.
pub(crate) fn coerce_int(value: &Value) -> Value {
  match value {
    Value::Number(n) if n.is_i64() || n.is_u64() => value.clone(),
    Value::Number(n) => n
      .as_f64()
      .map(|f| Value::Number((f.trunc() as i64).into()))
      .unwrap_or_else(|| value.clone()),
    Value::Bool(b) => Value::Number(i64::from(*b).into()),
    Value::String(s) => s
      .trim()
      .parse::<i64>()
      .map(|i| Value::Number(i.into()))
      .unwrap_or_else(|_| value.clone()),
    _ => value.clone(),
  }
}

/// Float coercion; anything that does not convert is kept as-is.
pub(crate) fn coerce_float(value: &Value) -> Value {
  let float = match value {
    Value::Number(n) => n.as_f64(),
    Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
    Value::String(s) => s.trim().parse::<f64>().ok(),
    _ => None,
  };
  float
    .and_then(Number::from_f64)
    .map(Value::Number)
    .unwrap_or_else(|| value.clone())
}

/// Boolean coercion. A string is true when non-empty, whatever it says.
/// Other kinds leave the field unset.
pub(crate) fn coerce_bool(value: &Value) -> Option<Value> {
  match value {
    Value::Bool(_) => Some(value.clone()),
    Value::String(s) => Some(Value::Bool(!s.is_empty())),
    _ => None,
  }
}

/// Replace escaped newline, tab and carriage return sequences.
pub(crate) fn unescape(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut chars = text.chars().peekable();
  while let Some(c) = chars.next() {
    if c == '\\' {
      let replacement = match chars.peek() {
        Some('n') => Some('\n'),
        Some('t') => Some('\t'),
        Some('r') => Some('\r'),
        _ => None,
      };
      if let Some(replacement) = replacement {
        chars.next();
        out.push(replacement);
        continue;
      }
    }
    out.push(c);
  }
  out
}

/// String coercion. Lists are unescaped element-wise and a data mapping
/// contributes its `text`. Returns `None` when there is nothing to set.
pub(crate) fn coerce_str(value: &Value) -> Option<Value> {
  match value {
    Value::String(s) => Some(Value::String(unescape(s))),
    Value::Array(items) => Some(Value::Array(
      items
        .iter()
        .map(|item| match item {
          Value::String(s) => Value::String(unescape(s)),
          other => other.clone(),
        })
        .collect(),
    )),
    Value::Object(map) => map
      .get("text")
      .and_then(Value::as_str)
      .map(|text| Value::String(unescape(text))),
    Value::Null => None,
    other => Some(other.clone()),
  }
}

/// Dict resolution: a mapping is used as-is, a list of mappings is merged in
/// order. Errors with the kind of the first offending list item.
pub(crate) fn merge_dict(value: &Value) -> Result<Option<Value>, &'static str> {
  match value {
    Value::Object(_) => Ok(Some(value.clone())),
    Value::Array(items) => {
      let mut merged = Map::new();
      for item in items {
        let Value::Object(map) = item else {
          return Err(kind_of(item));
        };
        merged.extend(map.clone());
      }
      Ok(Some(Value::Object(merged)))
    }
    _ => Ok(None),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_dispatch() {
    assert_eq!(FieldSpec::of("file"), FieldSpec::File);
    assert_eq!(FieldSpec::of("NestedDict"), FieldSpec::Dict);
    assert_eq!(FieldSpec::of("slider"), FieldSpec::Float);
    assert_eq!(FieldSpec::of("prompt"), FieldSpec::Literal);
    assert_eq!(FieldSpec::of("LanguageModel"), FieldSpec::Handle);
    assert!(!FieldSpec::of("Message").is_literal());
    assert!(FieldSpec::of("table").is_literal());
  }

  #[test]
  fn test_coerce_int() {
    assert_eq!(coerce_int(&json!(7)), json!(7));
    assert_eq!(coerce_int(&json!(3.9)), json!(3));
    assert_eq!(coerce_int(&json!(" 12 ")), json!(12));
    assert_eq!(coerce_int(&json!(true)), json!(1));
    assert_eq!(coerce_int(&json!("twelve")), json!("twelve"));
    assert_eq!(coerce_int(&json!("1.5")), json!("1.5"));
  }

  #[test]
  fn test_coerce_float() {
    assert_eq!(coerce_float(&json!(2)), json!(2.0));
    assert_eq!(coerce_float(&json!("0.25")), json!(0.25));
    assert_eq!(coerce_float(&json!("warm")), json!("warm"));
    assert_eq!(coerce_float(&json!([1])), json!([1]));
  }

  #[test]
  fn test_coerce_bool() {
    assert_eq!(coerce_bool(&json!(true)), Some(json!(true)));
    assert_eq!(coerce_bool(&json!(false)), Some(json!(false)));
    assert_eq!(coerce_bool(&json!("false")), Some(json!(true)));
    assert_eq!(coerce_bool(&json!("yes")), Some(json!(true)));
    assert_eq!(coerce_bool(&json!("")), Some(json!(false)));
    assert_eq!(coerce_bool(&json!(0)), None);
    assert_eq!(coerce_bool(&json!([true])), None);
  }

  #[test]
  fn test_unescape() {
    assert_eq!(unescape(r"line\nnext\ttab\r"), "line\nnext\ttab\r");
    assert_eq!(unescape(r"keep \d and \\"), r"keep \d and \\");
    assert_eq!(unescape("trailing\\"), "trailing\\");
  }

  #[test]
  fn test_coerce_str() {
    assert_eq!(coerce_str(&json!(r"a\nb")), Some(json!("a\nb")));
    assert_eq!(coerce_str(&json!([r"x\ty", 3])), Some(json!(["x\ty", 3])));
    assert_eq!(coerce_str(&json!({ "text": r"hi\n" })), Some(json!("hi\n")));
    assert_eq!(coerce_str(&json!({ "other": 1 })), None);
    assert_eq!(coerce_str(&Value::Null), None);
  }

  #[test]
  fn test_merge_dict() {
    assert_eq!(
      merge_dict(&json!([{ "a": 1 }, { "b": 2, "a": 3 }])),
      Ok(Some(json!({ "a": 3, "b": 2 })))
    );
    assert_eq!(merge_dict(&json!({ "k": "v" })), Ok(Some(json!({ "k": "v" }))));
    assert_eq!(merge_dict(&json!("nope")), Ok(None));
    assert_eq!(merge_dict(&json!([{ "a": 1 }, 5])), Err("number"));
  }
}
