use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tabular value built from a list of records.
///
/// Columns are the union of the record keys in first-seen order; a record
/// missing a column holds `null` in that cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
  pub columns: Vec<String>,
  pub rows: Vec<Vec<Value>>,
}

impl Table {
  /// Build a table from records. Returns `None` if any item is not a record.
  pub fn from_records(records: &[Value]) -> Option<Self> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
      for key in record.as_object()?.keys() {
        if !columns.contains(key) {
          columns.push(key.clone());
        }
      }
    }

    let rows = records
      .iter()
      .filter_map(Value::as_object)
      .map(|record| {
        columns
          .iter()
          .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
          .collect()
      })
      .collect();

    Some(Self { columns, rows })
  }

  /// Back to a list of records.
  pub fn to_records(&self) -> Vec<Value> {
    self
      .rows
      .iter()
      .map(|row| {
        let record: Map<String, Value> = self.columns.iter().cloned().zip(row.iter().cloned()).collect();
        Value::Object(record)
      })
      .collect()
  }

  /// JSON form handed to components: `{"columns": [...], "rows": [[...]]}`.
  pub fn to_value(&self) -> Value {
    let mut out = Map::new();
    out.insert(
      "columns".to_string(),
      Value::Array(self.columns.iter().cloned().map(Value::String).collect()),
    );
    out.insert(
      "rows".to_string(),
      Value::Array(self.rows.iter().cloned().map(Value::Array).collect()),
    );
    Value::Object(out)
  }

  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_from_records_unions_columns() {
    let records = vec![json!({ "name": "ada", "age": 36 }), json!({ "name": "alan", "city": "london" })];
    let table = Table::from_records(&records).unwrap();

    assert_eq!(table.columns, vec!["name", "age", "city"]);
    assert_eq!(table.rows[0], vec![json!("ada"), json!(36), Value::Null]);
    assert_eq!(table.rows[1], vec![json!("alan"), Value::Null, json!("london")]);
    assert_eq!(table.len(), 2);
  }

  #[test]
  fn test_non_record_rejected() {
    assert!(Table::from_records(&[json!({ "a": 1 }), json!(3)]).is_none());
  }

  #[test]
  fn test_empty_table() {
    let table = Table::from_records(&[]).unwrap();
    assert!(table.is_empty());
    assert_eq!(table.to_value(), json!({ "columns": [], "rows": [] }));
  }

  #[test]
  fn test_to_records() {
    let records = vec![json!({ "a": 1, "b": 2 })];
    let table = Table::from_records(&records).unwrap();
    assert_eq!(table.to_records(), records);
  }
}
