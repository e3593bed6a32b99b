use std::collections::HashMap;

use async_trait::async_trait;

/// Lookup for stored variables referenced by `load_from_db` fields.
#[async_trait]
pub trait VariableStore: Send + Sync {
  async fn get(&self, name: &str) -> Option<String>;
}

/// In-memory variable store.
#[derive(Debug, Clone, Default)]
pub struct MemoryVariables {
  values: HashMap<String, String>,
}

impl MemoryVariables {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.insert(name, value);
    self
  }

  pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
    self.values.insert(name.into(), value.into());
  }
}

#[async_trait]
impl VariableStore for MemoryVariables {
  async fn get(&self, name: &str) -> Option<String> {
    self.values.get(name).cloned()
  }
}
