//! In-Memory Configuration Provider
//!
//! Useful for testing and code-defined configuration.

use std::collections::HashMap;
use std::sync::RwLock;

use super::ConfigResult;
use super::provider::ConfigProvider;

/// In-memory configuration provider
#[derive(Debug, Default)]
pub struct MemoryConfigProvider {
    data: RwLock<HashMap<String, String>>,
    name: String,
}

impl MemoryConfigProvider {
    /// Create a new empty memory provider
    pub fn new() -> Self {
        Self::named("memory")
    }

    /// Create a memory provider with a custom name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            name: name.into(),
        }
    }

    /// Create a memory provider with initial data
    pub fn from_data(data: HashMap<String, String>) -> Self {
        Self {
            data: RwLock::new(data),
            name: "memory".to_string(),
        }
    }

    /// Add an initial value during construction (builder pattern)
    pub fn value(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        data.insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        data.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.data.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ConfigProvider for MemoryConfigProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        let data = self.data.read().unwrap_or_else(|e| e.into_inner());
        Ok(data.get(key).cloned())
    }
}
