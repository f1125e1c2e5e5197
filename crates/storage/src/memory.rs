//! In-process store backed by DashMap for lock-free concurrent access.
//! Used for tests, simulations, and server-side evaluation where nothing
//! has to outlive the process.

use crate::KeyValueStore;
use dashmap::DashMap;
use splitline_core::SplitlineResult;
use std::sync::Arc;

/// Volatile key-value store.
#[derive(Default, Clone)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry, as a visitor clearing site data would.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> SplitlineResult<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> SplitlineResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        metrics::counter!("storage.write").increment(1);
        Ok(())
    }

    fn remove(&self, key: &str) -> SplitlineResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> SplitlineResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
