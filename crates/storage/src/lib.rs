//! Persistence surface for experiment state.
//!
//! Everything the engine remembers between page loads (visitor id,
//! registry, assignments, conversion logs) lives behind [`KeyValueStore`].
//! Values are JSON strings; the helpers below handle encoding.

#![warn(clippy::unwrap_used)]

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde::de::DeserializeOwned;
use serde::Serialize;
use splitline_core::config::{StorageBackend, StorageConfig};
use splitline_core::SplitlineResult;
use std::sync::Arc;

/// String key-value store that survives reloads for one visitor profile.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> SplitlineResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> SplitlineResult<()>;

    fn remove(&self, key: &str) -> SplitlineResult<()>;

    /// All keys starting with `prefix`, sorted.
    fn keys_with_prefix(&self, prefix: &str) -> SplitlineResult<Vec<String>>;
}

/// Read and decode a JSON value.
pub fn read_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> SplitlineResult<Option<T>> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encode and write a JSON value.
pub fn write_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> SplitlineResult<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

/// Open the backend selected by configuration.
pub fn open(config: &StorageConfig) -> SplitlineResult<Arc<dyn KeyValueStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::File => Ok(Arc::new(FileStore::open(&config.path)?)),
    }
}
