//! Visitor identity — one opaque id per store, generated once.

use crate::keys::StoreKeys;
use splitline_storage::KeyValueStore;
use tracing::{info, warn};
use uuid::Uuid;

/// Read the persisted visitor id, generating and persisting one if absent.
///
/// When the store is unavailable the freshly generated id is still
/// returned; it just won't survive a reload.
pub fn load_or_create(store: &dyn KeyValueStore, keys: &StoreKeys) -> String {
    let key = keys.visitor_id();
    match store.get(&key) {
        Ok(Some(id)) if !id.trim().is_empty() => return id,
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Failed to read visitor id, generating a new one"),
    }

    let id = Uuid::new_v4().to_string();
    match store.set(&key, &id) {
        Ok(()) => info!(visitor_id = %id, "Visitor id created"),
        Err(e) => warn!(error = %e, "Failed to persist visitor id"),
    }
    id
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use splitline_storage::MemoryStore;

    #[test]
    fn test_generated_once() {
        let store = MemoryStore::new();
        let keys = StoreKeys::new("ns");
        let first = load_or_create(&store, &keys);
        let second = load_or_create(&store, &keys);
        assert_eq!(first, second);
        assert_eq!(store.get("ns:visitor_id").unwrap(), Some(first));
    }

    #[test]
    fn test_existing_id_is_kept() {
        let store = MemoryStore::new();
        store.set("ns:visitor_id", "abc123").unwrap();
        assert_eq!(load_or_create(&store, &StoreKeys::new("ns")), "abc123");
    }

    #[test]
    fn test_blank_id_is_replaced() {
        let store = MemoryStore::new();
        store.set("ns:visitor_id", "  ").unwrap();
        let id = load_or_create(&store, &StoreKeys::new("ns"));
        assert!(Uuid::parse_str(&id).is_ok());
    }
}
