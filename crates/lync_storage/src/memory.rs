//! In-memory store for testing.

use crate::error::{StorageError, StorageResult};
use crate::store::{validate_key, PersistedStore};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-memory store.
///
/// This store keeps all values in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral clients that don't need persistence
///
/// Writes can be switched off with [`InMemoryStore::set_read_only`] to
/// exercise durability-failure paths.
///
/// # Example
///
/// ```rust
/// use lync_storage::{InMemoryStore, PersistedStore};
///
/// let store = InMemoryStore::new();
/// store.set("terminal_context", b"{}").unwrap();
/// assert!(store.contains("terminal_context").unwrap());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    read_only: AtomicBool,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with pre-existing entries.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<u8>)>,
        K: Into<String>,
    {
        Self {
            entries: RwLock::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()),
            read_only: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent write fail with [`StorageError::ReadOnly`].
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.read_only.load(Ordering::SeqCst) {
            Err(StorageError::ReadOnly)
        } else {
            Ok(())
        }
    }
}

impl PersistedStore for InMemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        self.check_writable()?;
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.check_writable()?;
        self.entries.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn memory_set_and_get() {
        let store = InMemoryStore::new();
        store.set("routes", b"[1,2]").unwrap();

        assert_eq!(store.get("routes").unwrap(), Some(b"[1,2]".to_vec()));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn memory_last_writer_wins() {
        let store = InMemoryStore::new();
        store.set("routes", b"old").unwrap();
        store.set("routes", b"new").unwrap();

        assert_eq!(store.get("routes").unwrap(), Some(b"new".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn memory_remove() {
        let store = InMemoryStore::new();
        store.set("routes", b"x").unwrap();
        store.remove("routes").unwrap();
        store.remove("routes").unwrap();

        assert!(!store.contains("routes").unwrap());
    }

    #[test]
    fn memory_keys_sorted() {
        let store = InMemoryStore::new();
        store.set("b", b"").unwrap();
        store.set("a", b"").unwrap();

        assert_eq!(store.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn memory_read_only_rejects_writes() {
        let store = InMemoryStore::new();
        store.set("routes", b"kept").unwrap();
        store.set_read_only(true);

        assert!(matches!(store.set("routes", b"lost"), Err(StorageError::ReadOnly)));
        assert!(matches!(store.remove("routes"), Err(StorageError::ReadOnly)));
        assert_eq!(store.get("routes").unwrap(), Some(b"kept".to_vec()));

        store.set_read_only(false);
        store.set("routes", b"new").unwrap();
    }

    #[test]
    fn memory_invalid_key() {
        let store = InMemoryStore::new();
        assert!(matches!(store.set("a/b", b""), Err(StorageError::InvalidKey(_))));
    }

    #[test]
    fn memory_with_entries() {
        let store = InMemoryStore::with_entries([("routes", b"[]".to_vec())]);
        assert_eq!(store.get("routes").unwrap(), Some(b"[]".to_vec()));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn behaves_like_a_map(
                ops in prop::collection::vec(("[a-c]", prop::option::of(prop::collection::vec(any::<u8>(), 0..8))), 0..32)
            ) {
                let store = InMemoryStore::new();
                let mut model = BTreeMap::new();

                for (key, value) in ops {
                    match value {
                        Some(v) => {
                            store.set(&key, &v).unwrap();
                            model.insert(key, v);
                        }
                        None => {
                            store.remove(&key).unwrap();
                            model.remove(&key);
                        }
                    }
                }

                for key in ["a", "b", "c"] {
                    prop_assert_eq!(store.get(key).unwrap(), model.get(key).cloned());
                }
                prop_assert_eq!(store.keys().unwrap(), model.keys().cloned().collect::<Vec<_>>());
            }
        }
    }
}
