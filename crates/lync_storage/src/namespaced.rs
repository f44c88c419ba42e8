//! Key-prefixing wrapper.

use crate::error::StorageResult;
use crate::store::{validate_key, PersistedStore};

/// A view of another store in which every key carries a fixed prefix.
///
/// Lets the event queue and the fetch cache share one underlying store
/// without their keys colliding. `keys()` lists only this namespace, with the
/// prefix stripped.
#[derive(Debug)]
pub struct Namespaced<S> {
    inner: S,
    prefix: String,
}

impl<S: PersistedStore> Namespaced<S> {
    /// Wraps `inner` so that every key is prefixed with `prefix`.
    pub fn new(inner: S, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }

    /// Returns the prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn full_key(&self, key: &str) -> StorageResult<String> {
        validate_key(key)?;
        Ok(format!("{}{}", self.prefix, key))
    }
}

impl<S: PersistedStore> PersistedStore for Namespaced<S> {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(&self.full_key(key)?)
    }

    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.inner.set(&self.full_key(key)?, value)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.inner.remove(&self.full_key(key)?)
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self
            .inner
            .keys()?
            .into_iter()
            .filter_map(|k| k.strip_prefix(self.prefix.as_str()).map(str::to_string))
            .filter(|k| !k.is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use std::sync::Arc;

    #[test]
    fn namespaced_prefixes_keys() {
        let base = Arc::new(InMemoryStore::new());
        let cache = Namespaced::new(Arc::clone(&base), "lync_db_");

        cache.set("routes", b"[]").unwrap();

        assert_eq!(base.get("lync_db_routes").unwrap(), Some(b"[]".to_vec()));
        assert_eq!(cache.get("routes").unwrap(), Some(b"[]".to_vec()));
        assert_eq!(base.get("routes").unwrap(), None);
    }

    #[test]
    fn namespaced_keys_only_lists_own() {
        let base = Arc::new(InMemoryStore::new());
        base.set("lyncapp_event_queue", b"[]").unwrap();
        let cache = Namespaced::new(Arc::clone(&base), "lync_db_");
        cache.set("routes", b"[]").unwrap();
        cache.set("seats_v1", b"[]").unwrap();

        assert_eq!(
            cache.keys().unwrap(),
            vec!["routes".to_string(), "seats_v1".to_string()]
        );
    }

    #[test]
    fn namespaced_remove() {
        let cache = Namespaced::new(InMemoryStore::new(), "ns_");
        cache.set("k", b"v").unwrap();
        cache.remove("k").unwrap();
        assert!(!cache.contains("k").unwrap());
        assert_eq!(cache.prefix(), "ns_");
        assert!(cache.inner().is_empty());
    }
}
