use std::collections::{BTreeMap, BTreeSet};

use crate::traits::{StateStore, Transactional};

/// In-memory storage backend.
///
/// All data lives in a `BTreeMap`; nothing touches disk. This is the
/// stand-in for browser local storage in tests and prototypes.
///
/// # Example
///
/// ```
/// use coop_store::{MemoryStore, StateStore};
///
/// let mut store = MemoryStore::new();
/// store.put("app", "currentVersion", b"1.0.2").unwrap();
///
/// let data = store.get("app", "currentVersion").unwrap().unwrap();
/// assert_eq!(data, b"1.0.2");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    /// (namespace, key) -> value
    state: BTreeMap<(String, String), Vec<u8>>,
}

/// Error type for the in-memory backend.
///
/// This backend never actually fails, but the trait requires an error type.
#[derive(Debug, Clone, thiserror::Error)]
#[error("MemoryStore error: {0}")]
pub struct MemoryError(String);

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    fn ns_key(namespace: &str, key: &str) -> (String, String) {
        (namespace.to_string(), key.to_string())
    }
}

impl StateStore for MemoryStore {
    type Error = MemoryError;

    fn put(&mut self, namespace: &str, key: &str, value: &[u8]) -> Result<(), Self::Error> {
        self.state.insert(Self::ns_key(namespace, key), value.to_vec());
        Ok(())
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.state.get(&Self::ns_key(namespace, key)).cloned())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), Self::Error> {
        self.state.remove(&Self::ns_key(namespace, key));
        Ok(())
    }

    fn list_keys(&self, namespace: &str) -> Result<Vec<String>, Self::Error> {
        let keys = self
            .state
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, k)| k.clone())
            .collect();
        Ok(keys)
    }

    fn list_namespaces(&self) -> Result<Vec<String>, Self::Error> {
        let names: BTreeSet<&String> = self.state.keys().map(|(ns, _)| ns).collect();
        Ok(names.into_iter().cloned().collect())
    }

    fn exists(&self, namespace: &str, key: &str) -> Result<bool, Self::Error> {
        Ok(self.state.contains_key(&Self::ns_key(namespace, key)))
    }
}

impl Transactional for MemoryStore {
    fn transaction<F, R, E>(&mut self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut Self) -> Result<R, E>,
        E: From<Self::Error>,
    {
        let saved = self.state.clone();
        let result = f(self);
        if result.is_err() {
            self.state = saved;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_put_get_delete() {
        let mut store = MemoryStore::new();

        store.put("ns", "k1", b"hello").unwrap();
        assert_eq!(store.get("ns", "k1").unwrap(), Some(b"hello".to_vec()));

        store.put("ns", "k1", b"world").unwrap();
        assert_eq!(store.get("ns", "k1").unwrap(), Some(b"world".to_vec()));

        store.delete("ns", "k1").unwrap();
        assert_eq!(store.get("ns", "k1").unwrap(), None);

        // Deleting again is fine
        store.delete("ns", "k1").unwrap();
    }

    #[test]
    fn state_namespace_isolation() {
        let mut store = MemoryStore::new();
        store.put("a", "k1", b"alpha").unwrap();
        store.put("b", "k1", b"beta").unwrap();

        assert_eq!(store.get("a", "k1").unwrap(), Some(b"alpha".to_vec()));
        assert_eq!(store.get("b", "k1").unwrap(), Some(b"beta".to_vec()));
    }

    #[test]
    fn state_list_keys_and_namespaces() {
        let mut store = MemoryStore::new();
        store.put("ns", "b", b"2").unwrap();
        store.put("ns", "a", b"1").unwrap();
        store.put("other", "c", b"3").unwrap();

        assert_eq!(store.list_keys("ns").unwrap(), vec!["a", "b"]);
        assert_eq!(store.list_namespaces().unwrap(), vec!["ns", "other"]);
        assert!(store.list_keys("missing").unwrap().is_empty());
    }

    #[test]
    fn state_exists() {
        let mut store = MemoryStore::new();
        assert!(!store.exists("ns", "k").unwrap());
        store.put("ns", "k", b"v").unwrap();
        assert!(store.exists("ns", "k").unwrap());
    }

    #[test]
    fn info_counts_entries_and_bytes() {
        let mut store = MemoryStore::new();
        store.put("app", "patients", b"[]").unwrap();
        store.put("app", "currentVersion", b"1.0.2").unwrap();
        store.put("cache", "x", b"abc").unwrap();

        let info = store.info().unwrap();
        assert_eq!(info.total_entries, 3);
        assert_eq!(info.total_bytes, 2 + 5 + 3);
        assert_eq!(info.namespaces.len(), 2);
        assert_eq!(info.namespaces[0].name, "app");
        assert_eq!(info.namespaces[0].entry_count, 2);
        assert_eq!(info.namespaces[1].total_bytes, 3);
    }

    #[test]
    fn transaction_commit() {
        let mut store = MemoryStore::new();

        store
            .transaction(|s| -> Result<(), MemoryError> {
                s.put("ns", "k1", b"v1")?;
                s.put("ns", "k2", b"v2")?;
                Ok(())
            })
            .unwrap();

        assert_eq!(store.get("ns", "k1").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(store.get("ns", "k2").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn transaction_rollback() {
        let mut store = MemoryStore::new();
        store.put("ns", "k1", b"original").unwrap();

        let result: Result<(), MemoryError> = store.transaction(|s| {
            s.put("ns", "k1", b"modified")?;
            s.put("ns", "k2", b"new")?;
            Err(MemoryError("simulated".into()))
        });

        assert!(result.is_err());
        assert_eq!(store.get("ns", "k1").unwrap(), Some(b"original".to_vec()));
        assert_eq!(store.get("ns", "k2").unwrap(), None);
    }
}
