use std::fmt;

use serde::{Deserialize, Serialize};

/// Summary information about a stored namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceInfo {
    /// Name of the namespace.
    pub name: String,
    /// Number of keys stored in the namespace.
    pub entry_count: u64,
    /// Sum of the value sizes, in bytes.
    pub total_bytes: u64,
}

/// Summary information about the entire store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInfo {
    /// Total number of entries across all namespaces.
    pub total_entries: u64,
    /// Total size of all values, in bytes.
    pub total_bytes: u64,
    /// Per-namespace breakdown, sorted by name.
    pub namespaces: Vec<NamespaceInfo>,
}

/// Core trait for key-value persistence.
///
/// Every backend implements this trait. It provides simple key-value
/// operations scoped by a namespace (analogous to a table, or to a key
/// prefix in browser local storage).
///
/// Values are opaque bytes. The store does not interpret them; schema
/// versions and migrations are handled by `coop-migrate`.
pub trait StateStore {
    /// Error type for this backend.
    type Error: fmt::Debug + fmt::Display;

    /// Store a value under `(namespace, key)`, replacing any previous value.
    fn put(&mut self, namespace: &str, key: &str, value: &[u8]) -> Result<(), Self::Error>;

    /// Retrieve a value by `(namespace, key)`.
    /// Returns `None` if the key does not exist.
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Delete a value by `(namespace, key)`. Deleting a missing key is not an error.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), Self::Error>;

    /// List all keys in a namespace, sorted.
    fn list_keys(&self, namespace: &str) -> Result<Vec<String>, Self::Error>;

    /// List every namespace holding at least one key, sorted.
    fn list_namespaces(&self) -> Result<Vec<String>, Self::Error>;

    /// Check if a key exists in a namespace.
    fn exists(&self, namespace: &str, key: &str) -> Result<bool, Self::Error> {
        Ok(self.get(namespace, key)?.is_some())
    }

    /// Compute entry counts and sizes for every namespace.
    fn info(&self) -> Result<StoreInfo, Self::Error> {
        let mut info = StoreInfo::default();
        for name in self.list_namespaces()? {
            let keys = self.list_keys(&name)?;
            let mut total_bytes = 0u64;
            for key in &keys {
                if let Some(value) = self.get(&name, key)? {
                    total_bytes += value.len() as u64;
                }
            }
            info.total_entries += keys.len() as u64;
            info.total_bytes += total_bytes;
            info.namespaces.push(NamespaceInfo {
                name,
                entry_count: keys.len() as u64,
                total_bytes,
            });
        }
        Ok(info)
    }
}

/// Extension trait for backends that support atomic transactions.
pub trait Transactional: StateStore {
    /// Execute a closure within an atomic transaction.
    ///
    /// If the closure returns `Err`, every change made through the store
    /// inside the closure is rolled back. The closure may use its own error
    /// type as long as backend errors convert into it.
    fn transaction<F, R, E>(&mut self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut Self) -> Result<R, E>,
        E: From<Self::Error>;
}
