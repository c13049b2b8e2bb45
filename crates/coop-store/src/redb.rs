//! Pure-Rust key-value backend using [`redb`](https://docs.rs/redb).
//!
//! No C dependencies, for builds where bundling SQLite is not an option.
//!
//! Enable with `features = ["redb"]`.
//!
//! ```no_run
//! use coop_store::{RedbStore, StateStore};
//!
//! let mut store = RedbStore::open("/tmp/coop.redb").unwrap();
//! store.put("app", "currentVersion", b"1.0.0").unwrap();
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::traits::StateStore;

// ── Table definitions ───────────────────────────────────────────────

const STATE_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("kv_state");

// ── Error type ──────────────────────────────────────────────────────

/// Errors returned by [`RedbStore`] operations.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct RedbError(String);

fn err(e: impl std::fmt::Display) -> RedbError {
    RedbError(e.to_string())
}

// ── Store ───────────────────────────────────────────────────────────

/// A pure-Rust persistence backend built on [`redb`].
///
/// Every write runs in its own redb transaction, so single operations are
/// atomic but sequences of operations are not.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create a redb database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RedbError> {
        let db = Database::create(path).map_err(err)?;
        Self::init(db)
    }

    /// Create an in-memory redb database (for testing).
    pub fn open_in_memory() -> Result<Self, RedbError> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(err)?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self, RedbError> {
        // Ensure the table exists so read transactions can open it.
        let txn = db.begin_write().map_err(err)?;
        txn.open_table(STATE_TABLE).map_err(err)?;
        txn.commit().map_err(err)?;
        Ok(Self { db })
    }
}

// ── StateStore ──────────────────────────────────────────────────────

impl StateStore for RedbStore {
    type Error = RedbError;

    fn put(&mut self, namespace: &str, key: &str, value: &[u8]) -> Result<(), RedbError> {
        let txn = self.db.begin_write().map_err(err)?;
        {
            let mut table = txn.open_table(STATE_TABLE).map_err(err)?;
            table
                .insert(state_key(namespace, key).as_slice(), value)
                .map_err(err)?;
        }
        txn.commit().map_err(err)?;
        Ok(())
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, RedbError> {
        let txn = self.db.begin_read().map_err(err)?;
        let table = txn.open_table(STATE_TABLE).map_err(err)?;
        match table
            .get(state_key(namespace, key).as_slice())
            .map_err(err)?
        {
            Some(guard) => Ok(Some(guard.value().to_vec())),
            None => Ok(None),
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), RedbError> {
        let txn = self.db.begin_write().map_err(err)?;
        {
            let mut table = txn.open_table(STATE_TABLE).map_err(err)?;
            table
                .remove(state_key(namespace, key).as_slice())
                .map_err(err)?;
        }
        txn.commit().map_err(err)?;
        Ok(())
    }

    fn list_keys(&self, namespace: &str) -> Result<Vec<String>, RedbError> {
        let txn = self.db.begin_read().map_err(err)?;
        let table = txn.open_table(STATE_TABLE).map_err(err)?;

        let prefix = state_key_prefix(namespace);
        let upper = state_key_prefix_upper(namespace);
        let range = table
            .range(prefix.as_slice()..upper.as_slice())
            .map_err(err)?;

        let mut keys = Vec::new();
        for item in range {
            let (key_guard, _) = item.map_err(err)?;
            if let Some((_, k)) = parse_state_key(key_guard.value()) {
                keys.push(k.to_string());
            }
        }
        Ok(keys)
    }

    fn list_namespaces(&self) -> Result<Vec<String>, RedbError> {
        let txn = self.db.begin_read().map_err(err)?;
        let table = txn.open_table(STATE_TABLE).map_err(err)?;

        let mut names = BTreeSet::new();
        for item in table.iter().map_err(err)? {
            let (key_guard, _) = item.map_err(err)?;
            if let Some((ns, _)) = parse_state_key(key_guard.value()) {
                names.insert(ns.to_string());
            }
        }
        Ok(names.into_iter().collect())
    }
}

// ── Key encoding helpers ────────────────────────────────────────────

/// State key: `namespace \0 key`
fn state_key(namespace: &str, key: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(namespace.len() + 1 + key.len());
    k.extend_from_slice(namespace.as_bytes());
    k.push(0);
    k.extend_from_slice(key.as_bytes());
    k
}

/// Lower bound for all state keys in a namespace.
fn state_key_prefix(namespace: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(namespace.len() + 1);
    k.extend_from_slice(namespace.as_bytes());
    k.push(0);
    k
}

/// Upper bound (exclusive) for all state keys in a namespace.
fn state_key_prefix_upper(namespace: &str) -> Vec<u8> {
    let mut k = Vec::with_capacity(namespace.len() + 1);
    k.extend_from_slice(namespace.as_bytes());
    k.push(1); // \x01 > \x00
    k
}

/// Parse a state key back into `(namespace, key)`.
fn parse_state_key(key: &[u8]) -> Option<(&str, &str)> {
    let pos = key.iter().position(|&b| b == 0)?;
    let ns = std::str::from_utf8(&key[..pos]).ok()?;
    let k = std::str::from_utf8(&key[pos + 1..]).ok()?;
    Some((ns, k))
}
