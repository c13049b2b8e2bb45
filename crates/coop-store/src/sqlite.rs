//! SQLite persistence backend using rusqlite.
//!
//! This is the primary backend for desktop deployments of the dashboard.
//! Uses WAL mode by default for concurrent read/write performance.
//!
//! # Example
//!
//! ```no_run
//! use coop_store::{SqliteStore, StateStore};
//!
//! let mut store = SqliteStore::open("coop.db").unwrap();
//! store.put("app", "currentVersion", b"1.0.2").unwrap();
//!
//! let data = store.get("app", "currentVersion").unwrap().unwrap();
//! assert_eq!(data, b"1.0.2");
//! ```

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;

use crate::traits::{NamespaceInfo, StateStore, StoreInfo, Transactional};

/// SQLite configuration options, read from the `[sqlite]` table of `coop.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SqliteConfig {
    /// SQLite journal mode. Defaults to WAL.
    pub journal_mode: JournalMode,
    /// Busy timeout in milliseconds. Defaults to 5000.
    pub busy_timeout_ms: u32,
    /// SQLite page size. Defaults to 4096.
    pub page_size: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            journal_mode: JournalMode::Wal,
            busy_timeout_ms: 5000,
            page_size: 4096,
        }
    }
}

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    /// Write-Ahead Logging, allows concurrent reads during writes.
    Wal,
    /// Traditional rollback journal.
    Delete,
    /// In-memory journal (fastest, no crash recovery).
    Memory,
}

impl JournalMode {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
            Self::Memory => "MEMORY",
        }
    }
}

/// Error type for the SQLite backend.
#[derive(Debug, thiserror::Error)]
pub enum SqliteError {
    /// An error from rusqlite.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Lock poisoned.
    #[error("sqlite lock poisoned")]
    LockPoisoned,
}

/// SQLite persistence backend.
///
/// Wraps a `rusqlite::Connection` behind a `Mutex` for safe shared access.
/// Creates the schema automatically on first open.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at the given path with default config.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SqliteError> {
        Self::open_with_config(path, SqliteConfig::default())
    }

    /// Open with custom configuration.
    pub fn open_with_config<P: AsRef<Path>>(
        path: P,
        config: SqliteConfig,
    ) -> Result<Self, SqliteError> {
        let conn = Connection::open(path)?;
        Self::init_connection(&conn, &config)?;
        Self::create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, SqliteError> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(&conn, &SqliteConfig::default())?;
        Self::create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_connection(conn: &Connection, config: &SqliteConfig) -> Result<(), SqliteError> {
        // journal_mode returns a row, so it goes through query_row.
        let _mode: String = conn.query_row(
            &format!("PRAGMA journal_mode = {}", config.journal_mode.as_str()),
            [],
            |row| row.get(0),
        )?;
        conn.execute_batch(&format!(
            "PRAGMA busy_timeout = {};
             PRAGMA page_size = {};
             PRAGMA synchronous = NORMAL;",
            config.busy_timeout_ms, config.page_size,
        ))?;
        Ok(())
    }

    fn create_schema(conn: &Connection) -> Result<(), SqliteError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv_state (
                namespace   TEXT NOT NULL,
                key         TEXT NOT NULL,
                data        BLOB NOT NULL,
                updated_at  INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (namespace, key)
            );",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteError> {
        self.conn.lock().map_err(|_| SqliteError::LockPoisoned)
    }

    fn now_ms() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Get the database file size in bytes.
    pub fn file_size(&self) -> Result<u64, SqliteError> {
        let conn = self.lock()?;
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |row| row.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |row| row.get(0))?;
        Ok((page_count * page_size) as u64)
    }

    /// Get the current journal mode.
    pub fn journal_mode(&self) -> Result<String, SqliteError> {
        let conn = self.lock()?;
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        Ok(mode)
    }
}

impl StateStore for SqliteStore {
    type Error = SqliteError;

    fn put(&mut self, namespace: &str, key: &str, value: &[u8]) -> Result<(), Self::Error> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO kv_state (namespace, key, data, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(namespace, key)
             DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            params![namespace, key, value, Self::now_ms() as i64],
        )?;
        Ok(())
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        let conn = self.lock()?;
        let result = conn
            .query_row(
                "SELECT data FROM kv_state WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(result)
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), Self::Error> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM kv_state WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
        )?;
        Ok(())
    }

    fn list_keys(&self, namespace: &str) -> Result<Vec<String>, Self::Error> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT key FROM kv_state WHERE namespace = ?1 ORDER BY key")?;
        let keys = stmt
            .query_map(params![namespace], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    fn list_namespaces(&self) -> Result<Vec<String>, Self::Error> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT DISTINCT namespace FROM kv_state ORDER BY namespace")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn exists(&self, namespace: &str, key: &str) -> Result<bool, Self::Error> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM kv_state WHERE namespace = ?1 AND key = ?2",
            params![namespace, key],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn info(&self) -> Result<StoreInfo, Self::Error> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT namespace, COUNT(*), COALESCE(SUM(LENGTH(data)), 0)
             FROM kv_state GROUP BY namespace ORDER BY namespace",
        )?;
        let namespaces = stmt
            .query_map([], |row| {
                Ok(NamespaceInfo {
                    name: row.get(0)?,
                    entry_count: row.get::<_, i64>(1)? as u64,
                    total_bytes: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StoreInfo {
            total_entries: namespaces.iter().map(|ns| ns.entry_count).sum(),
            total_bytes: namespaces.iter().map(|ns| ns.total_bytes).sum(),
            namespaces,
        })
    }
}

impl Transactional for SqliteStore {
    fn transaction<F, R, E>(&mut self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut Self) -> Result<R, E>,
        E: From<Self::Error>,
    {
        {
            let conn = self.lock()?;
            conn.execute_batch("BEGIN").map_err(SqliteError::from)?;
        }
        match f(self) {
            Ok(result) => {
                let conn = self.lock()?;
                conn.execute_batch("COMMIT").map_err(SqliteError::from)?;
                Ok(result)
            }
            Err(e) => {
                if let Ok(conn) = self.lock() {
                    let _ = conn.execute_batch("ROLLBACK");
                }
                Err(e)
            }
        }
    }
}
