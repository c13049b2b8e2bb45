//! # coop-store
//!
//! Key-value persistence for the cooperative dashboard's local data.
//!
//! The dashboard keeps its working data as JSON blobs under well-known
//! keys. This crate abstracts that store behind [`StateStore`] so the
//! migration runner and its migrations can run against any backend:
//! in-memory for tests, SQLite or redb on disk.
//!
//! ## Quick Start
//!
//! ```
//! use coop_store::{MemoryStore, StateStore};
//!
//! let mut store = MemoryStore::new();
//! store.put("app", "patients", b"[]").unwrap();
//! let data = store.get("app", "patients").unwrap();
//! assert_eq!(data.as_deref(), Some(b"[]".as_slice()));
//! ```
//!
//! ## Backends
//!
//! | Backend | Feature flag | Use case |
//! |---------|-------------|----------|
//! | [`MemoryStore`] | *(always available)* | Testing, prototyping |
//! | `SqliteStore` | `sqlite` | Desktop and server installs |
//! | `RedbStore` | `redb` | Pure-Rust builds without C deps |

mod memory;
#[cfg(feature = "redb")]
mod redb;
#[cfg(feature = "sqlite")]
mod sqlite;
mod traits;

pub use memory::{MemoryError, MemoryStore};
#[cfg(feature = "redb")]
pub use crate::redb::{RedbError, RedbStore};
#[cfg(feature = "sqlite")]
pub use sqlite::{JournalMode, SqliteConfig, SqliteError, SqliteStore};
pub use traits::*;
