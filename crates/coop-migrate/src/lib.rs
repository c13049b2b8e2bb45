//! # coop-migrate
//!
//! Versioned schema migrations for data persisted in a [`coop_store`]
//! key-value store.
//!
//! ## How It Works
//!
//! 1. The store keeps a **version marker**, by default the string at
//!    `("app", "currentVersion")`. A store without one is at `1.0.0`.
//! 2. A [`MigrationRegistry`] lists migrations in strictly ascending version
//!    order, each with an `up` and a `down` transform.
//! 3. [`MigrationRunner::run_migrations`] applies every migration newer than
//!    the marker, oldest first, then records the newest version.
//! 4. [`MigrationRunner::rollback_migration`] undoes migrations newer than a
//!    target, newest first, then records the target.
//!
//! Versions are dotted integers compared numerically with zero padding:
//! `1.2 == 1.2.0` and `1.10 > 1.9`.
//!
//! ## Example
//!
//! ```
//! use coop_migrate::{builtin, MigrationRunner};
//! use coop_store::MemoryStore;
//!
//! let mut runner = MigrationRunner::new(MemoryStore::new(), builtin::registry().unwrap());
//! let report = runner.run_migrations().unwrap();
//! assert_eq!(report.to.as_str(), "1.0.2");
//!
//! for status in runner.migration_history().unwrap() {
//!     assert!(status.applied);
//! }
//! ```

pub mod builtin;
mod error;
mod registry;
mod runner;
mod storage;
mod version;

pub use error::{Direction, MigrationError};
pub use registry::{Migration, MigrationRecord, MigrationRegistry, RegisteredMigration};
pub use runner::{
    CommitMode, MigrationConfig, MigrationReport, MigrationRunner, MigrationRunnerBuilder,
    MigrationStatus, DEFAULT_MARKER_KEY, DEFAULT_MARKER_NAMESPACE,
};
pub use storage::Storage;
pub use version::{compare, SchemaVersion, VersionError, INITIAL_VERSION};
