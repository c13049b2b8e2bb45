use std::fmt;

use crate::error::MigrationError;
use crate::storage::Storage;
use crate::version::SchemaVersion;

/// A single versioned migration with forward and backward transforms.
///
/// `up` moves persisted state forward by exactly one version step and must
/// be idempotent in effect: a crash between a transform and the marker
/// update means it can run again on already-migrated data. `down` undoes
/// what `up` did to the fields it touches, and runs only during rollback.
pub trait Migration: Send + Sync {
    /// Dotted version this migration brings the store to (e.g. `"1.0.2"`).
    fn version(&self) -> &str;

    /// Human-readable summary.
    fn description(&self) -> &str;

    /// Forward transform.
    fn up(&self, storage: &mut dyn Storage) -> Result<(), MigrationError>;

    /// Backward transform.
    fn down(&self, storage: &mut dyn Storage) -> Result<(), MigrationError>;
}

type Transform = Box<dyn Fn(&mut dyn Storage) -> Result<(), MigrationError> + Send + Sync>;

/// A migration assembled from closures.
///
/// # Example
///
/// ```
/// use coop_migrate::{MigrationRecord, MigrationRegistry};
///
/// let mut registry = MigrationRegistry::new();
/// registry
///     .register(MigrationRecord::new(
///         "1.0.1",
///         "Seed the empty invoice list",
///         |s| s.write_json("app", "invoices", &Vec::<String>::new()),
///         |s| s.remove("app", "invoices"),
///     ))
///     .unwrap();
/// assert_eq!(registry.len(), 1);
/// ```
pub struct MigrationRecord {
    version: String,
    description: String,
    up: Transform,
    down: Transform,
}

impl MigrationRecord {
    /// Create a record from a version, a description, and the two transforms.
    pub fn new<U, D>(
        version: impl Into<String>,
        description: impl Into<String>,
        up: U,
        down: D,
    ) -> Self
    where
        U: Fn(&mut dyn Storage) -> Result<(), MigrationError> + Send + Sync + 'static,
        D: Fn(&mut dyn Storage) -> Result<(), MigrationError> + Send + Sync + 'static,
    {
        Self {
            version: version.into(),
            description: description.into(),
            up: Box::new(up),
            down: Box::new(down),
        }
    }
}

impl Migration for MigrationRecord {
    fn version(&self) -> &str {
        &self.version
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn up(&self, storage: &mut dyn Storage) -> Result<(), MigrationError> {
        (self.up)(storage)
    }

    fn down(&self, storage: &mut dyn Storage) -> Result<(), MigrationError> {
        (self.down)(storage)
    }
}

impl fmt::Debug for MigrationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationRecord")
            .field("version", &self.version)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// A migration together with its parsed version.
pub struct RegisteredMigration {
    version: SchemaVersion,
    migration: Box<dyn Migration>,
}

impl RegisteredMigration {
    /// Parsed version of the migration.
    pub fn version(&self) -> &SchemaVersion {
        &self.version
    }

    /// Human-readable summary.
    pub fn description(&self) -> &str {
        self.migration.description()
    }

    /// The migration itself.
    pub fn migration(&self) -> &dyn Migration {
        self.migration.as_ref()
    }
}

impl fmt::Debug for RegisteredMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredMigration")
            .field("version", &self.version)
            .field("description", &self.description())
            .finish()
    }
}

/// Ordered, append-only list of migrations.
///
/// Migrations are kept in declaration order, which must be strictly
/// ascending by version. [`register`](Self::register) enforces this; the
/// runner walks the list as declared and never re-sorts it.
#[derive(Debug, Default)]
pub struct MigrationRegistry {
    entries: Vec<RegisteredMigration>,
}

impl MigrationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a migration.
    ///
    /// Fails if the version is malformed, or not strictly newer than the
    /// last registered migration (which also rules out duplicates).
    pub fn register<M: Migration + 'static>(&mut self, migration: M) -> Result<(), MigrationError> {
        self.register_boxed(Box::new(migration))
    }

    /// Append an already boxed migration.
    pub fn register_boxed(&mut self, migration: Box<dyn Migration>) -> Result<(), MigrationError> {
        let version = SchemaVersion::parse(migration.version())?;
        if let Some(last) = self.entries.last() {
            if version <= last.version {
                return Err(MigrationError::OutOfOrder {
                    version: version.to_string(),
                    previous: last.version.to_string(),
                });
            }
        }
        self.entries.push(RegisteredMigration { version, migration });
        Ok(())
    }

    /// Version of the last registered migration, if any.
    pub fn latest_version(&self) -> Option<&SchemaVersion> {
        self.entries.last().map(|e| &e.version)
    }

    /// Iterate in declaration (ascending) order.
    pub fn iter(&self) -> std::slice::Iter<'_, RegisteredMigration> {
        self.entries.iter()
    }

    /// All registered versions, in order.
    pub fn versions(&self) -> Vec<&SchemaVersion> {
        self.entries.iter().map(|e| &e.version).collect()
    }

    /// Number of registered migrations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no migrations are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a MigrationRegistry {
    type Item = &'a RegisteredMigration;
    type IntoIter = std::slice::Iter<'a, RegisteredMigration>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
