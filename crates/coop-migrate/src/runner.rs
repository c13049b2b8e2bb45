use std::fmt;

use coop_store::{StateStore, Transactional};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Direction, MigrationError};
use crate::registry::{Migration, MigrationRegistry, RegisteredMigration};
use crate::storage::storage_err;
use crate::version::SchemaVersion;

/// Namespace holding the version marker by default.
pub const DEFAULT_MARKER_NAMESPACE: &str = "app";

/// Key holding the version marker by default.
pub const DEFAULT_MARKER_KEY: &str = "currentVersion";

/// When the version marker is written during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommitMode {
    /// Write the marker once, after the whole batch succeeded. A failure
    /// mid-batch leaves earlier transforms applied and the marker at its
    /// pre-batch value, so the next run re-applies them.
    #[default]
    Batch,
    /// Write the marker after every successful step, so a failed run
    /// resumes from the step that failed.
    PerStep,
}

/// Configuration for the migration runner.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Namespace of the version marker.
    pub marker_namespace: String,
    /// Key of the version marker.
    pub marker_key: String,
    /// Version reported when no marker is stored, and when the registry is empty.
    pub initial_version: SchemaVersion,
    /// When the marker is written.
    pub commit: CommitMode,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            marker_namespace: DEFAULT_MARKER_NAMESPACE.to_string(),
            marker_key: DEFAULT_MARKER_KEY.to_string(),
            initial_version: SchemaVersion::initial(),
            commit: CommitMode::Batch,
        }
    }
}

/// Outcome of a migration run or rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Whether migrations were applied or rolled back.
    pub direction: Direction,
    /// Marker value before the run.
    pub from: SchemaVersion,
    /// Marker value after the run.
    pub to: SchemaVersion,
    /// Versions whose transform ran, in the order they ran.
    pub steps: Vec<SchemaVersion>,
}

impl MigrationReport {
    /// `true` when no transform ran.
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.direction {
            Direction::Up => "applied",
            Direction::Down => "rolled back",
        };
        write!(
            f,
            "{verb} {} migration(s): {} -> {}",
            self.steps.len(),
            self.from,
            self.to
        )
    }
}

/// One row of [`MigrationRunner::migration_history`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    /// Migration version.
    pub version: SchemaVersion,
    /// Migration description.
    pub description: String,
    /// Version is at or below the current marker.
    pub applied: bool,
    /// Negation of `applied`.
    pub pending: bool,
}

/// Applies registered migrations to a store and tracks the version marker.
///
/// The runner owns the store. It reads the marker, selects the migrations
/// between the marker and the target, runs their transforms in order, and
/// writes the new marker. Nothing else about the stored data is known to it.
///
/// # Example
///
/// ```
/// use coop_migrate::{MigrationRecord, MigrationRegistry, MigrationRunner};
/// use coop_store::MemoryStore;
///
/// let mut registry = MigrationRegistry::new();
/// registry
///     .register(MigrationRecord::new(
///         "1.0.1",
///         "Enable dark mode",
///         |s| s.write("app", "theme", b"dark"),
///         |s| s.remove("app", "theme"),
///     ))
///     .unwrap();
///
/// let mut runner = MigrationRunner::new(MemoryStore::new(), registry);
/// assert_eq!(runner.current_version().unwrap().as_str(), "1.0.0");
/// assert!(runner.needs_migration().unwrap());
///
/// runner.run_migrations().unwrap();
/// assert_eq!(runner.current_version().unwrap().as_str(), "1.0.1");
/// assert!(!runner.needs_migration().unwrap());
/// ```
pub struct MigrationRunner<S: StateStore> {
    store: S,
    registry: MigrationRegistry,
    config: MigrationConfig,
}

/// Builder for a [`MigrationRunner`] with custom configuration.
pub struct MigrationRunnerBuilder<S: StateStore> {
    store: S,
    registry: MigrationRegistry,
    config: MigrationConfig,
}

impl<S: StateStore> MigrationRunnerBuilder<S> {
    /// Use this registry, replacing any migrations added so far.
    pub fn registry(mut self, registry: MigrationRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Append one migration to the registry.
    pub fn register<M: Migration + 'static>(
        mut self,
        migration: M,
    ) -> Result<Self, MigrationError> {
        self.registry.register(migration)?;
        Ok(self)
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: MigrationConfig) -> Self {
        self.config = config;
        self
    }

    /// Set when the marker is written.
    pub fn commit_mode(mut self, commit: CommitMode) -> Self {
        self.config.commit = commit;
        self
    }

    /// Store the marker under a different `(namespace, key)`.
    pub fn marker(mut self, namespace: &str, key: &str) -> Self {
        self.config.marker_namespace = namespace.to_string();
        self.config.marker_key = key.to_string();
        self
    }

    /// Version assumed for a fresh store.
    pub fn initial_version(mut self, version: SchemaVersion) -> Self {
        self.config.initial_version = version;
        self
    }

    /// Build the runner.
    pub fn build(self) -> MigrationRunner<S> {
        MigrationRunner {
            store: self.store,
            registry: self.registry,
            config: self.config,
        }
    }
}

impl<S: StateStore> MigrationRunner<S> {
    /// Create a runner with default configuration.
    pub fn new(store: S, registry: MigrationRegistry) -> Self {
        Self {
            store,
            registry,
            config: MigrationConfig::default(),
        }
    }

    /// Create a builder for advanced configuration.
    pub fn builder(store: S) -> MigrationRunnerBuilder<S> {
        MigrationRunnerBuilder {
            store,
            registry: MigrationRegistry::new(),
            config: MigrationConfig::default(),
        }
    }

    /// Get a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get a mutable reference to the underlying store.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Consume the runner and return the store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// The registered migrations.
    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    /// The active configuration.
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Version recorded in the store, or the initial version if none is.
    pub fn current_version(&self) -> Result<SchemaVersion, MigrationError> {
        read_marker(&self.store, &self.config)
    }

    /// Version of the newest registered migration, or the initial version.
    pub fn latest_version(&self) -> SchemaVersion {
        self.registry
            .latest_version()
            .cloned()
            .unwrap_or_else(|| self.config.initial_version.clone())
    }

    /// Whether the stored version differs from the latest registered one.
    pub fn needs_migration(&self) -> Result<bool, MigrationError> {
        Ok(self.current_version()? != self.latest_version())
    }

    /// Apply every migration newer than the stored version, in registry order.
    ///
    /// If a transform fails the run stops there and the error is returned.
    /// Transforms that already ran are not undone. In [`CommitMode::Batch`]
    /// the marker keeps its pre-run value; in [`CommitMode::PerStep`] it
    /// names the last step that succeeded.
    pub fn run_migrations(&mut self) -> Result<MigrationReport, MigrationError> {
        migrate_up(&mut self.store, &self.registry, &self.config, self.config.commit)
    }

    /// Undo every migration newer than `target` and not newer than the
    /// stored version, newest first, then set the marker to `target`.
    ///
    /// `target` must be a well-formed version but need not match a
    /// registered migration; it is stored exactly as given.
    pub fn rollback_migration(&mut self, target: &str) -> Result<MigrationReport, MigrationError> {
        let target = SchemaVersion::parse(target)?;
        migrate_down(
            &mut self.store,
            &self.registry,
            &self.config,
            self.config.commit,
            &target,
        )
    }

    /// Applied/pending status of every registered migration.
    pub fn migration_history(&self) -> Result<Vec<MigrationStatus>, MigrationError> {
        let current = self.current_version()?;
        Ok(self
            .registry
            .iter()
            .map(|entry| {
                let applied = *entry.version() <= current;
                MigrationStatus {
                    version: entry.version().clone(),
                    description: entry.description().to_string(),
                    applied,
                    pending: !applied,
                }
            })
            .collect())
    }
}

impl<S: Transactional> MigrationRunner<S> {
    /// Like [`run_migrations`](Self::run_migrations), but the transforms and
    /// the marker update commit together: on failure the store is left
    /// exactly as it was before the call.
    pub fn run_migrations_atomic(&mut self) -> Result<MigrationReport, MigrationError> {
        let registry = &self.registry;
        let config = &self.config;
        self.store
            .transaction(|store| -> Result<_, TxError<S::Error>> {
                migrate_up(store, registry, config, CommitMode::Batch).map_err(TxError::Migration)
            })
            .map_err(TxError::into_migration_error)
    }

    /// Like [`rollback_migration`](Self::rollback_migration), all or nothing.
    pub fn rollback_migration_atomic(
        &mut self,
        target: &str,
    ) -> Result<MigrationReport, MigrationError> {
        let target = SchemaVersion::parse(target)?;
        let registry = &self.registry;
        let config = &self.config;
        self.store
            .transaction(|store| -> Result<_, TxError<S::Error>> {
                migrate_down(store, registry, config, CommitMode::Batch, &target)
                    .map_err(TxError::Migration)
            })
            .map_err(TxError::into_migration_error)
    }
}

// ── Core algorithm ──────────────────────────────────────────────────

/// Failure inside a store transaction: either the store itself or a migration.
enum TxError<E> {
    Store(E),
    Migration(MigrationError),
}

impl<E> From<E> for TxError<E> {
    fn from(e: E) -> Self {
        Self::Store(e)
    }
}

impl<E: fmt::Display> TxError<E> {
    fn into_migration_error(self) -> MigrationError {
        match self {
            Self::Store(e) => storage_err(e),
            Self::Migration(e) => e,
        }
    }
}

fn read_marker<S: StateStore>(
    store: &S,
    config: &MigrationConfig,
) -> Result<SchemaVersion, MigrationError> {
    let raw = store
        .get(&config.marker_namespace, &config.marker_key)
        .map_err(storage_err)?;
    match raw {
        None => Ok(config.initial_version.clone()),
        Some(bytes) => {
            let text = String::from_utf8(bytes).map_err(|e| {
                MigrationError::Deserialization(format!("version marker is not UTF-8: {e}"))
            })?;
            Ok(SchemaVersion::parse(&text)?)
        }
    }
}

fn write_marker<S: StateStore>(
    store: &mut S,
    config: &MigrationConfig,
    version: &SchemaVersion,
) -> Result<(), MigrationError> {
    store
        .put(
            &config.marker_namespace,
            &config.marker_key,
            version.as_str().as_bytes(),
        )
        .map_err(storage_err)
}

fn run_step<S: StateStore>(
    store: &mut S,
    entry: &RegisteredMigration,
    direction: Direction,
) -> Result<(), MigrationError> {
    info!(
        version = %entry.version(),
        description = entry.description(),
        %direction,
        "running migration"
    );
    let migration = entry.migration();
    let result = match direction {
        Direction::Up => migration.up(store),
        Direction::Down => migration.down(store),
    };
    result.map_err(|e| {
        warn!(version = %entry.version(), %direction, error = %e, "migration failed");
        MigrationError::StepFailed {
            version: entry.version().to_string(),
            direction,
            reason: e.to_string(),
        }
    })
}

fn migrate_up<S: StateStore>(
    store: &mut S,
    registry: &MigrationRegistry,
    config: &MigrationConfig,
    commit: CommitMode,
) -> Result<MigrationReport, MigrationError> {
    let current = read_marker(store, config)?;
    let pending: Vec<&RegisteredMigration> = registry
        .iter()
        .filter(|entry| *entry.version() > current)
        .collect();

    if pending.is_empty() {
        debug!(current = %current, "no pending migrations");
        return Ok(MigrationReport {
            direction: Direction::Up,
            from: current.clone(),
            to: current,
            steps: Vec::new(),
        });
    }

    info!(from = %current, count = pending.len(), "applying migrations");

    let mut steps = Vec::with_capacity(pending.len());
    for entry in pending {
        run_step(store, entry, Direction::Up)?;
        if commit == CommitMode::PerStep {
            write_marker(store, config, entry.version())?;
        }
        steps.push(entry.version().clone());
    }

    // `steps` is non-empty: at least one migration was pending.
    let to = steps[steps.len() - 1].clone();
    if commit == CommitMode::Batch {
        write_marker(store, config, &to)?;
    }

    info!(from = %current, to = %to, "migrations applied");
    Ok(MigrationReport {
        direction: Direction::Up,
        from: current,
        to,
        steps,
    })
}

fn migrate_down<S: StateStore>(
    store: &mut S,
    registry: &MigrationRegistry,
    config: &MigrationConfig,
    commit: CommitMode,
    target: &SchemaVersion,
) -> Result<MigrationReport, MigrationError> {
    let current = read_marker(store, config)?;
    if *target > current {
        warn!(
            current = %current,
            rollback_target = %target,
            "rollback target is newer than the stored version"
        );
    }

    let entries: Vec<&RegisteredMigration> = registry.iter().collect();
    let mut steps = Vec::new();

    info!(from = %current, to = %target, "rolling back migrations");

    for (index, entry) in entries.iter().enumerate().rev() {
        let version = entry.version();
        if !(version > target && *version <= current) {
            continue;
        }

        run_step(store, entry, Direction::Down)?;
        if commit == CommitMode::PerStep {
            // The store now sits at the previous registered version, but
            // never below the requested target.
            let resumed = index
                .checked_sub(1)
                .map(|prev| entries[prev].version())
                .filter(|prev| *prev > target)
                .unwrap_or(target);
            write_marker(store, config, resumed)?;
        }
        steps.push(version.clone());
    }

    write_marker(store, config, target)?;

    info!(from = %current, to = %target, count = steps.len(), "rollback complete");
    Ok(MigrationReport {
        direction: Direction::Down,
        from: current,
        to: target.clone(),
        steps,
    })
}
