//! End-to-end runner behavior against every storage backend.

use std::sync::{Arc, Mutex};

use coop_migrate::builtin::{self, NotificationSettings};
use coop_migrate::{
    CommitMode, Direction, MigrationError, MigrationRecord, MigrationRegistry, MigrationRunner,
    Storage,
};
use coop_store::{MemoryStore, RedbStore, SqliteStore, StateStore};
use serde_json::{json, Value};

type Log = Arc<Mutex<Vec<String>>>;

/// Registry of migrations that log each call and toggle one key apiece.
fn logging_registry(versions: &[&str], log: &Log) -> MigrationRegistry {
    let mut registry = MigrationRegistry::new();
    for version in versions {
        let (up_log, down_log) = (log.clone(), log.clone());
        let (up_v, down_v) = (version.to_string(), version.to_string());
        registry
            .register(MigrationRecord::new(
                *version,
                format!("toggle {version}"),
                move |s| {
                    up_log.lock().unwrap().push(format!("up {up_v}"));
                    s.write("fields", &up_v, b"set")
                },
                move |s| {
                    down_log.lock().unwrap().push(format!("down {down_v}"));
                    s.remove("fields", &down_v)
                },
            ))
            .unwrap();
    }
    registry
}

fn calls(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

// ── Properties, generic over the backend ─────────────────────────────

fn applies_in_order_once<S: StateStore>(store: S) {
    let log = Log::default();
    let mut runner = MigrationRunner::new(store, logging_registry(&["1.0.1", "1.0.2"], &log));

    assert_eq!(runner.current_version().unwrap().as_str(), "1.0.0");
    runner.run_migrations().unwrap();

    assert_eq!(calls(&log), vec!["up 1.0.1", "up 1.0.2"]);
    assert_eq!(runner.current_version().unwrap().as_str(), "1.0.2");
    assert_eq!(
        runner.store().get("app", "currentVersion").unwrap(),
        Some(b"1.0.2".to_vec())
    );

    // Idempotent: nothing pending, nothing runs.
    assert!(!runner.needs_migration().unwrap());
    assert!(runner.run_migrations().unwrap().is_noop());
    assert_eq!(calls(&log).len(), 2);
}

fn failure_keeps_marker<S: StateStore>(store: S) {
    let mut registry = MigrationRegistry::new();
    registry
        .register(MigrationRecord::new(
            "1.0.1",
            "first",
            |s| s.write("fields", "first", b"set"),
            |s| s.remove("fields", "first"),
        ))
        .unwrap();
    registry
        .register(MigrationRecord::new(
            "1.0.2",
            "second",
            |_| Err(MigrationError::custom("quota exceeded")),
            |_| Ok(()),
        ))
        .unwrap();
    let mut runner = MigrationRunner::new(store, registry);

    let err = runner.run_migrations().unwrap_err();

    assert!(matches!(
        err,
        MigrationError::StepFailed {
            ref version,
            direction: Direction::Up,
            ..
        } if version == "1.0.2"
    ));
    assert!(err.to_string().contains("quota exceeded"));
    assert_eq!(runner.current_version().unwrap().as_str(), "1.0.0");
    assert!(runner.store().exists("fields", "first").unwrap());
}

fn rollback_restores<S: StateStore>(store: S) {
    let log = Log::default();
    let mut runner = MigrationRunner::new(store, logging_registry(&["1.0.1", "1.0.2"], &log));

    runner.run_migrations().unwrap();
    let report = runner.rollback_migration("1.0.0").unwrap();

    assert_eq!(calls(&log)[2..], ["down 1.0.2", "down 1.0.1"]);
    assert_eq!(report.direction, Direction::Down);
    assert!(runner.store().list_keys("fields").unwrap().is_empty());
    assert_eq!(runner.current_version().unwrap().as_str(), "1.0.0");
}

fn history_after_partial_run<S: StateStore>(mut store: S) {
    store.put("app", "currentVersion", b"1.0.1").unwrap();
    let log = Log::default();
    let runner = MigrationRunner::new(store, logging_registry(&["1.0.1", "1.0.2"], &log));

    let history = runner.migration_history().unwrap();
    let rows: Vec<_> = history
        .iter()
        .map(|s| (s.version.as_str(), s.applied, s.pending))
        .collect();
    assert_eq!(rows, vec![("1.0.1", true, false), ("1.0.2", false, true)]);
    assert!(runner.needs_migration().unwrap());
}

fn builtin_scenario<S: StateStore>(mut store: S) {
    {
        let storage: &mut dyn Storage = &mut store;
        storage
            .write_json(
                "app",
                "patients",
                &json!([
                    {"id": "p1", "name": "Giulia Rossi", "birthDate": "1948-03-02"},
                    {"id": "p2", "name": "Marco Bianchi"}
                ]),
            )
            .unwrap();
    }
    let mut runner = MigrationRunner::new(store, builtin::registry().unwrap());
    assert_eq!(runner.current_version().unwrap().as_str(), "1.0.0");

    let report = runner.run_migrations().unwrap();
    assert_eq!(report.steps.len(), 2);

    let storage: &dyn Storage = runner.store();
    let patients: Vec<Value> = storage.read_json("app", "patients").unwrap().unwrap();
    assert_eq!(patients.len(), 2);
    for patient in &patients {
        assert_eq!(patient["email"], json!(""));
    }
    assert_eq!(patients[0]["birthDate"], json!("1948-03-02"));

    let settings: NotificationSettings = storage
        .read_json("app", "notificationSettings")
        .unwrap()
        .unwrap();
    assert_eq!(settings, NotificationSettings::default());
    assert_eq!(runner.current_version().unwrap().as_str(), "1.0.2");

    runner.rollback_migration("1.0.0").unwrap();
    let storage: &dyn Storage = runner.store();
    let patients: Vec<Value> = storage.read_json("app", "patients").unwrap().unwrap();
    assert!(patients.iter().all(|p| p.get("email").is_none()));
    assert!(!runner.store().exists("app", "notificationSettings").unwrap());
}

fn builtin_round_trip_keeps_user_data<S: StateStore>(mut store: S) {
    let patients = json!([{"id": 1, "email": "luca@example.org"}, {"id": 2}]);
    let settings = json!({
        "emailEnabled": false,
        "pushEnabled": true,
        "appointmentReminders": false,
        "reminderLeadHours": 2
    });
    {
        let storage: &mut dyn Storage = &mut store;
        storage.write_json("app", "patients", &patients).unwrap();
        storage
            .write_json("app", "notificationSettings", &settings)
            .unwrap();
    }
    let mut runner = MigrationRunner::new(store, builtin::registry().unwrap());

    runner.run_migrations().unwrap();
    let storage: &dyn Storage = runner.store();
    let saved: Value = storage
        .read_json("app", "notificationSettings")
        .unwrap()
        .unwrap();
    assert_eq!(saved, settings);

    runner.rollback_migration("1.0.0").unwrap();
    let storage: &dyn Storage = runner.store();
    let after: Value = storage.read_json("app", "patients").unwrap().unwrap();
    assert_eq!(after, patients);
    let saved: Value = storage
        .read_json("app", "notificationSettings")
        .unwrap()
        .unwrap();
    assert_eq!(saved, settings);
}

fn memory() -> MemoryStore {
    MemoryStore::new()
}

fn sqlite() -> SqliteStore {
    SqliteStore::open_in_memory().unwrap()
}

fn redb() -> RedbStore {
    RedbStore::open_in_memory().unwrap()
}

#[test]
fn applies_in_order_once_all_backends() {
    applies_in_order_once(memory());
    applies_in_order_once(sqlite());
    applies_in_order_once(redb());
}

#[test]
fn failure_keeps_marker_all_backends() {
    failure_keeps_marker(memory());
    failure_keeps_marker(sqlite());
    failure_keeps_marker(redb());
}

#[test]
fn rollback_restores_all_backends() {
    rollback_restores(memory());
    rollback_restores(sqlite());
    rollback_restores(redb());
}

#[test]
fn history_all_backends() {
    history_after_partial_run(memory());
    history_after_partial_run(sqlite());
    history_after_partial_run(redb());
}

#[test]
fn builtin_scenario_all_backends() {
    builtin_scenario(memory());
    builtin_scenario(sqlite());
    builtin_scenario(redb());
}

#[test]
fn builtin_round_trip_keeps_user_data_all_backends() {
    builtin_round_trip_keeps_user_data(memory());
    builtin_round_trip_keeps_user_data(sqlite());
    builtin_round_trip_keeps_user_data(redb());
}

// ── Commit modes and atomicity ───────────────────────────────────────

#[test]
fn atomic_run_on_sqlite_leaves_no_trace() {
    let mut registry = MigrationRegistry::new();
    registry
        .register(MigrationRecord::new(
            "1.0.1",
            "first",
            |s| s.write("fields", "first", b"set"),
            |s| s.remove("fields", "first"),
        ))
        .unwrap();
    registry
        .register(MigrationRecord::new(
            "1.0.2",
            "broken",
            |_| Err(MigrationError::custom("broken")),
            |_| Ok(()),
        ))
        .unwrap();
    let mut runner = MigrationRunner::new(sqlite(), registry);

    assert!(runner.run_migrations_atomic().is_err());
    assert!(!runner.store().exists("fields", "first").unwrap());
    assert_eq!(runner.current_version().unwrap().as_str(), "1.0.0");
}

#[test]
fn atomic_rollback_on_sqlite_undoes_earlier_steps() {
    let mut registry = MigrationRegistry::new();
    registry
        .register(MigrationRecord::new(
            "1.0.1",
            "first",
            |s| s.write("fields", "first", b"set"),
            |s| s.remove("fields", "first"),
        ))
        .unwrap();
    registry
        .register(MigrationRecord::new(
            "1.0.2",
            "irreversible",
            |s| s.write("fields", "second", b"set"),
            |_| Err(MigrationError::custom("cannot undo")),
        ))
        .unwrap();
    registry
        .register(MigrationRecord::new(
            "1.0.3",
            "third",
            |s| s.write("fields", "third", b"set"),
            |s| s.remove("fields", "third"),
        ))
        .unwrap();
    let mut runner = MigrationRunner::new(sqlite(), registry);
    runner.run_migrations().unwrap();

    let err = runner.rollback_migration_atomic("1.0.0").unwrap_err();

    assert!(matches!(
        err,
        MigrationError::StepFailed {
            ref version,
            direction: Direction::Down,
            ..
        } if version == "1.0.2"
    ));
    // The down of 1.0.3 ran before the failure and must be undone with it.
    let mut keys = runner.store().list_keys("fields").unwrap();
    keys.sort();
    assert_eq!(keys, vec!["first", "second", "third"]);
    assert_eq!(runner.current_version().unwrap().as_str(), "1.0.3");
}

#[test]
fn per_step_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("coop.db");
    let attempts = Arc::new(Mutex::new(0u32));

    let build = |attempts: Arc<Mutex<u32>>| {
        let mut registry = MigrationRegistry::new();
        registry
            .register(MigrationRecord::new(
                "1.0.1",
                "first",
                |s| s.write("fields", "first", b"set"),
                |s| s.remove("fields", "first"),
            ))
            .unwrap();
        registry
            .register(MigrationRecord::new(
                "1.0.2",
                "fails once",
                move |s| {
                    let mut n = attempts.lock().unwrap();
                    *n += 1;
                    if *n == 1 {
                        return Err(MigrationError::custom("transient"));
                    }
                    s.write("fields", "second", b"set")
                },
                |s| s.remove("fields", "second"),
            ))
            .unwrap();
        registry
    };

    {
        let mut runner = MigrationRunner::builder(SqliteStore::open(&path).unwrap())
            .registry(build(attempts.clone()))
            .commit_mode(CommitMode::PerStep)
            .build();
        assert!(runner.run_migrations().is_err());
        assert_eq!(runner.current_version().unwrap().as_str(), "1.0.1");
    }

    let mut runner = MigrationRunner::builder(SqliteStore::open(&path).unwrap())
        .registry(build(attempts.clone()))
        .commit_mode(CommitMode::PerStep)
        .build();
    let report = runner.run_migrations().unwrap();

    let steps: Vec<_> = report.steps.iter().map(|v| v.as_str()).collect();
    assert_eq!(steps, vec!["1.0.2"]);
    assert_eq!(runner.current_version().unwrap().as_str(), "1.0.2");
    assert_eq!(*attempts.lock().unwrap(), 2);
}

// ── Storage failures ─────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("disk offline")]
struct Offline;

/// A store whose every operation fails.
struct OfflineStore;

impl StateStore for OfflineStore {
    type Error = Offline;

    fn put(&mut self, _: &str, _: &str, _: &[u8]) -> Result<(), Offline> {
        Err(Offline)
    }

    fn get(&self, _: &str, _: &str) -> Result<Option<Vec<u8>>, Offline> {
        Err(Offline)
    }

    fn delete(&mut self, _: &str, _: &str) -> Result<(), Offline> {
        Err(Offline)
    }

    fn list_keys(&self, _: &str) -> Result<Vec<String>, Offline> {
        Err(Offline)
    }

    fn list_namespaces(&self) -> Result<Vec<String>, Offline> {
        Err(Offline)
    }
}

#[test]
fn marker_read_failure_aborts_before_any_transform() {
    let log = Log::default();
    let mut runner = MigrationRunner::new(OfflineStore, logging_registry(&["1.0.1"], &log));

    assert_eq!(
        runner.run_migrations().unwrap_err(),
        MigrationError::Storage("disk offline".into())
    );
    assert!(matches!(
        runner.rollback_migration("1.0.0"),
        Err(MigrationError::Storage(_))
    ));
    assert!(matches!(
        runner.migration_history(),
        Err(MigrationError::Storage(_))
    ));
    assert!(calls(&log).is_empty());
}
