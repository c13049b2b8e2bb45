use std::fmt;

use anyhow::{bail, Context, Result};
use coop_migrate::{builtin, MigrationReport, MigrationRunner};
use coop_store::{RedbStore, SqliteStore, StateStore};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{Backend, Settings};

/// A runner over whichever backend the settings select.
pub enum Runner {
    Sqlite(MigrationRunner<SqliteStore>),
    Redb(MigrationRunner<RedbStore>),
}

/// Evaluate `$body` with `$r` bound to the inner runner, whatever the backend.
macro_rules! with_runner {
    ($runner:expr, $r:ident => $body:expr) => {
        match $runner {
            Runner::Sqlite($r) => $body,
            Runner::Redb($r) => $body,
        }
    };
}

impl Runner {
    /// Open the configured database with the built-in migrations registered.
    pub fn open(settings: &Settings) -> Result<Self> {
        let registry = builtin::registry()?;
        let path = &settings.db;
        debug!(db = %path.display(), backend = %settings.backend, "opening database");

        Ok(match settings.backend {
            Backend::Sqlite => {
                let store = SqliteStore::open_with_config(path, settings.sqlite.clone())
                    .with_context(|| {
                        format!("Failed to open SQLite database: {}", path.display())
                    })?;
                Self::Sqlite(
                    MigrationRunner::builder(store)
                        .registry(registry)
                        .config(settings.migrations.clone())
                        .build(),
                )
            }
            Backend::Redb => {
                let store = RedbStore::open(path)
                    .with_context(|| format!("Failed to open redb database: {}", path.display()))?;
                Self::Redb(
                    MigrationRunner::builder(store)
                        .registry(registry)
                        .config(settings.migrations.clone())
                        .build(),
                )
            }
        })
    }
}

/// `coop status`: Show schema version and database statistics.
pub fn status(settings: &Settings) -> Result<()> {
    let runner = Runner::open(settings)?;

    println!("Database: {} ({})", settings.db.display(), settings.backend);
    if let Runner::Sqlite(r) = &runner {
        let store = r.store();
        println!(
            "Size: {} ({} mode)",
            format_bytes(store.file_size()?),
            store.journal_mode()?
        );
    }

    with_runner!(&runner, r => print_status(r))
}

fn print_status<S: StateStore>(runner: &MigrationRunner<S>) -> Result<()> {
    let current = runner.current_version()?;
    let latest = runner.latest_version();
    let pending = runner
        .migration_history()?
        .iter()
        .filter(|m| m.pending)
        .count();

    println!("Schema version: {current}");
    println!("Latest version: {latest}");
    if runner.needs_migration()? {
        println!("Migration needed: {pending} pending (run `coop run`)");
    } else {
        println!("Migration needed: no");
    }
    println!();

    let info = runner.store().info().map_err(store_err)?;
    if info.namespaces.is_empty() {
        println!("  (empty database)");
        return Ok(());
    }

    println!("  {:<24} {:>10} {:>12}", "Namespace", "Entries", "Size");
    println!("  {}", "-".repeat(48));
    for ns in &info.namespaces {
        println!(
            "  {:<24} {:>10} {:>12}",
            ns.name,
            format_num(ns.entry_count),
            format_bytes(ns.total_bytes),
        );
    }
    println!("  {}", "-".repeat(48));
    println!(
        "  {:<24} {:>10} {:>12}",
        "Total",
        format_num(info.total_entries),
        format_bytes(info.total_bytes),
    );
    println!();

    Ok(())
}

/// `coop history`: List every migration as applied or pending.
pub fn history(settings: &Settings, as_json: bool) -> Result<()> {
    let runner = Runner::open(settings)?;
    let (current, rows) =
        with_runner!(&runner, r => (r.current_version()?, r.migration_history()?));

    if as_json {
        let output = json!({
            "current_version": current,
            "migrations": rows,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Schema version: {current}");
    println!();
    println!("  {:<12} {:<9} Description", "Version", "Status");
    println!("  {}", "-".repeat(60));
    for row in &rows {
        let state = if row.applied { "applied" } else { "pending" };
        println!(
            "  {:<12} {:<9} {}",
            row.version.as_str(),
            state,
            truncate(&row.description, 38)
        );
    }
    Ok(())
}

/// `coop run`: Apply pending migrations.
pub fn run(settings: &Settings, atomic: bool) -> Result<()> {
    let mut runner = Runner::open(settings)?;

    let report = match (&mut runner, atomic) {
        (Runner::Sqlite(r), true) => r.run_migrations_atomic()?,
        (Runner::Redb(_), true) => bail!("--atomic requires the sqlite backend"),
        (runner, false) => with_runner!(runner, r => r.run_migrations()?),
    };

    print_report(&report);
    Ok(())
}

/// `coop rollback <target>`: Undo migrations newer than `target`.
pub fn rollback(settings: &Settings, target: &str, atomic: bool) -> Result<()> {
    let mut runner = Runner::open(settings)?;

    let report = match (&mut runner, atomic) {
        (Runner::Sqlite(r), true) => r.rollback_migration_atomic(target)?,
        (Runner::Redb(_), true) => bail!("--atomic requires the sqlite backend"),
        (runner, false) => with_runner!(runner, r => r.rollback_migration(target)?),
    };

    print_report(&report);
    Ok(())
}

fn print_report(report: &MigrationReport) {
    if report.is_noop() && report.from == report.to {
        println!("Already at version {}, nothing to do.", report.to);
        return;
    }
    for step in &report.steps {
        println!("  {} {step}", report.direction);
    }
    println!("{report}");
}

/// `coop inspect [key]`: List keys, or show one value.
pub fn inspect(settings: &Settings, key: Option<&str>, namespace: Option<&str>) -> Result<()> {
    let runner = Runner::open(settings)?;
    with_runner!(&runner, r => match key {
        Some(key) => inspect_value(r.store(), key, namespace),
        None => inspect_list(r.store(), namespace),
    })
}

fn inspect_value<S: StateStore>(store: &S, key: &str, namespace: Option<&str>) -> Result<()> {
    // If namespace given, look there. Otherwise search all namespaces.
    let namespaces: Vec<String> = match namespace {
        Some(ns) => vec![ns.to_string()],
        None => store.list_namespaces().map_err(store_err)?,
    };

    for ns in &namespaces {
        if let Some(data) = store.get(ns, key).map_err(store_err)? {
            println!("Key: {key}");
            println!("Namespace: {ns}");
            println!("Size: {} bytes", data.len());
            println!();
            match decode_value(&data) {
                Decoded::Json(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                Decoded::Text(text) => println!("{text}"),
                Decoded::Binary => println!("(binary data)"),
            }
            return Ok(());
        }
    }

    eprintln!("Key '{key}' not found");
    Ok(())
}

fn inspect_list<S: StateStore>(store: &S, namespace: Option<&str>) -> Result<()> {
    let info = store.info().map_err(store_err)?;

    if info.namespaces.is_empty() {
        println!("  (empty database)");
        return Ok(());
    }

    for ns in &info.namespaces {
        if let Some(filter) = namespace {
            if ns.name != filter {
                continue;
            }
        }

        println!("Namespace: {} ({} entries)", ns.name, ns.entry_count);

        let keys = store.list_keys(&ns.name).map_err(store_err)?;
        for key in &keys {
            let size = store
                .get(&ns.name, key)
                .map_err(store_err)?
                .map(|d| d.len())
                .unwrap_or(0);
            println!("  {key:<40} {size:>8} B");
        }
        println!();
    }

    Ok(())
}

/// `coop export`: Dump the database as JSON.
pub fn export(settings: &Settings, namespace: Option<&str>) -> Result<()> {
    let runner = Runner::open(settings)?;
    let output = with_runner!(&runner, r => export_json(r, settings, namespace)?);
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn export_json<S: StateStore>(
    runner: &MigrationRunner<S>,
    settings: &Settings,
    namespace: Option<&str>,
) -> Result<Value> {
    let store = runner.store();
    let info = store.info().map_err(store_err)?;
    let mut entries = Vec::new();

    for ns in &info.namespaces {
        if let Some(filter) = namespace {
            if ns.name != filter {
                continue;
            }
        }

        for key in store.list_keys(&ns.name).map_err(store_err)? {
            if let Some(data) = store.get(&ns.name, &key).map_err(store_err)? {
                let value = match decode_value(&data) {
                    Decoded::Json(value) => value,
                    Decoded::Text(text) => Value::String(text),
                    Decoded::Binary => Value::Null,
                };
                entries.push(json!({
                    "namespace": ns.name,
                    "key": key,
                    "size": data.len(),
                    "value": value,
                }));
            }
        }
    }

    Ok(json!({
        "database": {
            "path": settings.db.display().to_string(),
            "backend": settings.backend.to_string(),
            "schema_version": runner.current_version()?,
            "total_entries": info.total_entries,
            "total_bytes": info.total_bytes,
        },
        "entries": entries,
    }))
}

/// `coop admin-ui`: Serve the migration admin panel.
pub async fn admin_ui(settings: &Settings, port: u16) -> Result<()> {
    if settings.backend != Backend::Sqlite {
        bail!("the admin panel requires the sqlite backend");
    }
    let path = settings
        .db
        .to_str()
        .context("database path is not valid UTF-8")?;
    coop_admin_ui::start(
        path,
        port,
        settings.migrations.clone(),
        settings.sqlite.clone(),
    )
    .await?;
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────

enum Decoded {
    Json(Value),
    Text(String),
    Binary,
}

/// Objects and arrays decode as JSON. Anything else that is UTF-8 stays
/// text, so a marker like `1.0` is not turned into a number.
fn decode_value(data: &[u8]) -> Decoded {
    if let Ok(value @ (Value::Object(_) | Value::Array(_))) = serde_json::from_slice(data) {
        return Decoded::Json(value);
    }
    match std::str::from_utf8(data) {
        Ok(text) => Decoded::Text(text.to_string()),
        Err(_) => Decoded::Binary,
    }
}

fn store_err(e: impl fmt::Display) -> anyhow::Error {
    anyhow::anyhow!("storage error: {e}")
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn format_num(n: u64) -> String {
    if n < 1000 {
        return n.to_string();
    }
    let s = n.to_string();
    let mut result = String::new();
    for (i, ch) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }
    result.chars().rev().collect()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    }
}
