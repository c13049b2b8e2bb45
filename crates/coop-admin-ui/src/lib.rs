//! # coop-admin-ui
//!
//! Embedded web panel for the coop schema migration runner.
//!
//! Launches a local web server (Axum) that shows the stored schema version,
//! the applied/pending status of every built-in migration, and lets an
//! operator run pending migrations or roll back to a given version.
//!
//! ## Quick Start
//!
//! ```no_run
//! #[tokio::main]
//! async fn main() {
//!     coop_admin_ui::start("coop.db", 4242, Default::default(), Default::default())
//!         .await
//!         .unwrap();
//! }
//! ```

mod api;

use std::sync::{Arc, Mutex};

use axum::{
    routing::{get, post},
    Router,
};
use coop_migrate::{builtin, MigrationConfig, MigrationError, MigrationRunner};
use coop_store::{SqliteConfig, SqliteError, SqliteStore};
use tracing::info;

/// Error starting the admin panel.
#[derive(Debug, thiserror::Error)]
pub enum AdminUiError {
    /// The SQLite database could not be opened.
    #[error("failed to open database: {0}")]
    Store(#[from] SqliteError),
    /// The built-in registry could not be assembled.
    #[error(transparent)]
    Migration(#[from] MigrationError),
    /// Binding or serving the listener failed.
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared application state for Axum handlers.
pub(crate) struct AppState {
    pub runner: Mutex<MigrationRunner<SqliteStore>>,
    pub db_path: String,
}

impl AppState {
    pub(crate) fn new(
        store: SqliteStore,
        config: MigrationConfig,
        db_path: &str,
    ) -> Result<Self, MigrationError> {
        let runner = MigrationRunner::builder(store)
            .registry(builtin::registry()?)
            .config(config)
            .build();
        Ok(Self {
            runner: Mutex::new(runner),
            db_path: db_path.to_string(),
        })
    }
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(api::index))
        .route("/api/status", get(api::status))
        .route("/api/history", get(api::history))
        .route("/api/migrations/run", post(api::run))
        .route("/api/migrations/rollback", post(api::rollback))
        .with_state(state)
}

/// Start the admin panel.
///
/// Opens the SQLite database at `db_path` with `sqlite` options and serves
/// the panel on `http://127.0.0.1:{port}`. Blocks until the server shuts down.
pub async fn start(
    db_path: &str,
    port: u16,
    config: MigrationConfig,
    sqlite: SqliteConfig,
) -> Result<(), AdminUiError> {
    let store = SqliteStore::open_with_config(db_path, sqlite)?;
    let state = Arc::new(AppState::new(store, config, db_path)?);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{port}")).await?;
    info!(db = db_path, port, "admin panel listening");
    eprintln!("  Admin panel: http://localhost:{port}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
