use std::sync::{Arc, MutexGuard};

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use coop_migrate::{MigrationError, MigrationReport, MigrationRunner, MigrationStatus};
use coop_store::{SqliteStore, StateStore};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::AppState;

const INDEX_HTML: &str = include_str!("../static/index.html");

// ── Page handler ────────────────────────────────────────────────────

pub async fn index() -> impl IntoResponse {
    ([(header::CACHE_CONTROL, "no-cache")], Html(INDEX_HTML))
}

// ── API types ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct StatusResponse {
    database: String,
    size_bytes: u64,
    size_human: String,
    journal_mode: String,
    current_version: String,
    latest_version: String,
    needs_migration: bool,
    total_entries: u64,
    namespaces: Vec<NamespaceEntry>,
}

#[derive(Debug, Serialize)]
struct NamespaceEntry {
    name: String,
    entry_count: u64,
    total_bytes: u64,
}

#[derive(Debug, Deserialize)]
pub struct RollbackRequest {
    target: String,
}

/// An error rendered as `{"error": "..."}` with a status code.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<MigrationError> for ApiError {
    fn from(e: MigrationError) -> Self {
        let status = match e {
            MigrationError::InvalidVersion(_) => StatusCode::BAD_REQUEST,
            MigrationError::StepFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({"error": self.message}))).into_response()
    }
}

// ── API handlers ────────────────────────────────────────────────────

pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    respond(build_status(&state))
}

pub async fn history(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    respond(build_history(&state))
}

pub async fn run(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    respond(run_pending(&state))
}

pub async fn rollback(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RollbackRequest>,
) -> impl IntoResponse {
    respond(rollback_to(&state, &request.target))
}

// ── Builders (sync, run on the locked runner) ───────────────────────

fn lock(state: &AppState) -> Result<MutexGuard<'_, MigrationRunner<SqliteStore>>, ApiError> {
    state.runner.lock().map_err(|_| ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: "runner lock poisoned".to_string(),
    })
}

fn store_err(e: impl std::fmt::Display) -> ApiError {
    ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: e.to_string(),
    }
}

pub(crate) fn build_status(state: &AppState) -> Result<StatusResponse, ApiError> {
    let runner = lock(state)?;
    let store = runner.store();
    let info = store.info().map_err(store_err)?;
    let size_bytes = store.file_size().unwrap_or(0);
    let journal_mode = store.journal_mode().unwrap_or_default();
    let current = runner.current_version()?;
    let latest = runner.latest_version();
    let needs_migration = runner.needs_migration()?;

    Ok(StatusResponse {
        database: state.db_path.clone(),
        size_bytes,
        size_human: format_bytes(size_bytes),
        journal_mode,
        needs_migration,
        current_version: current.to_string(),
        latest_version: latest.to_string(),
        total_entries: info.total_entries,
        namespaces: info
            .namespaces
            .into_iter()
            .map(|ns| NamespaceEntry {
                name: ns.name,
                entry_count: ns.entry_count,
                total_bytes: ns.total_bytes,
            })
            .collect(),
    })
}

pub(crate) fn build_history(state: &AppState) -> Result<Vec<MigrationStatus>, ApiError> {
    Ok(lock(state)?.migration_history()?)
}

pub(crate) fn run_pending(state: &AppState) -> Result<MigrationReport, ApiError> {
    let mut runner = lock(state)?;
    runner.run_migrations().map_err(|e| {
        warn!(error = %e, "migration run from admin panel failed");
        ApiError::from(e)
    })
}

pub(crate) fn rollback_to(state: &AppState, target: &str) -> Result<MigrationReport, ApiError> {
    let mut runner = lock(state)?;
    runner.rollback_migration(target).map_err(|e| {
        warn!(rollback_target = target, error = %e, "rollback from admin panel failed");
        ApiError::from(e)
    })
}

// ── Helpers ─────────────────────────────────────────────────────────

fn respond<T: Serialize>(result: Result<T, ApiError>) -> Response {
    match result {
        Ok(body) => Json(body).into_response(),
        Err(e) => e.into_response(),
    }
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
