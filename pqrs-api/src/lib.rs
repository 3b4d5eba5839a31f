//! pqrs-api library: schema maintenance endpoints of the PQRS backend
//!
//! - `POST /api/migrations/run`: apply the migration catalog (migration key)
//! - `GET /api/migrations/status`: read-only schema report
//! - `POST /api/maintenance/reset-db`: drop, rebuild and reseed (superadmin JWT)
//! - `GET /health`, `GET /api/buildinfo`

use axum::extract::DefaultBodyLimit;
use axum::Router;
use pqrs_common::config::AppConfig;
use pqrs_common::db::DbPool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;

/// Request bodies here are tiny JSON documents
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Migration runs take a read guard; reset takes the write guard because
    /// it may replace the SQLite pool
    pub db: Arc<RwLock<DbPool>>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(db: DbPool, config: AppConfig) -> Self {
        Self {
            db: Arc::new(RwLock::new(db)),
            config: Arc::new(config),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    Router::new()
        .route("/api/migrations/run", post(api::run_migrations))
        .route("/api/migrations/status", get(api::migration_status))
        .route("/api/maintenance/reset-db", post(api::reset_database))
        .route("/api/buildinfo", get(api::get_build_info))
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
