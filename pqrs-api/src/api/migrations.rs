//! Migration endpoints
//!
//! `POST /api/migrations/run` applies the catalog; `GET /api/migrations/status`
//! reports what the live schema has and what a run would still do.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use pqrs_common::db::{
    canonical, catalog, DialectKind, MigrationRunResponse, MigrationRunner, RunOptions, SchemaInspector,
    SkipReason,
};
use pqrs_common::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, info, warn};

use super::auth::verify_migration_key;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RunParams {
    /// Per-run opt-in for destructive steps
    #[serde(default)]
    pub allow_destructive: bool,
}

/// POST /api/migrations/run
pub async fn run_migrations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<RunParams>,
) -> Response {
    if let Err(e) = verify_migration_key(&state, &headers) {
        return e.into_response();
    }

    let config = &state.config.migrations;
    if params.allow_destructive && !config.allow_destructive {
        warn!("Destructive steps requested but migrations.allow_destructive is off; they stay skipped");
    }
    let options = RunOptions::from_config(config, params.allow_destructive);

    let db = state.db.read().await;
    match MigrationRunner::new(&db, options).run(&catalog::active_steps()).await {
        Ok(report) => {
            info!("Migration run via API: {:?}", report.status());
            Json(report.to_response()).into_response()
        }
        Err(Error::LockUnavailable(msg)) => {
            warn!("Migration run via API skipped: {}", msg);
            (StatusCode::CONFLICT, Json(MigrationRunResponse::error(msg))).into_response()
        }
        Err(e) => {
            error!("Migration run via API failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(MigrationRunResponse::error(e.to_string())),
            )
                .into_response()
        }
    }
}

/// Schema status report
#[derive(Debug, Serialize)]
pub struct MigrationStatus {
    pub database_connection: bool,
    pub dialect: DialectKind,
    /// Canonical table name → present
    pub tables: BTreeMap<String, bool>,
    /// `"table.column"` → present
    pub columns: BTreeMap<String, bool>,
    /// Enum type name → present; always true where enums are stored as text
    pub enums: BTreeMap<String, bool>,
    /// Steps a run would still do work for, including ones waiting on opt-in
    pub pending_migrations: Vec<String>,
    pub destructive_pending: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MigrationStatus {
    fn unavailable(dialect: DialectKind, error: String) -> Self {
        Self {
            database_connection: false,
            dialect,
            tables: BTreeMap::new(),
            columns: BTreeMap::new(),
            enums: BTreeMap::new(),
            pending_migrations: Vec::new(),
            destructive_pending: Vec::new(),
            error: Some(error),
        }
    }
}

/// GET /api/migrations/status
///
/// Read-only and unauthenticated. Answers 503 when the database is
/// unreachable.
pub async fn migration_status(State(state): State<AppState>) -> Response {
    let db = state.db.read().await;
    let dialect = db.dialect();

    if let Err(e) = db.ping().await {
        error!("Status check cannot reach database: {}", e);
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(MigrationStatus::unavailable(dialect, "Database unreachable".to_string())),
        )
            .into_response();
    }

    let snapshot = match SchemaInspector::new(&db).snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("Schema inspection failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(MigrationStatus::unavailable(dialect, "Schema inspection failed".to_string())),
            )
                .into_response();
        }
    };

    let options = RunOptions::from_config(&state.config.migrations, false);
    let planned = match MigrationRunner::new(&db, options)
        .plan_against(&catalog::active_steps(), &snapshot)
        .await
    {
        Ok(planned) => planned,
        Err(e) => {
            error!("Migration planning failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(MigrationStatus::unavailable(dialect, "Migration planning failed".to_string())),
            )
                .into_response();
        }
    };

    let mut tables = BTreeMap::new();
    let mut columns = BTreeMap::new();
    for table in canonical::TABLES {
        tables.insert(table.name.to_string(), snapshot.table_exists(table.name));
        for column in table.columns {
            columns.insert(
                format!("{}.{}", table.name, column.name),
                snapshot.has_column(table.name, column.name),
            );
        }
    }

    let native_enums = db.adapter().supports_enum_types();
    let enums = canonical::ENUMS
        .iter()
        .map(|e| (e.name.to_string(), !native_enums || snapshot.enum_exists(e.name)))
        .collect();

    let outstanding: Vec<_> = planned
        .iter()
        .filter(|p| p.is_pending() || p.skip == Some(SkipReason::RequiresOptIn))
        .collect();

    Json(MigrationStatus {
        database_connection: true,
        dialect,
        tables,
        columns,
        enums,
        pending_migrations: outstanding.iter().map(|p| p.id.clone()).collect(),
        destructive_pending: outstanding.iter().filter(|p| p.destructive).map(|p| p.id.clone()).collect(),
        error: None,
    })
    .into_response()
}
