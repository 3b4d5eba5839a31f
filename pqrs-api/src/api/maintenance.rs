//! Destructive maintenance endpoint
//!
//! `POST /api/maintenance/reset-db` drops the schema, rebuilds it from the
//! migration catalog and seeds a single superadmin.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use pqrs_common::db::{ResetController, ResetRefusal};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::auth::{header_str, require_superadmin, MAINTENANCE_TOKEN_HEADER};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub confirm: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub status: String,
    pub message: String,
}

impl ResetResponse {
    fn error(status: StatusCode, message: impl Into<String>) -> Response {
        (
            status,
            Json(ResetResponse {
                status: "error".to_string(),
                message: message.into(),
            }),
        )
            .into_response()
    }
}

fn refusal_status(refusal: ResetRefusal) -> StatusCode {
    match refusal {
        ResetRefusal::WrongConfirmation => StatusCode::BAD_REQUEST,
        ResetRefusal::BadToken | ResetRefusal::NotConfigured => StatusCode::FORBIDDEN,
        ResetRefusal::SeedPasswordMissing => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// POST /api/maintenance/reset-db
pub async fn reset_database(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ResetRequest>, JsonRejection>,
) -> Response {
    let username = match require_superadmin(&state, &headers).await {
        Ok(username) => username,
        Err(e) => return e.into_response(),
    };

    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return ResetResponse::error(StatusCode::BAD_REQUEST, format!("Invalid request body: {}", rejection));
        }
    };

    // Exclusive: the SQLite pool may be replaced underneath other handlers
    let mut db = state.db.write().await;
    let mut controller = ResetController::new(&mut db, &state.config);

    if let Err(refusal) = controller.authorize(&request.confirm, header_str(&headers, MAINTENANCE_TOKEN_HEADER)) {
        warn!("Database reset by {} refused: {}", username, refusal);
        return ResetResponse::error(refusal_status(refusal), refusal.to_string());
    }

    warn!("Database reset requested by {}", username);
    match controller.execute().await {
        Ok(summary) => {
            info!("Database reset by {} complete", username);
            Json(ResetResponse {
                status: "ok".to_string(),
                message: format!(
                    "Database reset; {} migration steps applied, superadmin '{}' seeded",
                    summary.migrations.applied().count(),
                    summary.superadmin
                ),
            })
            .into_response()
        }
        Err(e) => {
            error!("Database reset failed at {:?}: {}", controller.state(), e);
            let message = if state.config.maintenance.debug {
                format!("Database reset failed: {}", e)
            } else {
                "Database reset failed".to_string()
            };
            ResetResponse::error(StatusCode::INTERNAL_SERVER_ERROR, message)
        }
    }
}
