//! Request authentication for the maintenance endpoints
//!
//! - Migration runs: shared key in `X-Migration-Key`
//! - Database reset: `Authorization: Bearer <JWT>` (HS256) whose subject is an
//!   active superadmin account

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use pqrs_common::auth::{check_shared_secret, SecretError};
use pqrs_common::db::canonical::HIGHEST_PRIVILEGE_ROLE;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};

use crate::db::find_account_role;
use crate::AppState;

pub const MIGRATION_KEY_HEADER: &str = "x-migration-key";
pub const MAINTENANCE_TOKEN_HEADER: &str = "x-maintenance-token";

/// Access token claims issued by the PQRS login endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Username
    pub sub: String,
    pub exp: usize,
}

/// Header value as UTF-8; non-UTF-8 values count as absent
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = header_str(headers, "authorization")?;
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim())
    } else {
        None
    }
}

/// Check `X-Migration-Key`; an unconfigured key refuses everything
pub fn verify_migration_key(state: &AppState, headers: &HeaderMap) -> Result<(), AuthError> {
    check_shared_secret(
        header_str(headers, MIGRATION_KEY_HEADER),
        state.config.migrations.key.as_deref(),
    )
    .map_err(|e| {
        match e {
            SecretError::NotConfigured => warn!("Migration run refused: no migration key configured"),
            _ => warn!("Migration run refused: {}", e),
        }
        AuthError::Forbidden("Invalid migration key".to_string())
    })
}

/// Decode and validate an HS256 access token
pub fn decode_claims(token: &str, secret: &str) -> Result<Claims, AuthError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|e| AuthError::InvalidToken(e.to_string()))
}

/// Resolve the bearer token to an active superadmin; returns the username
pub async fn require_superadmin(state: &AppState, headers: &HeaderMap) -> Result<String, AuthError> {
    let secret = state
        .config
        .auth
        .jwt_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(AuthError::NotConfigured)?;
    let token = bearer_token(headers).ok_or(AuthError::MissingCredentials)?;
    let claims = decode_claims(token, secret)?;

    let account = {
        let db = state.db.read().await;
        find_account_role(&db, &claims.sub).await.map_err(|e| {
            error!("Account lookup for {} failed: {}", claims.sub, e);
            AuthError::Internal("Account lookup failed".to_string())
        })?
    };

    match account {
        None => Err(AuthError::InvalidToken(format!("unknown user {}", claims.sub))),
        Some(account) if !account.is_active => {
            Err(AuthError::Forbidden("Account is inactive".to_string()))
        }
        Some(account) if !account.role.eq_ignore_ascii_case(HIGHEST_PRIVILEGE_ROLE) => {
            warn!("Reset refused for {} with role {}", claims.sub, account.role);
            Err(AuthError::Forbidden("Superadmin role required".to_string()))
        }
        Some(_) => Ok(claims.sub),
    }
}

/// Authentication error types for HTTP responses
#[derive(Debug)]
pub enum AuthError {
    MissingCredentials,
    InvalidToken(String),
    Forbidden(String),
    /// Token verification impossible: no signing secret configured
    NotConfigured,
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingCredentials => {
                (StatusCode::UNAUTHORIZED, "Missing bearer token".to_string())
            }
            AuthError::InvalidToken(reason) => {
                warn!("Rejected access token: {}", reason);
                (StatusCode::UNAUTHORIZED, "Invalid or expired token".to_string())
            }
            AuthError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AuthError::NotConfigured => (
                StatusCode::FORBIDDEN,
                "Token authentication is not configured".to_string(),
            ),
            AuthError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(sub: &str, secret: &str, exp: usize) -> String {
        encode(
            &Header::default(),
            &Claims { sub: sub.to_string(), exp },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn far_future() -> usize {
        4_102_444_800 // 2100-01-01
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert("authorization", HeaderValue::from_static("bearer  xyz"));
        assert_eq!(bearer_token(&headers), Some("xyz"));

        headers.insert("authorization", HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_decode_claims() {
        let claims = decode_claims(&token("root", "s3cret", far_future()), "s3cret").unwrap();
        assert_eq!(claims.sub, "root");

        assert!(matches!(
            decode_claims(&token("root", "other", far_future()), "s3cret"),
            Err(AuthError::InvalidToken(_))
        ));
        assert!(matches!(
            decode_claims(&token("root", "s3cret", 1_000), "s3cret"),
            Err(AuthError::InvalidToken(_))
        ));
        assert!(matches!(decode_claims("garbage", "s3cret"), Err(AuthError::InvalidToken(_))));
    }
}
