//! API authentication and tenant resolution.
//!
//! Protected endpoints require `Authorization: Bearer <token>` plus the
//! `x-tenant-id` and `x-user-id` headers. Real tenant resolution is an
//! external collaborator; the headers are its contract with this core.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rand::Rng;
use uuid::Uuid;

use loci_core::types::{TenantId, UserId};

use crate::error::ApiError;
use crate::state::AppState;

/// Generate a random 32-character hex token.
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    hex::encode(bytes)
}

/// Load token from file, or generate and save a new one.
pub fn load_or_generate_token(token_path: &std::path::Path) -> String {
    if let Ok(contents) = std::fs::read_to_string(token_path) {
        let token = contents.trim().to_string();
        if !token.is_empty() {
            tracing::info!("API token loaded from {}", token_path.display());
            return token;
        }
    }

    let token = generate_token();

    if let Some(parent) = token_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = std::fs::write(token_path, &token) {
        tracing::warn!(error = %e, "Failed to save API token to {}", token_path.display());
    } else {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(token_path, std::fs::Permissions::from_mode(0o600));
        }
        tracing::info!("API token saved to {}", token_path.display());
    }

    token
}

/// Middleware that validates Bearer token authentication.
pub async fn require_auth(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let auth_header = req.headers().get("authorization");

    match auth_header {
        Some(value) => {
            let value_str = match value.to_str() {
                Ok(s) => s,
                Err(_) => {
                    return unauthorized("Invalid Authorization header encoding");
                }
            };

            if let Some(token) = value_str.strip_prefix("Bearer ") {
                if token == state.api_token {
                    return next.run(req).await;
                }
            }

            unauthorized("Invalid bearer token")
        }
        None => unauthorized("Missing Authorization header"),
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "unauthorized",
            "message": message,
        })),
    )
        .into_response()
}

/// Resolve the tenant from the `x-tenant-id` header.
pub fn tenant_from(headers: &HeaderMap) -> Result<TenantId, ApiError> {
    parse_uuid_header(headers, "x-tenant-id").map(TenantId)
}

/// Resolve the acting user from the `x-user-id` header.
pub fn user_from(headers: &HeaderMap) -> Result<UserId, ApiError> {
    parse_uuid_header(headers, "x-user-id").map(UserId)
}

fn parse_uuid_header(headers: &HeaderMap, name: &str) -> Result<Uuid, ApiError> {
    let raw = headers
        .get(name)
        .ok_or_else(|| ApiError::BadRequest(format!("Missing {} header", name)))?
        .to_str()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {} header encoding", name)))?;
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("{} must be a uuid", name)))
}
