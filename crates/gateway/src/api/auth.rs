//! Bearer-token middleware for the diagnostics endpoints.

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

/// Require `Authorization: Bearer <token>` matching the configured
/// token hash. When no token is configured the gate is open (dev
/// mode); startup logs a warning about it.
pub async fn require_api_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = &state.api_token_hash else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    // Compare digests in constant time so the check leaks nothing
    // about how much of the token matched.
    let authorized = presented.is_some_and(|token| {
        let presented_hash = Sha256::digest(token.as_bytes());
        presented_hash.ct_eq(expected.as_slice()).into()
    });

    if authorized {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "unauthorized" })),
        )
            .into_response()
    }
}
