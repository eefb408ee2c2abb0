//! HTTP transport for the MCP JSON-RPC endpoint.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio_util::sync::CancellationToken;

use tg_mcp::protocol::{JsonRpcResponse, RequestId};

use crate::state::AppState;

/// `POST /mcp` — one JSON-RPC request per HTTP request.
///
/// - Missing/`!= application/json` content type → 415.
/// - Body over `max_request_body_bytes` → 413 with a JSON-RPC error
///   body (code from `error_codes.oversize_body`).
/// - Everything else → HTTP 200, including JSON-RPC error responses.
pub async fn mcp_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.split(';').next().is_some_and(|m| m.trim() == "application/json"));
    if !is_json {
        return (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Json(serde_json::json!({ "error": "Content-Type must be application/json" })),
        )
            .into_response();
    }

    let limits = &state.config.http;
    if body.len() > limits.max_request_body_bytes {
        tracing::warn!(
            size = body.len(),
            limit = limits.max_request_body_bytes,
            "rejecting oversize request body"
        );
        let error = JsonRpcResponse::failure(
            RequestId::Null,
            limits.error_codes.oversize_body,
            format!(
                "request body of {} bytes exceeds the limit of {} bytes",
                body.len(),
                limits.max_request_body_bytes
            ),
        );
        return (StatusCode::PAYLOAD_TOO_LARGE, Json(error)).into_response();
    }

    let cancel = CancellationToken::new();
    match state.dispatcher.dispatch_raw(&body, &cancel).await {
        Some(response) => {
            // Soft limit: log, never truncate mid-stream.
            if let Ok(serialized) = serde_json::to_vec(&response) {
                if serialized.len() > limits.max_response_body_bytes {
                    tracing::warn!(
                        size = serialized.len(),
                        limit = limits.max_response_body_bytes,
                        "response body exceeds the soft limit"
                    );
                }
            }
            (StatusCode::OK, Json(response)).into_response()
        }
        // Notification: nothing to send back.
        None => StatusCode::ACCEPTED.into_response(),
    }
}
