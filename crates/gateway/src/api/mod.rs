pub mod auth;
pub mod diag;
pub mod mcp;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (the MCP endpoint, health, and
/// the manifest) and **protected** (diagnostics, gated behind the
/// `TG_API_TOKEN` bearer-token middleware when configured).
///
/// `state` is needed to wire up the auth middleware at build time.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        // MCP JSON-RPC endpoint. Body-size enforcement is ours so the
        // 413 carries a JSON-RPC error body.
        .route(&state.config.http.mcp_path, post(mcp::mcp_post))
        .route_layer(DefaultBodyLimit::disable())
        // Health probe (public, no auth)
        .route("/v1/health", get(diag::health))
        // Service manifest
        .route("/.well-known/toolgate/manifest", get(diag::manifest));

    let protected = Router::new()
        .route("/v1/diagnostics", get(diag::diagnostics))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
