//! Diagnostics endpoints — manifest, catalog/upstream status, health.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

/// `GET /.well-known/toolgate/manifest` — service discovery card.
pub async fn manifest(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.catalog.get();
    let gateway_tools = state
        .gateway
        .as_ref()
        .map(|g| g.get().tool_count())
        .unwrap_or(0);

    Json(json!({
        "serviceName": "toolgate",
        "version": env!("CARGO_PKG_VERSION"),
        "mcpHttpEndpoint": state.config.http.mcp_path,
        "toolCount": snapshot.tool_count() + gateway_tools,
        "policySourceVersion": snapshot.policy_source_version(),
        "lastCatalogBuildUtc": snapshot.created_utc().to_rfc3339(),
        "openApiAvailable": state.catalog.openapi_available(),
    }))
}

/// `GET /v1/diagnostics` — catalog summary, per-upstream status, and
/// mapping gaps (policies whose declared key matched no endpoint).
pub async fn diagnostics(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.catalog.get();
    let report = state.catalog.last_report();

    let catalog = json!({
        "toolCount": snapshot.tool_count(),
        "createdUtc": snapshot.created_utc().to_rfc3339(),
        "policySourceVersion": snapshot.policy_source_version(),
        "tools": snapshot.iter().map(|t| t.tool_name.clone()).collect::<Vec<_>>(),
        "warnings": report.warnings,
        "mappingGaps": report.mapping_gaps,
    });

    let gateway = match &state.gateway {
        Some(aggregator) => {
            let gw = aggregator.get();
            json!({
                "enabled": true,
                "routeCount": gw.tool_count(),
                "lastBuildUtc": gw.created_utc().to_rfc3339(),
                "upstreams": gw.upstream_statuses(),
            })
        }
        None => json!({ "enabled": false }),
    };

    Json(json!({
        "catalog": catalog,
        "gateway": gateway,
    }))
}

/// `GET /v1/health` — liveness probe.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = (chrono::Utc::now() - state.started_at).num_seconds();
    Json(json!({
        "status": "ok",
        "uptimeSec": uptime,
    }))
}
