//! Component wiring shared by the HTTP and STDIO entry points.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use tg_catalog::openapi::OpenApiDocument;
use tg_catalog::provider::{CatalogProvider, FilePolicySource, PolicySource, StaticPolicySource};
use tg_domain::config::Config;
use tg_domain::policy::PolicyConfig;
use tg_mcp::aggregator::GatewayAggregator;
use tg_mcp::dispatcher::GatewayDispatcher;
use tg_mcp::registry::StaticUpstreamRegistry;
use tg_mcp::resilience::{BoundedRetryPolicy, NoRetryPolicy, ResiliencyPolicy};
use tg_mcp::{Redactor, UpstreamClient};
use tg_schema::SchemaBuilder;

use crate::handlers;
use crate::rpc::dispatcher::{GatewayHandle, McpDispatcher};
use crate::state::AppState;

/// Build the full application state from configuration.
///
/// Fails only on unrecoverable startup problems (unreadable policy or
/// OpenAPI file, invalid policy document, bad tool-name pattern);
/// runtime reload/build failures later on go to diagnostics instead.
pub async fn build_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let cancel = CancellationToken::new();

    // ── Host endpoints ───────────────────────────────────────────────
    let handlers = Arc::new(handlers::builtin_registry());
    tracing::info!(endpoints = handlers.len(), "host endpoint registry ready");

    // ── OpenAPI enrichment (optional) ────────────────────────────────
    let openapi = match &config.openapi.path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading OpenAPI document {}", path.display()))?;
            let value: serde_json::Value = serde_json::from_str(&raw)
                .with_context(|| format!("parsing OpenAPI document {}", path.display()))?;
            let doc = OpenApiDocument::from_json(&value);
            tracing::info!(
                path = %path.display(),
                operations = doc.len(),
                "OpenAPI document loaded"
            );
            Some(Arc::new(doc))
        }
        None => None,
    };

    // ── Catalog provider ─────────────────────────────────────────────
    let policy_source: Arc<dyn PolicySource> = match &config.policy.path {
        Some(path) => {
            tracing::info!(path = %path.display(), "policy source ready");
            Arc::new(FilePolicySource::new(path))
        }
        None => {
            tracing::warn!(
                "no policy document configured — catalog stays empty and every call is denied"
            );
            Arc::new(StaticPolicySource::new(PolicyConfig::default()))
        }
    };

    let catalog = Arc::new(CatalogProvider::new(
        policy_source,
        handlers.clone(),
        handlers.input_shapes(),
        Arc::new(SchemaBuilder::new()),
        openapi,
        Duration::from_millis(config.policy.min_reload_interval_ms),
    ));

    if config.policy.path.is_some() {
        let snapshot = catalog
            .reload(&cancel)
            .await
            .context("initial catalog build")?;
        tracing::info!(
            tools = snapshot.tool_count(),
            source_version = %snapshot.policy_source_version(),
            "initial tool catalog ready"
        );
    }

    // ── Gateway (optional) ───────────────────────────────────────────
    let (gateway, gateway_handle) = if config.gateway.upstreams.is_empty() {
        tracing::info!("no gateway upstreams configured");
        (None, None)
    } else {
        let registry = Arc::new(StaticUpstreamRegistry::new(&config.gateway.upstreams));
        let client = Arc::new(
            UpstreamClient::new(Duration::from_millis(config.gateway.per_upstream_timeout_ms))
                .map_err(|e| anyhow::anyhow!("building upstream client: {e}"))?,
        );
        let aggregator = Arc::new(GatewayAggregator::new(
            registry.clone(),
            client.clone(),
            &config.gateway,
        ));

        let policy: Arc<dyn ResiliencyPolicy> = if config.gateway.retry_count == 0 {
            Arc::new(NoRetryPolicy)
        } else {
            Arc::new(BoundedRetryPolicy::new(
                config.gateway.retry_count,
                config.gateway.retry_base_delay_ms,
                config.gateway.retry_max_delay_ms,
            ))
        };
        let dispatcher = Arc::new(GatewayDispatcher::new(client, registry, policy));

        tracing::info!(
            upstreams = config.gateway.upstreams.len(),
            retry_count = config.gateway.retry_count,
            "gateway ready"
        );
        (
            Some(aggregator.clone()),
            Some(GatewayHandle {
                aggregator,
                dispatcher,
            }),
        )
    };

    // ── Redaction ────────────────────────────────────────────────────
    let redactor = Arc::new(Redactor::from_config(&config.redaction));
    if redactor.is_enabled() {
        tracing::info!(
            fields = config.redaction.fields.len(),
            patterns = config.redaction.patterns.len(),
            "output redaction enabled"
        );
    }

    // ── JSON-RPC dispatcher ──────────────────────────────────────────
    let dispatcher = Arc::new(
        McpDispatcher::new(
            catalog.clone(),
            gateway_handle,
            handlers,
            redactor,
            config.http.clone(),
        )
        .map_err(|e| anyhow::anyhow!("building dispatcher: {e}"))?,
    );

    // ── API token (read once, hash for comparison) ───────────────────
    let api_token_hash = {
        let env_var = &config.server.api_token_env;
        match std::env::var(env_var) {
            Ok(token) if !token.is_empty() => {
                tracing::info!(env_var = %env_var, "diagnostics bearer-token auth enabled");
                Some(Sha256::digest(token.as_bytes()).to_vec())
            }
            _ => {
                tracing::warn!(
                    env_var = %env_var,
                    "diagnostics bearer-token auth DISABLED — set {env_var} to enable"
                );
                None
            }
        }
    };

    Ok(AppState {
        config,
        catalog,
        gateway,
        dispatcher,
        api_token_hash,
        started_at: chrono::Utc::now(),
    })
}
