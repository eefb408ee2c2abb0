use std::sync::Arc;

use chrono::{DateTime, Utc};

use tg_catalog::provider::CatalogProvider;
use tg_domain::config::Config;
use tg_mcp::aggregator::GatewayAggregator;

use crate::rpc::dispatcher::McpDispatcher;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<CatalogProvider>,
    /// `None` when no upstreams are configured.
    pub gateway: Option<Arc<GatewayAggregator>>,
    pub dispatcher: Arc<McpDispatcher>,
    /// SHA-256 hash of the diagnostics bearer token (read once at
    /// startup). `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,
    pub started_at: DateTime<Utc>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("gateway_configured", &self.gateway.is_some())
            .field("api_token_configured", &self.api_token_hash.is_some())
            .field("started_at", &self.started_at)
            .finish()
    }
}
