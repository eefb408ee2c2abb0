use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Gateway (upstream MCP aggregation)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Minimum time between two gateway snapshot rebuilds.
    #[serde(default = "d_min_rebuild_interval")]
    pub min_rebuild_interval_ms: u64,
    /// Separator between the namespace prefix and the upstream tool name.
    #[serde(default = "d_separator")]
    pub namespace_separator: String,
    /// Per-upstream deadline for the initialize + tools/list probe.
    #[serde(default = "d_per_upstream_timeout")]
    pub per_upstream_timeout_ms: u64,
    /// Upstreams probed concurrently during a rebuild.
    #[serde(default = "d_probe_concurrency")]
    pub probe_concurrency: usize,
    /// Retry attempts after the first failed upstream call.
    #[serde(default = "d_retry_count")]
    pub retry_count: u32,
    #[serde(default = "d_retry_base_delay")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "d_retry_max_delay")]
    pub retry_max_delay_ms: u64,
    #[serde(default)]
    pub upstreams: Vec<GatewayUpstream>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            min_rebuild_interval_ms: d_min_rebuild_interval(),
            namespace_separator: d_separator(),
            per_upstream_timeout_ms: d_per_upstream_timeout(),
            probe_concurrency: d_probe_concurrency(),
            retry_count: d_retry_count(),
            retry_base_delay_ms: d_retry_base_delay(),
            retry_max_delay_ms: d_retry_max_delay(),
            upstreams: Vec::new(),
        }
    }
}

/// A single upstream MCP server aggregated by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayUpstream {
    /// Unique name identifying this upstream in statuses and routes.
    pub name: String,
    /// Base URL of the upstream's MCP HTTP endpoint.
    pub endpoint: String,
    /// Unique namespace prefix prepended to the upstream's tool names.
    pub prefix: String,
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Environment variable holding a bearer token for this upstream.
    #[serde(default)]
    pub auth_token_env: Option<String>,
    /// Overrides the gateway-wide per-upstream timeout.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_min_rebuild_interval() -> u64 {
    15_000
}
fn d_separator() -> String {
    ".".into()
}
fn d_per_upstream_timeout() -> u64 {
    5_000
}
fn d_probe_concurrency() -> usize {
    8
}
fn d_retry_count() -> u32 {
    1
}
fn d_retry_base_delay() -> u64 {
    100
}
fn d_retry_max_delay() -> u64 {
    1_000
}
fn d_true() -> bool {
    true
}
