use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy source + OpenAPI enrichment
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where the policy document is loaded from, and how often the
/// provider is allowed to check it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySourceConfig {
    /// Path to the policy document (JSON or TOML by extension).
    /// When unset, the catalog stays empty and every call is denied.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Debounce interval for `ensure_fresh` checks.
    #[serde(default = "d_min_reload_interval")]
    pub min_reload_interval_ms: u64,
}

impl Default for PolicySourceConfig {
    fn default() -> Self {
        Self {
            path: None,
            min_reload_interval_ms: d_min_reload_interval(),
        }
    }
}

/// OpenAPI description used to enrich tool descriptions and schemas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenApiConfig {
    /// Path to an OpenAPI v3 JSON document. Optional.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_min_reload_interval() -> u64 {
    2_000
}
