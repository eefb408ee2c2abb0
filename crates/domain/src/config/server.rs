use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Optional per-IP HTTP rate limit (token bucket).
    #[serde(default)]
    pub rate_limit: Option<IpRateLimitConfig>,
    /// Environment variable holding the diagnostics bearer token.
    /// When the env var is unset, diagnostics endpoints are open (dev mode).
    #[serde(default = "d_api_token_env")]
    pub api_token_env: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_port(),
            host: d_host(),
            cors: CorsConfig::default(),
            rate_limit: None,
            api_token_env: d_api_token_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed for CORS. Use `["*"]` for permissive (NOT recommended).
    /// Defaults to localhost-only.
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_cors_origins(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpRateLimitConfig {
    pub requests_per_second: u64,
    pub burst_size: u32,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_port() -> u16 {
    8080
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_api_token_env() -> String {
    "TG_API_TOKEN".into()
}
fn d_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:*".into(),
        "http://127.0.0.1:*".into(),
    ]
}
