mod catalog;
mod gateway;
mod http;
mod redaction;
mod server;

pub use catalog::*;
pub use gateway::*;
pub use http::*;
pub use redaction::*;
pub use server::*;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::validation::Issue;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub http: HttpOptions,
    #[serde(default)]
    pub policy: PolicySourceConfig,
    #[serde(default)]
    pub openapi: OpenApiConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub redaction: RedactionConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good. The policy
    /// document has its own validator; this only covers `config.toml`.
    pub fn validate(&self) -> Vec<Issue> {
        let mut issues = Vec::new();

        // Server basics.
        if self.server.port == 0 {
            issues.push(Issue::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            issues.push(Issue::error("server.host", "host must not be empty"));
        }

        // CORS: warn if wildcard is used.
        if self.server.cors.allowed_origins.len() == 1
            && self.server.cors.allowed_origins[0] == "*"
        {
            issues.push(Issue::warning(
                "server.cors.allowed_origins",
                "wildcard \"*\" allows all origins (not recommended for production)",
            ));
        }

        // Per-IP rate limit: if set, both values must be > 0.
        if let Some(rl) = &self.server.rate_limit {
            if rl.requests_per_second == 0 {
                issues.push(Issue::error(
                    "server.rate_limit.requests_per_second",
                    "requests_per_second must be greater than 0",
                ));
            }
            if rl.burst_size == 0 {
                issues.push(Issue::error(
                    "server.rate_limit.burst_size",
                    "burst_size must be greater than 0",
                ));
            }
        }

        // ── HTTP limits ───────────────────────────────────────────────
        if !self.http.mcp_path.starts_with('/') {
            issues.push(Issue::error(
                "http.mcp_path",
                format!("path must start with '/' (got \"{}\")", self.http.mcp_path),
            ));
        }
        if self.http.max_request_body_bytes == 0 {
            issues.push(Issue::error(
                "http.max_request_body_bytes",
                "max_request_body_bytes must be greater than 0",
            ));
        }
        if self.http.max_tool_name_length == 0 {
            issues.push(Issue::error(
                "http.max_tool_name_length",
                "max_tool_name_length must be greater than 0",
            ));
        }
        if self.http.max_arguments_depth == 0 {
            issues.push(Issue::error(
                "http.max_arguments_depth",
                "max_arguments_depth must be greater than 0",
            ));
        }
        if let Err(e) = regex::Regex::new(&self.http.tool_name_pattern) {
            issues.push(Issue::error(
                "http.tool_name_pattern",
                format!("invalid regex \"{}\": {e}", self.http.tool_name_pattern),
            ));
        }

        // ── Gateway upstream validation ──────────────────────────────
        if self.gateway.namespace_separator.is_empty() {
            issues.push(Issue::error(
                "gateway.namespace_separator",
                "namespace_separator must not be empty",
            ));
        }
        if self.gateway.probe_concurrency == 0 {
            issues.push(Issue::error(
                "gateway.probe_concurrency",
                "probe_concurrency must be greater than 0",
            ));
        }

        let mut seen_names: HashSet<&str> = HashSet::new();
        let mut seen_prefixes: HashSet<&str> = HashSet::new();
        for (i, upstream) in self.gateway.upstreams.iter().enumerate() {
            if upstream.name.is_empty() {
                issues.push(Issue::error(
                    format!("gateway.upstreams[{i}].name"),
                    "upstream name must not be empty",
                ));
            }
            if upstream.prefix.is_empty() {
                issues.push(Issue::error(
                    format!("gateway.upstreams[{i}].prefix"),
                    "namespace prefix must not be empty",
                ));
            } else if !upstream
                .prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                issues.push(Issue::error(
                    format!("gateway.upstreams[{i}].prefix"),
                    format!(
                        "prefix \"{}\" may only contain alphanumerics, '_' and '-'",
                        upstream.prefix
                    ),
                ));
            }
            if !upstream.endpoint.starts_with("http://")
                && !upstream.endpoint.starts_with("https://")
            {
                issues.push(Issue::error(
                    format!("gateway.upstreams[{i}].endpoint"),
                    format!(
                        "endpoint must start with http:// or https:// (got \"{}\")",
                        upstream.endpoint
                    ),
                ));
            }
            if !upstream.name.is_empty() && !seen_names.insert(&upstream.name) {
                issues.push(Issue::warning(
                    format!("gateway.upstreams[{i}].name"),
                    format!(
                        "duplicate upstream name \"{}\" — later entry will be dropped",
                        upstream.name
                    ),
                ));
            }
            if !upstream.prefix.is_empty() && !seen_prefixes.insert(&upstream.prefix) {
                issues.push(Issue::warning(
                    format!("gateway.upstreams[{i}].prefix"),
                    format!(
                        "duplicate namespace prefix \"{}\" — later entry will be dropped",
                        upstream.prefix
                    ),
                ));
            }
        }

        // ── Redaction patterns must compile ──────────────────────────
        for (i, pat) in self.redaction.patterns.iter().enumerate() {
            if let Err(e) = regex::Regex::new(&pat.pattern) {
                issues.push(Issue::error(
                    format!("redaction.patterns[{i}]"),
                    format!("invalid regex \"{}\": {e}", pat.pattern),
                ));
            }
        }

        issues
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
