//! Declarative endpoint policy model.
//!
//! A [`PolicyConfig`] document declares which host endpoints are
//! exposed as tools (whitelist), which are explicitly suppressed
//! (blacklist), and the per-tool effective policy (timeout, rate
//! limit, cache, auth) applied by the action pipeline.
//!
//! The document is reloaded at runtime, so validation never panics
//! and never throws: [`PolicyConfig::validate`] returns a list of
//! issues and the caller decides whether warnings are acceptable.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::validation::Issue;

/// Highest policy document schema version this build understands.
pub const MAX_SCHEMA_VERSION: u32 = 2;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy entries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single whitelist/blacklist entry.
///
/// At least one identifying key must be set. Matching precedence is
/// operation-id, then route-template + method, then display-name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EndpointPolicy {
    /// Matches the endpoint's operation id exactly.
    #[serde(default)]
    pub operation_id: Option<String>,
    /// Matches the endpoint's route template (requires `http_method`).
    #[serde(default)]
    pub route_template: Option<String>,
    /// Matches the endpoint's display name exactly.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Overrides the derived tool name when this entry matches.
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub http_method: Option<String>,
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Per-tool effective policy applied by the action pipeline.
    #[serde(default)]
    pub policy: Option<EffectivePolicy>,
}

impl Default for EndpointPolicy {
    fn default() -> Self {
        Self {
            operation_id: None,
            route_template: None,
            display_name: None,
            tool_name: None,
            http_method: None,
            enabled: true,
            policy: None,
        }
    }
}

/// The identifying key of a policy entry, in matching-precedence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyKey<'a> {
    OperationId(&'a str),
    Route { template: &'a str, method: Option<&'a str> },
    DisplayName(&'a str),
}

impl EndpointPolicy {
    /// The first non-empty identifying key, or `None` when the entry
    /// cannot match anything.
    pub fn identity(&self) -> Option<PolicyKey<'_>> {
        if let Some(op) = self.operation_id.as_deref().filter(|s| !s.is_empty()) {
            return Some(PolicyKey::OperationId(op));
        }
        if let Some(route) = self.route_template.as_deref().filter(|s| !s.is_empty()) {
            return Some(PolicyKey::Route {
                template: route,
                method: self.http_method.as_deref().filter(|s| !s.is_empty()),
            });
        }
        self.display_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(PolicyKey::DisplayName)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Effective policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The merged per-tool policy carried into the action pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectivePolicy {
    /// Tool invocation timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitPolicy>,
    #[serde(default)]
    pub cache: Option<CachePolicy>,
    /// Propagated as-is; ToolGate makes no auth decisions beyond this flag.
    #[serde(default)]
    pub requires_auth: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    #[serde(default)]
    pub strategy: RateLimitStrategy,
    /// Permits available per window.
    pub permit_limit: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// Callers allowed to wait for a permit; `None` rejects immediately.
    #[serde(default)]
    pub queue_limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitStrategy {
    #[default]
    TokenBucket,
    FixedWindow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Cached result time-to-live in milliseconds.
    pub ttl_ms: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy document
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The root policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// When true (the default), endpoints without a whitelist match
    /// are not exposed as tools.
    #[serde(default = "d_true")]
    pub deny_by_default: bool,
    #[serde(default)]
    pub whitelist: Vec<EndpointPolicy>,
    #[serde(default)]
    pub blacklist: Vec<EndpointPolicy>,
    #[serde(default = "d_schema_version")]
    pub schema_version: u32,
    /// Opaque version of the backing document (content hash, etag, ...).
    #[serde(default)]
    pub source_version: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            deny_by_default: true,
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            schema_version: 1,
            source_version: String::new(),
        }
    }
}

impl PolicyConfig {
    /// Validate the document and return every issue found.
    ///
    /// Pure and total: never panics, never short-circuits.
    pub fn validate(&self) -> Vec<Issue> {
        let mut issues = Vec::new();

        if self.schema_version == 0 || self.schema_version > MAX_SCHEMA_VERSION {
            issues.push(Issue::error(
                "schema_version",
                format!(
                    "schema_version {} is outside the supported range [1, {MAX_SCHEMA_VERSION}]",
                    self.schema_version
                ),
            ));
        }

        if self.deny_by_default && self.whitelist.is_empty() {
            issues.push(Issue::error(
                "whitelist",
                "deny_by_default is set but the whitelist is empty — no tool would ever be exposed",
            ));
        }

        for (i, entry) in self.whitelist.iter().enumerate() {
            validate_entry(entry, &format!("whitelist[{i}]"), &mut issues);
        }
        for (i, entry) in self.blacklist.iter().enumerate() {
            validate_entry(entry, &format!("blacklist[{i}]"), &mut issues);
        }

        // Blacklist dominates whitelist; overlap is legal but suspicious.
        let black_ops: HashSet<&str> = self
            .blacklist
            .iter()
            .filter_map(|e| e.operation_id.as_deref())
            .filter(|s| !s.is_empty())
            .collect();
        for (i, entry) in self.whitelist.iter().enumerate() {
            if let Some(op) = entry.operation_id.as_deref() {
                if black_ops.contains(op) {
                    issues.push(Issue::warning(
                        format!("whitelist[{i}].operation_id"),
                        format!("operation \"{op}\" is also blacklisted — blacklist wins"),
                    ));
                }
            }
        }

        issues
    }
}

fn validate_entry(entry: &EndpointPolicy, field: &str, issues: &mut Vec<Issue>) {
    if entry.identity().is_none() {
        issues.push(Issue::error(
            field,
            "no identifying key set (operation_id, route_template, or display_name)",
        ));
    }

    if entry.route_template.as_deref().is_some_and(|s| !s.is_empty())
        && entry.http_method.as_deref().filter(|s| !s.is_empty()).is_none()
    {
        issues.push(Issue::warning(
            format!("{field}.http_method"),
            "route_template without http_method matches any method",
        ));
    }

    if let Some(rl) = entry.policy.as_ref().and_then(|p| p.rate_limit.as_ref()) {
        if rl.permit_limit == 0 {
            issues.push(Issue::error(
                format!("{field}.policy.rate_limit.permit_limit"),
                "permit_limit must be greater than 0",
            ));
        }
        if rl.window_ms == 0 {
            issues.push(Issue::error(
                format!("{field}.policy.rate_limit.window_ms"),
                "window_ms must be at least 1",
            ));
        }
    }

    if let Some(cache) = entry.policy.as_ref().and_then(|p| p.cache.as_ref()) {
        if cache.ttl_ms == 0 {
            issues.push(Issue::warning(
                format!("{field}.policy.cache.ttl_ms"),
                "ttl_ms of 0 disables caching for this tool",
            ));
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_schema_version() -> u32 {
    1
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{has_errors, Severity};

    fn entry(op: &str) -> EndpointPolicy {
        EndpointPolicy {
            operation_id: Some(op.into()),
            ..EndpointPolicy::default()
        }
    }

    fn valid_config() -> PolicyConfig {
        PolicyConfig {
            whitelist: vec![entry("get_weather")],
            ..PolicyConfig::default()
        }
    }

    fn find_issue<'a>(issues: &'a [Issue], prefix: &str) -> Option<&'a Issue> {
        issues.iter().find(|i| i.field.starts_with(prefix))
    }

    #[test]
    fn valid_config_passes() {
        let issues = valid_config().validate();
        assert!(!has_errors(&issues), "unexpected errors: {issues:?}");
    }

    #[test]
    fn deny_by_default_with_empty_whitelist_is_error() {
        let cfg = PolicyConfig::default();
        let issues = cfg.validate();
        let issue = find_issue(&issues, "whitelist").expect("expected whitelist error");
        assert_eq!(issue.severity, Severity::Error);
    }

    #[test]
    fn allow_by_default_with_empty_whitelist_is_fine() {
        let cfg = PolicyConfig {
            deny_by_default: false,
            ..PolicyConfig::default()
        };
        assert!(!has_errors(&cfg.validate()));
    }

    #[test]
    fn schema_version_bounds() {
        let mut cfg = valid_config();
        cfg.schema_version = 0;
        assert!(has_errors(&cfg.validate()));

        cfg.schema_version = MAX_SCHEMA_VERSION;
        assert!(!has_errors(&cfg.validate()));

        cfg.schema_version = MAX_SCHEMA_VERSION + 1;
        assert!(has_errors(&cfg.validate()));
    }

    #[test]
    fn entry_without_identifying_key_is_error() {
        let mut cfg = valid_config();
        cfg.whitelist.push(EndpointPolicy::default());
        let issues = cfg.validate();
        let issue = find_issue(&issues, "whitelist[1]").expect("expected key error");
        assert_eq!(issue.severity, Severity::Error);
    }

    #[test]
    fn route_without_method_is_warning() {
        let mut cfg = valid_config();
        cfg.whitelist.push(EndpointPolicy {
            route_template: Some("/weather".into()),
            ..EndpointPolicy::default()
        });
        let issues = cfg.validate();
        let issue =
            find_issue(&issues, "whitelist[1].http_method").expect("expected method warning");
        assert_eq!(issue.severity, Severity::Warning);
    }

    #[test]
    fn rate_limit_zero_permits_is_error() {
        let mut cfg = valid_config();
        cfg.whitelist[0].policy = Some(EffectivePolicy {
            rate_limit: Some(RateLimitPolicy {
                strategy: RateLimitStrategy::TokenBucket,
                permit_limit: 0,
                window_ms: 1000,
                queue_limit: None,
            }),
            ..EffectivePolicy::default()
        });
        let issues = cfg.validate();
        assert!(find_issue(&issues, "whitelist[0].policy.rate_limit.permit_limit").is_some());
    }

    #[test]
    fn rate_limit_zero_window_is_error() {
        let mut cfg = valid_config();
        cfg.whitelist[0].policy = Some(EffectivePolicy {
            rate_limit: Some(RateLimitPolicy {
                strategy: RateLimitStrategy::FixedWindow,
                permit_limit: 10,
                window_ms: 0,
                queue_limit: None,
            }),
            ..EffectivePolicy::default()
        });
        let issues = cfg.validate();
        assert!(find_issue(&issues, "whitelist[0].policy.rate_limit.window_ms").is_some());
    }

    #[test]
    fn whitelist_blacklist_overlap_is_warning() {
        let mut cfg = valid_config();
        cfg.blacklist.push(entry("get_weather"));
        let issues = cfg.validate();
        let issue = find_issue(&issues, "whitelist[0].operation_id")
            .expect("expected overlap warning");
        assert_eq!(issue.severity, Severity::Warning);
        assert!(issue.message.contains("blacklist wins"));
    }

    #[test]
    fn identity_precedence() {
        let full = EndpointPolicy {
            operation_id: Some("op".into()),
            route_template: Some("/r".into()),
            display_name: Some("Display".into()),
            http_method: Some("GET".into()),
            ..EndpointPolicy::default()
        };
        assert_eq!(full.identity(), Some(PolicyKey::OperationId("op")));

        let route = EndpointPolicy {
            route_template: Some("/r".into()),
            http_method: Some("GET".into()),
            display_name: Some("Display".into()),
            ..EndpointPolicy::default()
        };
        assert_eq!(
            route.identity(),
            Some(PolicyKey::Route { template: "/r", method: Some("GET") })
        );

        let display = EndpointPolicy {
            display_name: Some("Display".into()),
            ..EndpointPolicy::default()
        };
        assert_eq!(display.identity(), Some(PolicyKey::DisplayName("Display")));
    }

    #[test]
    fn empty_strings_do_not_count_as_identity() {
        let entry = EndpointPolicy {
            operation_id: Some(String::new()),
            route_template: Some(String::new()),
            display_name: Some(String::new()),
            ..EndpointPolicy::default()
        };
        assert_eq!(entry.identity(), None);
    }

    #[test]
    fn deep_copy_round_trips_and_is_independent() {
        let original = valid_config();
        let mut copy = original.clone();
        assert_eq!(original, copy);

        copy.whitelist[0].tool_name = Some("renamed".into());
        assert_ne!(original, copy);
        assert_eq!(original.whitelist[0].tool_name, None);
    }

    #[test]
    fn deserialize_defaults() {
        let cfg: PolicyConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.deny_by_default);
        assert!(cfg.whitelist.is_empty());
        assert_eq!(cfg.schema_version, 1);
    }
}
