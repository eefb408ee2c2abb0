use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP / JSON-RPC request handling limits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Request handling options for the MCP endpoint.
///
/// The tool-name pattern accepts dots so that gateway-namespaced
/// names (`prefix.tool`) pass the same validation as local ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpOptions {
    /// Path serving MCP JSON-RPC requests.
    #[serde(default = "d_mcp_path")]
    pub mcp_path: String,
    /// Requests larger than this are rejected with HTTP 413.
    #[serde(default = "d_max_request_body")]
    pub max_request_body_bytes: usize,
    /// Responses larger than this are logged but not truncated.
    #[serde(default = "d_max_response_body")]
    pub max_response_body_bytes: usize,
    /// Character whitelist for `tools/call` names.
    #[serde(default = "d_tool_name_pattern")]
    pub tool_name_pattern: String,
    #[serde(default = "d_max_tool_name_length")]
    pub max_tool_name_length: usize,
    /// Maximum nesting depth of the `arguments` object.
    #[serde(default = "d_max_arguments_depth")]
    pub max_arguments_depth: usize,
    /// Maximum number of properties per object level in `arguments`.
    #[serde(default = "d_max_arguments_property_count")]
    pub max_arguments_property_count: usize,
    /// When false, unknown tool names fall through without a catalog
    /// check (testing escape hatch; leave on in production).
    #[serde(default = "d_true")]
    pub enforce_deny_by_default: bool,
    /// Attach a 32-hex correlation id to internal error responses.
    #[serde(default = "d_true")]
    pub include_correlation_id_in_errors: bool,
    #[serde(default)]
    pub error_codes: ErrorCodeOverrides,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            mcp_path: d_mcp_path(),
            max_request_body_bytes: d_max_request_body(),
            max_response_body_bytes: d_max_response_body(),
            tool_name_pattern: d_tool_name_pattern(),
            max_tool_name_length: d_max_tool_name_length(),
            max_arguments_depth: d_max_arguments_depth(),
            max_arguments_property_count: d_max_arguments_property_count(),
            enforce_deny_by_default: true,
            include_correlation_id_in_errors: true,
            error_codes: ErrorCodeOverrides::default(),
        }
    }
}

/// Wire-visible error code overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorCodeOverrides {
    /// JSON-RPC code carried in the HTTP 413 body.
    #[serde(default = "d_oversize_body_code")]
    pub oversize_body: i64,
}

impl Default for ErrorCodeOverrides {
    fn default() -> Self {
        Self {
            oversize_body: d_oversize_body_code(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_mcp_path() -> String {
    "/mcp".into()
}
fn d_max_request_body() -> usize {
    1024 * 1024
}
fn d_max_response_body() -> usize {
    10 * 1024 * 1024
}
fn d_tool_name_pattern() -> String {
    "^[A-Za-z0-9._/-]+$".into()
}
fn d_max_tool_name_length() -> usize {
    256
}
fn d_max_arguments_depth() -> usize {
    32
}
fn d_max_arguments_property_count() -> usize {
    256
}
fn d_oversize_body_code() -> i64 {
    -32602
}
fn d_true() -> bool {
    true
}
