//! HTTP client for upstream MCP servers.
//!
//! Each call is one JSON-RPC POST to the upstream's endpoint. The
//! per-call timeout comes from the upstream (falling back to the
//! gateway default), and the caller's cancellation token always wins
//! the race against the in-flight request.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use tg_domain::config::GatewayUpstream;

use crate::protocol::{
    self, JsonRpcRequest, JsonRpcResponse, McpToolDef, ToolCallResult, ToolsListResult,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Transport-level failure, with the HTTP status when one was seen.
    #[error("transport error: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },

    #[error("upstream call timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    #[error("cancelled by caller")]
    Cancelled,

    #[error("upstream JSON-RPC error: {0}")]
    Rpc(crate::protocol::JsonRpcError),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    #[error("all {attempts} attempts failed: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<UpstreamError>,
    },
}

impl UpstreamError {
    /// Transient failures are the only ones worth retrying: gateway-ish
    /// HTTP statuses and timeouts not caused by the caller.
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Transport { status, .. } => {
                matches!(status, Some(502) | Some(503) | Some(504))
            }
            UpstreamError::Timeout { .. } => true,
            _ => false,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct UpstreamClient {
    http: reqwest::Client,
    next_id: AtomicI64,
    default_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(default_timeout: Duration) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| UpstreamError::Transport {
                status: None,
                message: format!("building HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            next_id: AtomicI64::new(1),
            default_timeout,
        })
    }

    fn timeout_for(&self, upstream: &GatewayUpstream) -> Duration {
        upstream
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout)
    }

    /// Issue one JSON-RPC request and return the unwrapped result.
    pub async fn request(
        &self,
        upstream: &GatewayUpstream,
        method: &str,
        params: Option<Value>,
        cancel: &CancellationToken,
    ) -> Result<Value, UpstreamError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        let timeout = self.timeout_for(upstream);

        let mut builder = self
            .http
            .post(&upstream.endpoint)
            .timeout(timeout)
            .json(&request);
        if let Some(env_var) = &upstream.auth_token_env {
            if let Ok(token) = std::env::var(env_var) {
                if !token.is_empty() {
                    builder = builder.bearer_auth(token);
                }
            }
        }

        tracing::debug!(upstream = %upstream.name, method, id, "sending upstream request");

        let send = async {
            let response = builder.send().await.map_err(|e| classify_reqwest(e, timeout))?;
            let status = response.status();
            if !status.is_success() {
                return Err(UpstreamError::Transport {
                    status: Some(status.as_u16()),
                    message: format!("upstream returned HTTP {status}"),
                });
            }
            let parsed: JsonRpcResponse =
                response.json().await.map_err(|e| UpstreamError::Protocol(
                    format!("decoding response: {e}"),
                ))?;
            parsed.into_result().map_err(UpstreamError::Rpc)
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(UpstreamError::Cancelled),
            result = send => result,
        }
    }

    /// MCP handshake; returns the raw initialize result.
    pub async fn initialize(
        &self,
        upstream: &GatewayUpstream,
        cancel: &CancellationToken,
    ) -> Result<Value, UpstreamError> {
        let params = serde_json::to_value(protocol::initialize_params())
            .map_err(|e| UpstreamError::Protocol(format!("serializing initialize params: {e}")))?;
        self.request(upstream, "initialize", Some(params), cancel)
            .await
    }

    /// Discover the upstream's tool catalog.
    pub async fn list_tools(
        &self,
        upstream: &GatewayUpstream,
        cancel: &CancellationToken,
    ) -> Result<Vec<McpToolDef>, UpstreamError> {
        let result = self.request(upstream, "tools/list", None, cancel).await?;
        let parsed: ToolsListResult = serde_json::from_value(result)
            .map_err(|e| UpstreamError::Protocol(format!("decoding tools/list result: {e}")))?;
        Ok(parsed.tools)
    }

    /// Invoke one tool on the upstream.
    pub async fn call_tool(
        &self,
        upstream: &GatewayUpstream,
        tool_name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> Result<ToolCallResult, UpstreamError> {
        let params = serde_json::json!({
            "name": tool_name,
            "arguments": arguments,
        });
        let result = self
            .request(upstream, "tools/call", Some(params), cancel)
            .await?;
        serde_json::from_value(result)
            .map_err(|e| UpstreamError::Protocol(format!("decoding tools/call result: {e}")))
    }
}

fn classify_reqwest(e: reqwest::Error, timeout: Duration) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Timeout {
            elapsed_ms: timeout.as_millis() as u64,
        }
    } else {
        UpstreamError::Transport {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
