//! Gateway dispatcher — routes `tools/call` to the owning upstream.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::aggregator::GatewayCatalogSnapshot;
use crate::client::{UpstreamClient, UpstreamError};
use crate::protocol::ToolContent;
use crate::registry::UpstreamRegistry;
use crate::resilience::{ResiliencyContext, ResiliencyPolicy, UpstreamOp};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Wrapped result of a gateway tool call.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub success: bool,
    pub content: Vec<ToolContent>,
    pub error_message: Option<String>,
    pub error_type: Option<String>,
}

impl DispatchOutcome {
    fn success(content: Vec<ToolContent>) -> Self {
        Self {
            success: true,
            content,
            error_message: None,
            error_type: None,
        }
    }

    fn failure(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            content: vec![ToolContent::text(message.clone())],
            error_message: Some(message),
            error_type: Some(error_type.into()),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct GatewayDispatcher {
    client: Arc<UpstreamClient>,
    registry: Arc<dyn UpstreamRegistry>,
    policy: Arc<dyn ResiliencyPolicy>,
}

impl GatewayDispatcher {
    pub fn new(
        client: Arc<UpstreamClient>,
        registry: Arc<dyn UpstreamRegistry>,
        policy: Arc<dyn ResiliencyPolicy>,
    ) -> Self {
        Self {
            client,
            registry,
            policy,
        }
    }

    /// Resolve the external tool name against the snapshot and call
    /// the owning upstream through the resiliency policy.
    ///
    /// `ToolNotFound` and `Unavailable` surface as errors for the
    /// caller's error mapping; a completed upstream call (even one
    /// with `isError`) comes back as a [`DispatchOutcome`].
    pub async fn call(
        &self,
        external_tool_name: &str,
        arguments: Value,
        snapshot: &GatewayCatalogSnapshot,
        correlation_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, UpstreamError> {
        let Some(route) = snapshot.get(external_tool_name) else {
            return Err(UpstreamError::ToolNotFound(external_tool_name.to_string()));
        };

        let upstream_healthy = snapshot
            .status_of(&route.upstream_name)
            .is_some_and(|s| s.healthy);
        if !upstream_healthy {
            return Err(UpstreamError::Unavailable(format!(
                "upstream \"{}\" is unhealthy",
                route.upstream_name
            )));
        }

        let upstream = self
            .registry
            .upstreams()
            .await
            .into_iter()
            .find(|u| u.name == route.upstream_name)
            .ok_or_else(|| {
                UpstreamError::Unavailable(format!(
                    "upstream \"{}\" is no longer registered",
                    route.upstream_name
                ))
            })?;

        let mut rcx = ResiliencyContext::new(
            external_tool_name,
            &route.upstream_name,
            &upstream.endpoint,
            correlation_id.map(String::from),
        );

        tracing::debug!(
            tool = %external_tool_name,
            upstream = %route.upstream_name,
            invocation_id = %rcx.invocation_id,
            "dispatching gateway tool call"
        );

        let client = self.client.clone();
        let op: UpstreamOp<'_> = {
            let upstream = upstream.clone();
            let tool_name = route.upstream_tool_name.clone();
            let arguments = arguments.clone();
            let cancel = cancel.clone();
            Box::new(move |_attempt| {
                let client = client.clone();
                let upstream = upstream.clone();
                let tool_name = tool_name.clone();
                let arguments = arguments.clone();
                let cancel = cancel.clone();
                Box::pin(async move {
                    client
                        .call_tool(&upstream, &tool_name, arguments, &cancel)
                        .await
                })
            })
        };

        match self.policy.execute(&mut rcx, cancel, op).await {
            Ok(result) if result.is_error => {
                let message = result
                    .content
                    .first()
                    .map(|c| c.text.clone())
                    .unwrap_or_else(|| "upstream tool reported an error".into());
                Ok(DispatchOutcome {
                    success: false,
                    content: result.content,
                    error_message: Some(message),
                    error_type: Some("tool_error".into()),
                })
            }
            Ok(result) => Ok(DispatchOutcome::success(result.content)),
            Err(UpstreamError::Exhausted { attempts, last }) => {
                tracing::warn!(
                    tool = %external_tool_name,
                    upstream = %route.upstream_name,
                    attempts,
                    error = %last,
                    "gateway call exhausted retries"
                );
                Ok(DispatchOutcome::failure(
                    format!("all {attempts} attempts failed: {last}"),
                    "resiliency_exhausted",
                ))
            }
            Err(e @ (UpstreamError::Cancelled | UpstreamError::Unavailable(_))) => Err(e),
            Err(e) => Ok(DispatchOutcome::failure(e.to_string(), "upstream_error")),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
