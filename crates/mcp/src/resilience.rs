//! Resiliency policies for upstream calls.
//!
//! Retries apply only to transient failures (HTTP 502/503/504 and
//! request timeouts); caller cancellation always propagates
//! immediately and is never converted into a retry.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::client::UpstreamError;
use crate::protocol::ToolCallResult;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-dispatch context carried through the retry loop.
#[derive(Debug, Clone)]
pub struct ResiliencyContext {
    pub external_tool_name: String,
    pub upstream_name: String,
    pub endpoint: String,
    pub correlation_id: Option<String>,
    pub invocation_id: Uuid,
    /// 0-indexed; updated before each attempt.
    pub attempt: u32,
}

impl ResiliencyContext {
    pub fn new(
        external_tool_name: impl Into<String>,
        upstream_name: impl Into<String>,
        endpoint: impl Into<String>,
        correlation_id: Option<String>,
    ) -> Self {
        Self {
            external_tool_name: external_tool_name.into(),
            upstream_name: upstream_name.into(),
            endpoint: endpoint.into(),
            correlation_id,
            invocation_id: Uuid::new_v4(),
            attempt: 0,
        }
    }
}

/// One attempt of the underlying upstream call, keyed by attempt number.
pub type UpstreamOp<'a> =
    Box<dyn Fn(u32) -> BoxFuture<'a, Result<ToolCallResult, UpstreamError>> + Send + Sync + 'a>;

#[async_trait]
pub trait ResiliencyPolicy: Send + Sync {
    async fn execute<'a>(
        &self,
        rcx: &mut ResiliencyContext,
        cancel: &CancellationToken,
        op: UpstreamOp<'a>,
    ) -> Result<ToolCallResult, UpstreamError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// No-retry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fail-fast passthrough.
pub struct NoRetryPolicy;

#[async_trait]
impl ResiliencyPolicy for NoRetryPolicy {
    async fn execute<'a>(
        &self,
        rcx: &mut ResiliencyContext,
        cancel: &CancellationToken,
        op: UpstreamOp<'a>,
    ) -> Result<ToolCallResult, UpstreamError> {
        rcx.attempt = 0;
        tokio::select! {
            _ = cancel.cancelled() => Err(UpstreamError::Cancelled),
            result = op(0) => result,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Bounded retry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Bounded retry with exponential backoff and jitter.
///
/// At most `retry_count + 1` attempts. The delay before retry `k`
/// (0-indexed attempt that just failed) is
/// `min(max_delay, base · 2^k + uniform[0, base/2))`.
pub struct BoundedRetryPolicy {
    pub retry_count: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for BoundedRetryPolicy {
    fn default() -> Self {
        Self {
            retry_count: 1,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        }
    }
}

impl BoundedRetryPolicy {
    pub fn new(retry_count: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            retry_count,
            base_delay_ms,
            max_delay_ms,
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay_ms
            .saturating_mul(1u64 << attempt.min(20));
        let jitter_bound = self.base_delay_ms / 2;
        let jitter = if jitter_bound > 0 {
            fastrand::u64(0..jitter_bound)
        } else {
            0
        };
        Duration::from_millis(exponential.saturating_add(jitter).min(self.max_delay_ms))
    }
}

#[async_trait]
impl ResiliencyPolicy for BoundedRetryPolicy {
    async fn execute<'a>(
        &self,
        rcx: &mut ResiliencyContext,
        cancel: &CancellationToken,
        op: UpstreamOp<'a>,
    ) -> Result<ToolCallResult, UpstreamError> {
        let mut attempt = 0u32;
        loop {
            rcx.attempt = attempt;
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
                result = op(attempt) => result,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    if attempt >= self.retry_count {
                        return Err(UpstreamError::Exhausted {
                            attempts: attempt + 1,
                            last: Box::new(e),
                        });
                    }
                    let delay = self.backoff_delay(attempt);
                    tracing::warn!(
                        tool = %rcx.external_tool_name,
                        upstream = %rcx.upstream_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient upstream failure, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(UpstreamError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
