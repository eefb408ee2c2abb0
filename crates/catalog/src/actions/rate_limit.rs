//! Rate-limit action — per-tool token buckets.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use parking_lot::RwLock;

use tg_domain::policy::RateLimitPolicy;

use super::{ActionError, InvocationContext, Next, ToolAction, ToolOutput};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-tool limiter state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ToolLimiter {
    limiter: DefaultDirectRateLimiter,
    /// Callers currently waiting for a permit.
    queue_depth: AtomicU32,
    queue_limit: u32,
    window: Duration,
}

impl ToolLimiter {
    fn new(policy: &RateLimitPolicy) -> Self {
        let permits = NonZeroU32::new(policy.permit_limit.max(1)).unwrap_or(NonZeroU32::MIN);
        let window = Duration::from_millis(policy.window_ms.max(1));
        // Token bucket: capacity `permit_limit`, refilled evenly
        // across the window.
        let quota = Quota::with_period(window / permits.get())
            .unwrap_or_else(|| Quota::per_second(permits))
            .allow_burst(permits);
        Self {
            limiter: RateLimiter::direct(quota),
            queue_depth: AtomicU32::new(0),
            queue_limit: policy.queue_limit.unwrap_or(0),
            window,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Action
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Order 200: token-bucket rate limiting keyed by tool name.
///
/// Without a `queue_limit` a call that finds no permit is rejected
/// immediately. With one, up to `queue_limit` callers wait (bounded
/// by one window length) for a permit before being rejected.
pub struct RateLimitAction {
    limiters: RwLock<HashMap<String, Arc<ToolLimiter>>>,
}

impl RateLimitAction {
    pub fn new() -> Self {
        Self {
            limiters: RwLock::new(HashMap::new()),
        }
    }

    fn limiter_for(&self, tool_name: &str, policy: &RateLimitPolicy) -> Arc<ToolLimiter> {
        // Key includes the quota so a policy change after a reload
        // gets a fresh bucket instead of the stale one.
        let key = format!(
            "{tool_name}:{}:{}:{}",
            policy.permit_limit,
            policy.window_ms,
            policy.queue_limit.unwrap_or(0)
        );
        if let Some(existing) = self.limiters.read().get(&key) {
            return existing.clone();
        }
        let mut write = self.limiters.write();
        write
            .entry(key)
            .or_insert_with(|| Arc::new(ToolLimiter::new(policy)))
            .clone()
    }
}

impl Default for RateLimitAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolAction for RateLimitAction {
    fn order(&self) -> i32 {
        200
    }

    fn name(&self) -> &'static str {
        "rate-limit"
    }

    fn applies_to(&self, ctx: &InvocationContext) -> bool {
        ctx.tool
            .policy
            .as_ref()
            .is_some_and(|p| p.rate_limit.is_some())
    }

    async fn invoke<'a>(
        &self,
        ctx: &'a InvocationContext,
        next: Next<'a>,
    ) -> Result<ToolOutput, ActionError> {
        let Some(policy) = ctx.tool.policy.as_ref().and_then(|p| p.rate_limit.as_ref()) else {
            return next.run(ctx).await;
        };
        let limiter = self.limiter_for(&ctx.tool_name, policy);

        if limiter.limiter.check().is_ok() {
            return next.run(ctx).await;
        }

        if limiter.queue_limit == 0 {
            return Err(ActionError::RateLimited {
                tool: ctx.tool_name.clone(),
            });
        }

        // Bounded queue: take a waiting slot or reject.
        if limiter.queue_depth.fetch_add(1, Ordering::SeqCst) >= limiter.queue_limit {
            limiter.queue_depth.fetch_sub(1, Ordering::SeqCst);
            return Err(ActionError::RateLimited {
                tool: ctx.tool_name.clone(),
            });
        }

        // Wait at most two windows; a permit not freed by then means
        // the queue is hopelessly behind.
        let max_wait = limiter.window * 2;
        let waited = tokio::select! {
            _ = ctx.cancel.cancelled() => Err(ActionError::Cancelled),
            ready = tokio::time::timeout(max_wait, limiter.limiter.until_ready()) => {
                ready.map_err(|_| ActionError::RateLimited {
                    tool: ctx.tool_name.clone(),
                })
            }
        };
        limiter.queue_depth.fetch_sub(1, Ordering::SeqCst);
        waited?;

        next.run(ctx).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
