//! Timeout action — races the rest of the pipeline against the
//! effective deadline.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{ActionError, InvocationContext, Next, ToolAction, ToolOutput};

/// Order 100: the outermost built-in action, so the timeout covers
/// rate-limit queuing, cache builds, and the handler itself.
///
/// The effective timeout is the smaller of the policy's `timeout_ms`
/// and whatever remains of the caller's deadline. Losing the race
/// drops (cancels) the inner future.
pub struct TimeoutAction;

impl TimeoutAction {
    fn effective_ms(ctx: &InvocationContext) -> Option<u64> {
        let policy_ms = ctx.tool.policy.as_ref().and_then(|p| p.timeout_ms);
        let deadline_ms = ctx
            .deadline
            .map(|d| d.saturating_duration_since(Instant::now()).as_millis() as u64);
        match (policy_ms, deadline_ms) {
            (Some(p), Some(d)) => Some(p.min(d)),
            (Some(p), None) => Some(p),
            (None, Some(d)) => Some(d),
            (None, None) => None,
        }
    }
}

#[async_trait]
impl ToolAction for TimeoutAction {
    fn order(&self) -> i32 {
        100
    }

    fn name(&self) -> &'static str {
        "timeout"
    }

    fn applies_to(&self, ctx: &InvocationContext) -> bool {
        ctx.deadline.is_some()
            || ctx
                .tool
                .policy
                .as_ref()
                .is_some_and(|p| p.timeout_ms.is_some())
    }

    async fn invoke<'a>(
        &self,
        ctx: &'a InvocationContext,
        next: Next<'a>,
    ) -> Result<ToolOutput, ActionError> {
        let Some(ms) = Self::effective_ms(ctx) else {
            return next.run(ctx).await;
        };

        tokio::select! {
            _ = ctx.cancel.cancelled() => Err(ActionError::Cancelled),
            raced = tokio::time::timeout(Duration::from_millis(ms), next.run(ctx)) => {
                match raced {
                    Ok(result) => result,
                    Err(_) => Err(ActionError::Timeout { ms }),
                }
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
