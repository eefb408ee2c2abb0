//! Action pipeline — middleware wrapped around each tool invocation.
//!
//! Actions expose an order, an applicability check, and an `invoke`
//! that receives the rest of the pipeline as [`Next`]. `Next` is
//! consumed by value, so it can be called at most once; dropping it
//! short-circuits the remainder of the pipeline.
//!
//! Built-ins, in execution order: [`timeout::TimeoutAction`] (100),
//! [`rate_limit::RateLimitAction`] (200), [`cache::CacheAction`]
//! (300), [`validate::ValidationAction`] (400).

pub mod cache;
pub mod rate_limit;
pub mod timeout;
pub mod validate;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::snapshot::ToolDescriptor;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Invocation context & output
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-call context. Lives for exactly one invocation.
pub struct InvocationContext {
    pub tool_name: String,
    /// JSON object of call arguments.
    pub arguments: Value,
    pub correlation_id: String,
    pub invocation_id: Uuid,
    /// Caller-imposed deadline, combined with the policy timeout by
    /// the timeout action.
    pub deadline: Option<Instant>,
    pub tool: Arc<ToolDescriptor>,
    pub cancel: CancellationToken,
}

/// A single content item in a tool result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

impl ContentItem {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".into(),
            text: text.into(),
        }
    }
}

/// The result of a tool invocation, MCP-shaped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolOutput {
    pub content: Vec<ContentItem>,
    #[serde(rename = "isError")]
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::text(text)],
            is_error: false,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            content: vec![ContentItem::text(message.clone())],
            is_error: true,
            error: Some(message),
        }
    }
}

/// Failures raised inside the pipeline.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ActionError {
    #[error("tool timed out after {ms} ms")]
    Timeout { ms: u64 },

    #[error("rate limit exceeded for tool '{tool}'")]
    RateLimited { tool: String },

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("handler: {0}")]
    Handler(String),

    #[error("invocation cancelled")]
    Cancelled,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Action trait & chain
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The terminal step that actually executes the tool.
pub type TerminalFn =
    dyn for<'a> Fn(&'a InvocationContext) -> BoxFuture<'a, Result<ToolOutput, ActionError>>
        + Send
        + Sync;

/// The remainder of the pipeline. Consumed on call.
pub struct Next<'a> {
    chain: &'a [Arc<dyn ToolAction>],
    terminal: &'a TerminalFn,
}

impl<'a> Next<'a> {
    pub fn run(self, ctx: &'a InvocationContext) -> BoxFuture<'a, Result<ToolOutput, ActionError>> {
        Box::pin(async move {
            match self.chain.split_first() {
                Some((head, rest)) => {
                    head.invoke(
                        ctx,
                        Next {
                            chain: rest,
                            terminal: self.terminal,
                        },
                    )
                    .await
                }
                None => (self.terminal)(ctx).await,
            }
        })
    }
}

/// A middleware step wrapping tool invocation.
#[async_trait]
pub trait ToolAction: Send + Sync {
    fn order(&self) -> i32;

    fn name(&self) -> &'static str;

    /// Whether this action participates in the given call.
    fn applies_to(&self, ctx: &InvocationContext) -> bool;

    /// Run the action. Call `next.run(ctx)` at most once; skipping it
    /// short-circuits the rest of the pipeline.
    async fn invoke<'a>(
        &self,
        ctx: &'a InvocationContext,
        next: Next<'a>,
    ) -> Result<ToolOutput, ActionError>;
}

/// Order-sorted action set shared across calls.
pub struct ActionChain {
    actions: Vec<Arc<dyn ToolAction>>,
}

impl ActionChain {
    pub fn new(mut actions: Vec<Arc<dyn ToolAction>>) -> Self {
        actions.sort_by_key(|a| a.order());
        Self { actions }
    }

    /// The default pipeline: timeout, rate limit, cache, validation.
    pub fn standard() -> Self {
        Self::new(vec![
            Arc::new(timeout::TimeoutAction),
            Arc::new(rate_limit::RateLimitAction::new()),
            Arc::new(cache::CacheAction::new()),
            Arc::new(validate::ValidationAction::new()),
        ])
    }

    /// Compose the applicable actions around `terminal` and run.
    pub async fn execute(
        &self,
        ctx: &InvocationContext,
        terminal: &TerminalFn,
    ) -> Result<ToolOutput, ActionError> {
        let applicable: Vec<Arc<dyn ToolAction>> = self
            .actions
            .iter()
            .filter(|a| a.applies_to(ctx))
            .cloned()
            .collect();
        Next {
            chain: &applicable,
            terminal,
        }
        .run(ctx)
        .await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    use tg_domain::policy::EffectivePolicy;

    pub(crate) fn context(tool_name: &str, policy: Option<EffectivePolicy>) -> InvocationContext {
        context_with_args(tool_name, policy, json!({}))
    }

    pub(crate) fn context_with_args(
        tool_name: &str,
        policy: Option<EffectivePolicy>,
        arguments: Value,
    ) -> InvocationContext {
        InvocationContext {
            tool_name: tool_name.into(),
            arguments,
            correlation_id: "c0ffee".into(),
            invocation_id: Uuid::new_v4(),
            deadline: None,
            tool: Arc::new(ToolDescriptor {
                tool_name: tool_name.into(),
                description: None,
                input_schema: None,
                endpoint: None,
                policy,
                response_schema: None,
            }),
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn terminal_ok(text: &'static str) -> Box<TerminalFn> {
        Box::new(move |_ctx| Box::pin(async move { Ok(ToolOutput::text(text)) }))
    }

    struct TagAction {
        order: i32,
        tag: &'static str,
    }

    #[async_trait]
    impl ToolAction for TagAction {
        fn order(&self) -> i32 {
            self.order
        }
        fn name(&self) -> &'static str {
            "tag"
        }
        fn applies_to(&self, _: &InvocationContext) -> bool {
            true
        }
        async fn invoke<'a>(
            &self,
            ctx: &'a InvocationContext,
            next: Next<'a>,
        ) -> Result<ToolOutput, ActionError> {
            let mut out = next.run(ctx).await?;
            out.content.push(ContentItem::text(self.tag));
            Ok(out)
        }
    }

    struct ShortCircuitAction;

    #[async_trait]
    impl ToolAction for ShortCircuitAction {
        fn order(&self) -> i32 {
            10
        }
        fn name(&self) -> &'static str {
            "short-circuit"
        }
        fn applies_to(&self, _: &InvocationContext) -> bool {
            true
        }
        async fn invoke<'a>(
            &self,
            _ctx: &'a InvocationContext,
            _next: Next<'a>,
        ) -> Result<ToolOutput, ActionError> {
            Ok(ToolOutput::text("short-circuited"))
        }
    }

    #[tokio::test]
    async fn chain_runs_in_ascending_order() {
        let chain = ActionChain::new(vec![
            Arc::new(TagAction { order: 200, tag: "inner" }),
            Arc::new(TagAction { order: 100, tag: "outer" }),
        ]);
        let ctx = context("t", None);
        let out = chain.execute(&ctx, &*terminal_ok("result")).await.unwrap();
        let texts: Vec<&str> = out.content.iter().map(|c| c.text.as_str()).collect();
        // Inner action appends first on the way out, outer appends last.
        assert_eq!(texts, vec!["result", "inner", "outer"]);
    }

    #[tokio::test]
    async fn skipping_next_short_circuits() {
        let chain = ActionChain::new(vec![
            Arc::new(ShortCircuitAction),
            Arc::new(TagAction { order: 20, tag: "never" }),
        ]);
        let ctx = context("t", None);
        let out = chain.execute(&ctx, &*terminal_ok("result")).await.unwrap();
        assert_eq!(out.content.len(), 1);
        assert_eq!(out.content[0].text, "short-circuited");
    }

    #[tokio::test]
    async fn empty_chain_calls_terminal() {
        let chain = ActionChain::new(Vec::new());
        let ctx = context("t", None);
        let out = chain.execute(&ctx, &*terminal_ok("direct")).await.unwrap();
        assert_eq!(out.content[0].text, "direct");
        assert!(!out.is_error);
    }

    #[tokio::test]
    async fn inapplicable_actions_are_skipped() {
        struct NeverApplies;

        #[async_trait]
        impl ToolAction for NeverApplies {
            fn order(&self) -> i32 {
                1
            }
            fn name(&self) -> &'static str {
                "never"
            }
            fn applies_to(&self, _: &InvocationContext) -> bool {
                false
            }
            async fn invoke<'a>(
                &self,
                _ctx: &'a InvocationContext,
                _next: Next<'a>,
            ) -> Result<ToolOutput, ActionError> {
                Err(ActionError::Handler("should not run".into()))
            }
        }

        let chain = ActionChain::new(vec![Arc::new(NeverApplies)]);
        let ctx = context("t", None);
        let out = chain.execute(&ctx, &*terminal_ok("ok")).await.unwrap();
        assert_eq!(out.content[0].text, "ok");
    }
}
