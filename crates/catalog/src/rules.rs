//! Generic ordered rule engine and the policy-matching rules.
//!
//! The engine holds an immutable, order-sorted rule array fixed at
//! construction. `execute` walks the array, applying every rule whose
//! `matches` returns true; the first `apply` failure stops execution
//! and propagates (partial effects are the caller's concern).
//! Cancellation is checked between rules.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use tg_domain::policy::{EndpointPolicy, PolicyKey};

use crate::descriptor::EndpointDescriptor;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("rule failed: {0}")]
    Apply(String),

    #[error("cancelled between rules")]
    Cancelled,
}

/// A single rule. Implementations must be thread-safe and should not
/// allocate during execution.
pub trait Rule<C>: Send + Sync {
    fn order(&self) -> i32;
    fn matches(&self, ctx: &C) -> bool;
    fn apply(&self, ctx: &mut C) -> Result<(), RuleError>;
}

/// Ordered, short-circuit-free rule pipeline over an immutable array.
pub struct RuleEngine<C> {
    rules: Arc<[Arc<dyn Rule<C>>]>,
}

impl<C> Clone for RuleEngine<C> {
    fn clone(&self) -> Self {
        Self {
            rules: self.rules.clone(),
        }
    }
}

impl<C> RuleEngine<C> {
    /// Stably sorts the rules by ascending `order` and freezes them.
    pub fn new(mut rules: Vec<Arc<dyn Rule<C>>>) -> Self {
        rules.sort_by_key(|r| r.order());
        Self {
            rules: rules.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every matching rule in order.
    pub fn execute(&self, ctx: &mut C, cancel: &CancellationToken) -> Result<(), RuleError> {
        for rule in self.rules.iter() {
            if cancel.is_cancelled() {
                return Err(RuleError::Cancelled);
            }
            if rule.matches(ctx) {
                rule.apply(ctx)?;
            }
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy matching
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Context for matching one endpoint descriptor against a policy list.
pub struct PolicyMatchContext {
    pub descriptor: EndpointDescriptor,
    pub policies: Arc<Vec<EndpointPolicy>>,
    /// Index into `policies` of the matched entry, set by the first
    /// rule that finds one.
    pub matched: Option<usize>,
}

impl PolicyMatchContext {
    pub fn new(descriptor: EndpointDescriptor, policies: Arc<Vec<EndpointPolicy>>) -> Self {
        Self {
            descriptor,
            policies,
            matched: None,
        }
    }

    pub fn matched_policy(&self) -> Option<&EndpointPolicy> {
        self.matched.map(|i| &self.policies[i])
    }
}

/// Route templates compare case-insensitively, ignoring a trailing slash.
fn routes_equal(a: &str, b: &str) -> bool {
    let norm = |s: &str| {
        let trimmed = s.trim_end_matches('/');
        if trimmed.is_empty() { "/" } else { trimmed }.to_ascii_lowercase()
    };
    norm(a) == norm(b)
}

/// Order 100: match on operation id.
pub struct OperationIdRule;

impl Rule<PolicyMatchContext> for OperationIdRule {
    fn order(&self) -> i32 {
        100
    }

    fn matches(&self, ctx: &PolicyMatchContext) -> bool {
        ctx.matched.is_none()
    }

    fn apply(&self, ctx: &mut PolicyMatchContext) -> Result<(), RuleError> {
        ctx.matched = ctx.policies.iter().position(|p| {
            matches!(p.identity(), Some(PolicyKey::OperationId(op))
                if op == ctx.descriptor.operation_id)
        });
        Ok(())
    }
}

/// Order 200: match on route template + HTTP method.
pub struct RouteMethodRule;

impl Rule<PolicyMatchContext> for RouteMethodRule {
    fn order(&self) -> i32 {
        200
    }

    fn matches(&self, ctx: &PolicyMatchContext) -> bool {
        ctx.matched.is_none()
    }

    fn apply(&self, ctx: &mut PolicyMatchContext) -> Result<(), RuleError> {
        ctx.matched = ctx.policies.iter().position(|p| {
            match p.identity() {
                Some(PolicyKey::Route { template, method }) => {
                    routes_equal(template, &ctx.descriptor.route_template)
                        && method.is_none_or(|m| {
                            m.eq_ignore_ascii_case(&ctx.descriptor.http_method)
                        })
                }
                _ => false,
            }
        });
        Ok(())
    }
}

/// Order 300: match on display name.
pub struct DisplayNameRule;

impl Rule<PolicyMatchContext> for DisplayNameRule {
    fn order(&self) -> i32 {
        300
    }

    fn matches(&self, ctx: &PolicyMatchContext) -> bool {
        ctx.matched.is_none()
    }

    fn apply(&self, ctx: &mut PolicyMatchContext) -> Result<(), RuleError> {
        ctx.matched = ctx.policies.iter().position(|p| {
            matches!(p.identity(), Some(PolicyKey::DisplayName(name))
                if name == ctx.descriptor.display_name)
        });
        Ok(())
    }
}

/// The standard policy-matching engine.
pub fn policy_match_engine() -> RuleEngine<PolicyMatchContext> {
    RuleEngine::new(vec![
        Arc::new(DisplayNameRule),
        Arc::new(OperationIdRule),
        Arc::new(RouteMethodRule),
    ])
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> EndpointDescriptor {
        EndpointDescriptor {
            route_template: "/weather".into(),
            http_method: "GET".into(),
            operation_id: "op1".into(),
            display_name: "Get Weather".into(),
            produces: Vec::new(),
            consumes: Vec::new(),
            requires_auth: false,
            acceptable_auth_schemes: Vec::new(),
        }
    }

    fn by_operation(op: &str) -> EndpointPolicy {
        EndpointPolicy {
            operation_id: Some(op.into()),
            ..EndpointPolicy::default()
        }
    }

    fn by_route(route: &str, method: &str) -> EndpointPolicy {
        EndpointPolicy {
            route_template: Some(route.into()),
            http_method: Some(method.into()),
            ..EndpointPolicy::default()
        }
    }

    fn by_display(name: &str) -> EndpointPolicy {
        EndpointPolicy {
            display_name: Some(name.into()),
            ..EndpointPolicy::default()
        }
    }

    fn run(policies: Vec<EndpointPolicy>) -> Option<usize> {
        let engine = policy_match_engine();
        let mut ctx = PolicyMatchContext::new(descriptor(), Arc::new(policies));
        engine
            .execute(&mut ctx, &CancellationToken::new())
            .unwrap();
        ctx.matched
    }

    #[test]
    fn operation_id_wins_over_route_and_display() {
        let matched = run(vec![
            by_route("/weather", "GET"),
            by_display("Get Weather"),
            by_operation("op1"),
        ]);
        assert_eq!(matched, Some(2));
    }

    #[test]
    fn route_match_requires_method() {
        assert_eq!(run(vec![by_route("/weather", "POST")]), None);
        assert_eq!(run(vec![by_route("/weather", "get")]), Some(0));
    }

    #[test]
    fn route_match_normalizes_trailing_slash_and_case() {
        assert_eq!(run(vec![by_route("/Weather/", "GET")]), Some(0));
    }

    #[test]
    fn display_name_is_last_resort() {
        let matched = run(vec![by_operation("other"), by_display("Get Weather")]);
        assert_eq!(matched, Some(1));
    }

    #[test]
    fn no_match_leaves_context_unset() {
        assert_eq!(run(vec![by_operation("nope"), by_display("nope")]), None);
    }

    #[test]
    fn rules_are_sorted_stably_by_order() {
        // Construction order above is shuffled; execution must still
        // resolve operation-id first.
        let engine = policy_match_engine();
        assert_eq!(engine.len(), 3);
        let matched = run(vec![by_display("Get Weather"), by_operation("op1")]);
        assert_eq!(matched, Some(1));
    }

    #[test]
    fn execution_is_deterministic() {
        let policies = vec![by_route("/weather", "GET"), by_operation("op1")];
        let first = run(policies.clone());
        let second = run(policies);
        assert_eq!(first, second);
    }

    #[test]
    fn cancellation_stops_execution() {
        let engine = policy_match_engine();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut ctx = PolicyMatchContext::new(descriptor(), Arc::new(vec![by_operation("op1")]));
        let err = engine.execute(&mut ctx, &cancel).unwrap_err();
        assert!(matches!(err, RuleError::Cancelled));
        assert_eq!(ctx.matched, None);
    }

    #[test]
    fn failing_apply_propagates() {
        struct FailingRule;
        impl Rule<PolicyMatchContext> for FailingRule {
            fn order(&self) -> i32 {
                50
            }
            fn matches(&self, _: &PolicyMatchContext) -> bool {
                true
            }
            fn apply(&self, _: &mut PolicyMatchContext) -> Result<(), RuleError> {
                Err(RuleError::Apply("boom".into()))
            }
        }

        let engine: RuleEngine<PolicyMatchContext> =
            RuleEngine::new(vec![Arc::new(FailingRule), Arc::new(OperationIdRule)]);
        let mut ctx = PolicyMatchContext::new(descriptor(), Arc::new(vec![by_operation("op1")]));
        let err = engine
            .execute(&mut ctx, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, RuleError::Apply(_)));
        // The operation-id rule never ran.
        assert_eq!(ctx.matched, None);
    }
}
