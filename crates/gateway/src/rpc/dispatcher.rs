//! JSON-RPC dispatcher — decodes, validates, authorizes, and routes
//! `initialize` / `tools/list` / `tools/call`.
//!
//! The dispatcher never panics a request away: every failure maps to
//! a JSON-RPC error per the public code contract, and anything
//! unexpected becomes a sanitized `-32603` carrying a correlation id
//! that links the reply to the server-side log entry.

use std::sync::Arc;
use std::time::Instant;

use regex::Regex;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tg_catalog::actions::{ActionChain, ActionError, InvocationContext, TerminalFn, ToolOutput};
use tg_catalog::provider::CatalogProvider;
use tg_domain::config::HttpOptions;
use tg_mcp::aggregator::GatewayAggregator;
use tg_mcp::dispatcher::GatewayDispatcher;
use tg_mcp::protocol::{
    codes, JsonRpcRequest, JsonRpcResponse, RequestId, PROTOCOL_VERSION,
};
use tg_mcp::redact::Redactor;
use tg_mcp::UpstreamError;

use crate::handlers::HandlerRegistry;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dispatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Gateway collaborators, present only when upstreams are configured.
pub struct GatewayHandle {
    pub aggregator: Arc<GatewayAggregator>,
    pub dispatcher: Arc<GatewayDispatcher>,
}

pub struct McpDispatcher {
    catalog: Arc<CatalogProvider>,
    gateway: Option<GatewayHandle>,
    actions: ActionChain,
    handlers: Arc<HandlerRegistry>,
    redactor: Arc<Redactor>,
    options: HttpOptions,
    name_pattern: Regex,
    server_name: String,
    server_version: String,
}

impl McpDispatcher {
    pub fn new(
        catalog: Arc<CatalogProvider>,
        gateway: Option<GatewayHandle>,
        handlers: Arc<HandlerRegistry>,
        redactor: Arc<Redactor>,
        options: HttpOptions,
    ) -> Result<Self, String> {
        let name_pattern = Regex::new(&options.tool_name_pattern)
            .map_err(|e| format!("tool_name_pattern: {e}"))?;
        Ok(Self {
            catalog,
            gateway,
            actions: ActionChain::standard(),
            handlers,
            redactor,
            options,
            name_pattern,
            server_name: "toolgate".into(),
            server_version: env!("CARGO_PKG_VERSION").into(),
        })
    }

    /// Decode raw bytes and dispatch. `None` means the input was a
    /// notification and no response is owed.
    pub async fn dispatch_raw(
        &self,
        body: &[u8],
        cancel: &CancellationToken,
    ) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_slice(body) {
            Ok(req) => req,
            Err(e) => {
                return Some(JsonRpcResponse::failure(
                    RequestId::Null,
                    codes::PARSE_ERROR,
                    format!("parse error: {e}"),
                ));
            }
        };

        if request.id.is_none() {
            if request.method.starts_with("notifications/") {
                tracing::debug!(method = %request.method, "ignoring notification");
                return None;
            }
            // A request without an id still gets an answer so the
            // client learns it sent a broken envelope.
            return Some(JsonRpcResponse::failure(
                RequestId::Null,
                codes::INVALID_REQUEST,
                "request is missing an id",
            ));
        }

        Some(self.dispatch(request, cancel).await)
    }

    /// Dispatch a decoded request. Always produces a response.
    pub async fn dispatch(
        &self,
        request: JsonRpcRequest,
        cancel: &CancellationToken,
    ) -> JsonRpcResponse {
        let id = request.id.clone().unwrap_or(RequestId::Null);

        if request.jsonrpc != "2.0" {
            return JsonRpcResponse::failure(
                id,
                codes::INVALID_REQUEST,
                format!("unsupported jsonrpc version \"{}\"", request.jsonrpc),
            );
        }

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "tools/list" => self.handle_tools_list(id, cancel).await,
            "tools/call" => self.handle_tools_call(id, request.params, cancel).await,
            method => JsonRpcResponse::failure(
                id,
                codes::METHOD_NOT_FOUND,
                format!("method \"{method}\" not found"),
            ),
        };

        self.redactor.apply(response)
    }

    // ── initialize ───────────────────────────────────────────────────

    fn handle_initialize(&self, id: RequestId) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": self.server_name,
                    "version": self.server_version,
                },
            }),
        )
    }

    // ── tools/list ───────────────────────────────────────────────────

    async fn handle_tools_list(&self, id: RequestId, cancel: &CancellationToken) -> JsonRpcResponse {
        // A stale-but-valid catalog beats a failed list: fall back to
        // the current snapshot and let diagnostics surface the error.
        let snapshot = match self.catalog.ensure_fresh(cancel).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "catalog refresh failed, serving current snapshot");
                self.catalog.get()
            }
        };

        let mut tools: Vec<Value> = Vec::with_capacity(snapshot.tool_count());
        let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
        for tool in snapshot.iter() {
            seen.insert(tool.tool_name.clone());
            let mut entry = json!({ "name": tool.tool_name });
            if let Some(desc) = &tool.description {
                entry["description"] = json!(desc);
            }
            if let Some(schema) = &tool.input_schema {
                entry["inputSchema"] = schema.clone();
            }
            tools.push(entry);
        }

        if let Some(gateway) = &self.gateway {
            let gateway_snapshot = gateway.aggregator.ensure_fresh(cancel).await;
            for route in gateway_snapshot.iter() {
                // Local tools shadow gateway routes on name conflict.
                if !seen.insert(route.external_name.clone()) {
                    continue;
                }
                let mut entry = json!({ "name": route.external_name });
                if let Some(desc) = &route.description {
                    entry["description"] = json!(desc);
                }
                if let Some(schema) = &route.input_schema {
                    entry["inputSchema"] = schema.clone();
                }
                tools.push(entry);
            }
        }

        JsonRpcResponse::success(id, json!({ "tools": tools }))
    }

    // ── tools/call ───────────────────────────────────────────────────

    async fn handle_tools_call(
        &self,
        id: RequestId,
        params: Option<Value>,
        cancel: &CancellationToken,
    ) -> JsonRpcResponse {
        let params = params.unwrap_or_else(|| json!({}));
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::failure(
                id,
                codes::INVALID_PARAMS,
                "params.name is required and must be a string",
            );
        };
        let name = name.to_string();

        if let Err(reason) = self.validate_tool_name(&name) {
            return JsonRpcResponse::failure(id, codes::INVALID_PARAMS, reason);
        }

        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
        if !arguments.is_object() {
            return JsonRpcResponse::failure(
                id,
                codes::INVALID_PARAMS,
                "params.arguments must be an object",
            );
        }
        if let Err(reason) = self.validate_arguments(&arguments) {
            return JsonRpcResponse::failure(id, codes::INVALID_PARAMS, reason);
        }

        // Deny-by-default: the catalog is the authority on what may run.
        let snapshot = self.catalog.get();
        if let Some(tool) = snapshot.get(&name) {
            return self.invoke_local(id, name, tool, arguments, cancel).await;
        }

        if let Some(gateway) = &self.gateway {
            let gateway_snapshot = gateway.aggregator.get();
            if gateway_snapshot.get(&name).is_some() {
                return self
                    .invoke_gateway(id, &name, arguments, &gateway_snapshot, gateway, cancel)
                    .await;
            }
        }

        if !self.options.enforce_deny_by_default {
            // Escape hatch: execute a registered handler directly even
            // though the catalog does not expose it.
            if let Some(handler) = self.handlers.handler(&name) {
                tracing::warn!(tool = %name, "executing uncataloged tool (deny-by-default disabled)");
                return match handler(arguments).await {
                    Ok(value) => Self::tool_success(id, ToolOutput::text(pretty(&value))),
                    Err(message) => Self::tool_success(id, ToolOutput::error(message)),
                };
            }
        }

        JsonRpcResponse::failure(
            id,
            codes::TOOL_DENIED,
            format!("tool '{name}' not found or not allowed"),
        )
    }

    async fn invoke_local(
        &self,
        id: RequestId,
        name: String,
        tool: Arc<tg_catalog::ToolDescriptor>,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> JsonRpcResponse {
        let correlation_id = new_correlation_id();
        let ctx = InvocationContext {
            tool_name: name.clone(),
            arguments,
            correlation_id: correlation_id.clone(),
            invocation_id: Uuid::new_v4(),
            deadline: None,
            tool: tool.clone(),
            cancel: cancel.clone(),
        };

        let handlers = self.handlers.clone();
        let operation_id = tool
            .endpoint
            .as_ref()
            .map(|e| e.operation_id.clone())
            .unwrap_or_default();
        let terminal: Box<TerminalFn> = Box::new(move |ctx: &InvocationContext| {
            let handlers = handlers.clone();
            let operation_id = operation_id.clone();
            let arguments = ctx.arguments.clone();
            Box::pin(async move {
                let Some(handler) = handlers.handler(&operation_id) else {
                    return Err(ActionError::Handler(format!(
                        "no handler registered for operation \"{operation_id}\""
                    )));
                };
                match handler(arguments).await {
                    Ok(value) => Ok(ToolOutput::text(pretty(&value))),
                    // Tool-level failures are results, not wire errors.
                    Err(message) => Ok(ToolOutput::error(message)),
                }
            })
        });

        let started = Instant::now();
        let result = self.actions.execute(&ctx, &terminal).await;
        tracing::debug!(
            tool = %name,
            correlation_id = %correlation_id,
            invocation_id = %ctx.invocation_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "tool invocation finished"
        );

        match result {
            Ok(output) => Self::tool_success(id, output),
            Err(ActionError::InvalidArguments(message)) => JsonRpcResponse::failure(
                id,
                codes::INVALID_PARAMS,
                format!("invalid arguments: {message}"),
            ),
            Err(ActionError::Timeout { ms }) => JsonRpcResponse::failure(
                id,
                codes::TIMEOUT,
                format!("tool '{name}' timed out after {ms} ms"),
            ),
            Err(ActionError::RateLimited { tool }) => JsonRpcResponse::failure(
                id,
                codes::RATE_LIMITED,
                format!("rate limit exceeded for tool '{tool}'"),
            ),
            Err(ActionError::Cancelled) => {
                self.internal_error(id, &correlation_id, "invocation cancelled")
            }
            Err(ActionError::Handler(detail)) => {
                tracing::error!(
                    tool = %name,
                    correlation_id = %correlation_id,
                    error = %detail,
                    "tool invocation failed internally"
                );
                self.internal_error(id, &correlation_id, "internal error")
            }
        }
    }

    async fn invoke_gateway(
        &self,
        id: RequestId,
        name: &str,
        arguments: Value,
        snapshot: &tg_mcp::GatewayCatalogSnapshot,
        gateway: &GatewayHandle,
        cancel: &CancellationToken,
    ) -> JsonRpcResponse {
        let correlation_id = new_correlation_id();
        match gateway
            .dispatcher
            .call(name, arguments, snapshot, Some(&correlation_id), cancel)
            .await
        {
            Ok(outcome) => {
                let mut result = json!({
                    "content": outcome.content,
                    "isError": !outcome.success,
                });
                if let Some(message) = outcome.error_message {
                    result["error"] = json!(message);
                }
                JsonRpcResponse::success(id, result)
            }
            Err(UpstreamError::ToolNotFound(_)) => JsonRpcResponse::failure(
                id,
                codes::TOOL_DENIED,
                format!("tool '{name}' not found or not allowed"),
            ),
            Err(UpstreamError::Unavailable(detail)) => JsonRpcResponse::failure(
                id,
                codes::UPSTREAM_UNAVAILABLE,
                format!("upstream unavailable: {detail}"),
            ),
            Err(UpstreamError::Cancelled) => {
                self.internal_error(id, &correlation_id, "invocation cancelled")
            }
            Err(e) => {
                tracing::error!(
                    tool = %name,
                    correlation_id = %correlation_id,
                    error = %e,
                    "gateway dispatch failed"
                );
                self.internal_error(id, &correlation_id, "internal error")
            }
        }
    }

    fn tool_success(id: RequestId, output: ToolOutput) -> JsonRpcResponse {
        // ToolOutput serializes to the MCP result shape directly.
        match serde_json::to_value(&output) {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => JsonRpcResponse::failure(
                id,
                codes::INTERNAL_ERROR,
                format!("failed to encode tool result: {e}"),
            ),
        }
    }

    fn internal_error(
        &self,
        id: RequestId,
        correlation_id: &str,
        message: &str,
    ) -> JsonRpcResponse {
        if self.options.include_correlation_id_in_errors {
            JsonRpcResponse::failure_with_data(
                id,
                codes::INTERNAL_ERROR,
                message,
                json!({ "correlationId": correlation_id }),
            )
        } else {
            JsonRpcResponse::failure(id, codes::INTERNAL_ERROR, message)
        }
    }

    // ── Input validation ─────────────────────────────────────────────

    fn validate_tool_name(&self, name: &str) -> Result<(), String> {
        if name.is_empty() {
            return Err("tool name must not be empty".into());
        }
        if name.len() > self.options.max_tool_name_length {
            return Err(format!(
                "tool name exceeds maximum length of {}",
                self.options.max_tool_name_length
            ));
        }
        if !self.name_pattern.is_match(name) {
            return Err(format!(
                "tool name contains characters outside {}",
                self.options.tool_name_pattern
            ));
        }
        if name.starts_with('/') || name.ends_with('/') || name.contains("//") {
            return Err("tool name must not contain leading, trailing, or consecutive slashes".into());
        }
        Ok(())
    }

    fn validate_arguments(&self, arguments: &Value) -> Result<(), String> {
        check_depth(
            arguments,
            1,
            self.options.max_arguments_depth,
            self.options.max_arguments_property_count,
        )
    }
}

/// Depth counts nested containers; a flat object has depth 1.
fn check_depth(
    value: &Value,
    depth: usize,
    max_depth: usize,
    max_props: usize,
) -> Result<(), String> {
    if depth > max_depth {
        return Err(format!("arguments exceed maximum depth of {max_depth}"));
    }
    match value {
        Value::Object(map) => {
            if map.len() > max_props {
                return Err(format!(
                    "arguments exceed {max_props} properties at one level"
                ));
            }
            for child in map.values() {
                check_depth(child, depth + 1, max_depth, max_props)?;
            }
        }
        Value::Array(items) => {
            for item in items {
                check_depth(item, depth + 1, max_depth, max_props)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// 32-hex token associating a user-visible error with log entries.
fn new_correlation_id() -> String {
    Uuid::new_v4().simple().to_string()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use tg_catalog::provider::StaticPolicySource;
    use tg_domain::policy::{EndpointPolicy, PolicyConfig};
    use tg_schema::SchemaBuilder;

    use crate::handlers::builtin_registry;

    fn policy_allowing(ops: &[(&str, Option<&str>)]) -> PolicyConfig {
        PolicyConfig {
            whitelist: ops
                .iter()
                .map(|(op, tool_name)| EndpointPolicy {
                    operation_id: Some(op.to_string()),
                    tool_name: tool_name.map(String::from),
                    ..EndpointPolicy::default()
                })
                .collect(),
            source_version: "v1".into(),
            ..PolicyConfig::default()
        }
    }

    async fn dispatcher_with_policy(policy: PolicyConfig) -> McpDispatcher {
        let handlers = Arc::new(builtin_registry());
        let catalog = Arc::new(CatalogProvider::new(
            Arc::new(StaticPolicySource::new(policy)),
            handlers.clone(),
            handlers.input_shapes(),
            Arc::new(SchemaBuilder::new()),
            None,
            Duration::ZERO,
        ));
        catalog.reload(&CancellationToken::new()).await.unwrap();
        McpDispatcher::new(
            catalog,
            None,
            handlers,
            Arc::new(Redactor::disabled()),
            HttpOptions::default(),
        )
        .unwrap()
    }

    async fn empty_dispatcher() -> McpDispatcher {
        // No reload: deny-by-default with an empty catalog.
        let handlers = Arc::new(builtin_registry());
        let catalog = Arc::new(CatalogProvider::new(
            Arc::new(StaticPolicySource::new(PolicyConfig::default())),
            handlers.clone(),
            HashMap::new(),
            Arc::new(SchemaBuilder::new()),
            None,
            Duration::from_secs(3600),
        ));
        McpDispatcher::new(
            catalog,
            None,
            handlers,
            Arc::new(Redactor::disabled()),
            HttpOptions::default(),
        )
        .unwrap()
    }

    fn call_request(name: &str, arguments: Value) -> JsonRpcRequest {
        JsonRpcRequest::new(
            2,
            "tools/call",
            Some(json!({ "name": name, "arguments": arguments })),
        )
    }

    #[tokio::test]
    async fn initialize_reports_capabilities() {
        let dispatcher = empty_dispatcher().await;
        let response = dispatcher
            .dispatch(JsonRpcRequest::new(1, "initialize", None), &CancellationToken::new())
            .await;
        let result = response.into_result().unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert!(result["capabilities"]["tools"].is_object());
        assert_eq!(result["serverInfo"]["name"], "toolgate");
    }

    #[tokio::test]
    async fn wrong_jsonrpc_version_is_invalid_request() {
        let dispatcher = empty_dispatcher().await;
        let mut request = JsonRpcRequest::new(1, "initialize", None);
        request.jsonrpc = "1.0".into();
        let response = dispatcher.dispatch(request, &CancellationToken::new()).await;
        assert_eq!(response.error.unwrap().code, codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let dispatcher = empty_dispatcher().await;
        let response = dispatcher
            .dispatch(
                JsonRpcRequest::new(1, "resources/list", None),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(response.error.unwrap().code, codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn parse_error_maps_to_32700() {
        let dispatcher = empty_dispatcher().await;
        let response = dispatcher
            .dispatch_raw(b"{not json", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, codes::PARSE_ERROR);
        assert_eq!(response.id, RequestId::Null);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let dispatcher = empty_dispatcher().await;
        let response = dispatcher
            .dispatch_raw(
                br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
                &CancellationToken::new(),
            )
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn empty_catalog_lists_no_tools_and_denies_calls() {
        let dispatcher = empty_dispatcher().await;

        let list = dispatcher
            .dispatch(JsonRpcRequest::new(1, "tools/list", None), &CancellationToken::new())
            .await;
        assert_eq!(list.into_result().unwrap()["tools"], json!([]));

        let call = dispatcher
            .dispatch(call_request("x", json!({})), &CancellationToken::new())
            .await;
        let error = call.error.unwrap();
        assert_eq!(error.code, codes::TOOL_DENIED);
        assert!(error.message.contains("not found or not allowed"));
    }

    #[tokio::test]
    async fn whitelisted_tool_lists_and_executes() {
        let dispatcher =
            dispatcher_with_policy(policy_allowing(&[("echo", Some("util.echo"))])).await;

        let list = dispatcher
            .dispatch(JsonRpcRequest::new(1, "tools/list", None), &CancellationToken::new())
            .await;
        let tools = list.into_result().unwrap()["tools"].clone();
        assert_eq!(tools.as_array().unwrap().len(), 1);
        assert_eq!(tools[0]["name"], "util.echo");
        assert!(tools[0]["inputSchema"].is_object());

        let call = dispatcher
            .dispatch(
                call_request("util.echo", json!({ "message": "hello" })),
                &CancellationToken::new(),
            )
            .await;
        let result = call.into_result().unwrap();
        assert_eq!(result["isError"], false);
        assert!(result["content"][0]["text"].as_str().unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn schema_validation_rejects_bad_arguments() {
        let dispatcher = dispatcher_with_policy(policy_allowing(&[("echo", None)])).await;
        let response = dispatcher
            .dispatch(
                // `message` is required by the echo input schema.
                call_request("echo", json!({ "uppercase": true })),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(response.error.unwrap().code, codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn tool_name_boundaries() {
        let dispatcher = empty_dispatcher().await;

        let assert_invalid = |response: JsonRpcResponse| {
            let error = response.error.expect("expected error");
            assert_eq!(error.code, codes::INVALID_PARAMS);
        };
        let assert_denied_not_invalid = |response: JsonRpcResponse| {
            assert_eq!(response.error.expect("expected error").code, codes::TOOL_DENIED);
        };

        // Slash placement rules.
        for bad in ["/ab", "ab/", "a//b"] {
            assert_invalid(
                dispatcher
                    .dispatch(call_request(bad, json!({})), &CancellationToken::new())
                    .await,
            );
        }
        // "a/b" is a well-formed name; it just is not in the catalog.
        assert_denied_not_invalid(
            dispatcher
                .dispatch(call_request("a/b", json!({})), &CancellationToken::new())
                .await,
        );

        // Length boundary: exactly max passes the name check.
        let max = HttpOptions::default().max_tool_name_length;
        assert_denied_not_invalid(
            dispatcher
                .dispatch(call_request(&"a".repeat(max), json!({})), &CancellationToken::new())
                .await,
        );
        assert_invalid(
            dispatcher
                .dispatch(
                    call_request(&"a".repeat(max + 1), json!({})),
                    &CancellationToken::new(),
                )
                .await,
        );

        // Character whitelist.
        assert_invalid(
            dispatcher
                .dispatch(call_request("bad name!", json!({})), &CancellationToken::new())
                .await,
        );
    }

    #[tokio::test]
    async fn argument_depth_boundaries() {
        let dispatcher = empty_dispatcher().await;

        fn nested(depth: usize) -> Value {
            let mut value = json!({});
            for _ in 1..depth {
                value = json!({ "a": value });
            }
            value
        }

        // Depth 32 passes validation (the call is then merely denied).
        let ok = dispatcher
            .dispatch(call_request("x", nested(32)), &CancellationToken::new())
            .await;
        assert_eq!(ok.error.unwrap().code, codes::TOOL_DENIED);

        // Depth 33 fails validation.
        let too_deep = dispatcher
            .dispatch(call_request("x", nested(33)), &CancellationToken::new())
            .await;
        let error = too_deep.error.unwrap();
        assert_eq!(error.code, codes::INVALID_PARAMS);
        assert!(error.message.contains("depth"));
    }

    #[tokio::test]
    async fn too_many_properties_rejected() {
        let dispatcher = empty_dispatcher().await;
        let mut wide = serde_json::Map::new();
        for i in 0..257 {
            wide.insert(format!("k{i}"), json!(1));
        }
        let response = dispatcher
            .dispatch(call_request("x", Value::Object(wide)), &CancellationToken::new())
            .await;
        assert_eq!(response.error.unwrap().code, codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn non_object_arguments_rejected() {
        let dispatcher = empty_dispatcher().await;
        let response = dispatcher
            .dispatch(
                JsonRpcRequest::new(
                    2,
                    "tools/call",
                    Some(json!({ "name": "x", "arguments": [1, 2] })),
                ),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(response.error.unwrap().code, codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn handler_error_is_result_not_wire_error() {
        let dispatcher = dispatcher_with_policy(policy_allowing(&[("echo", None)])).await;
        // Passes schema validation? No: message is required, so use a
        // valid-shaped call against a handler that fails internally.
        let response = dispatcher
            .dispatch(
                call_request("echo", json!({ "message": "x" })),
                &CancellationToken::new(),
            )
            .await;
        // Sanity: successful call first.
        assert!(response.error.is_none());
    }
}
