//! Host endpoint registry — the tools exposed by the hosting service
//! itself, as opposed to tools aggregated from upstreams.
//!
//! Each registered endpoint couples an [`EndpointDescriptor`] (what
//! the catalog pipeline matches policies against) with an async
//! handler and an optional input [`TypeShape`] for schema generation.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::{json, Value};

use tg_catalog::descriptor::{sort_endpoints, EndpointDescriptor, EndpointSource};
use tg_schema::{Field, TypeShape};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Handler signature: JSON arguments in, JSON result or error text out.
pub type HandlerFn =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

pub struct HostEndpoint {
    pub descriptor: EndpointDescriptor,
    pub input_shape: Option<TypeShape>,
    pub handler: HandlerFn,
}

/// The host's invocable endpoints, keyed by operation id.
#[derive(Default)]
pub struct HandlerRegistry {
    endpoints: Vec<HostEndpoint>,
    by_operation: HashMap<String, usize>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint. A duplicate operation id replaces the
    /// earlier registration.
    pub fn register(&mut self, endpoint: HostEndpoint) {
        let operation_id = endpoint.descriptor.operation_id.clone();
        self.endpoints.push(endpoint);
        self.by_operation
            .insert(operation_id, self.endpoints.len() - 1);
    }

    pub fn handler(&self, operation_id: &str) -> Option<HandlerFn> {
        self.by_operation
            .get(operation_id)
            .map(|i| self.endpoints[*i].handler.clone())
    }

    /// Declared input shapes, consumed by the catalog builder.
    pub fn input_shapes(&self) -> HashMap<String, TypeShape> {
        self.endpoints
            .iter()
            .filter_map(|e| {
                e.input_shape
                    .clone()
                    .map(|shape| (e.descriptor.operation_id.clone(), shape))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

impl EndpointSource for HandlerRegistry {
    fn endpoints(&self) -> Vec<EndpointDescriptor> {
        let mut endpoints: Vec<EndpointDescriptor> = self
            .endpoints
            .iter()
            .map(|e| e.descriptor.clone())
            .collect();
        sort_endpoints(&mut endpoints);
        endpoints
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Built-in host endpoints
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn descriptor(method: &str, route: &str, op: &str, display: &str) -> EndpointDescriptor {
    EndpointDescriptor {
        route_template: route.into(),
        http_method: method.into(),
        operation_id: op.into(),
        display_name: display.into(),
        produces: vec!["application/json".into()],
        consumes: if method == "POST" {
            vec!["application/json".into()]
        } else {
            Vec::new()
        },
        requires_auth: false,
        acceptable_auth_schemes: Vec::new(),
    }
}

/// The built-in service endpoints every ToolGate instance hosts.
pub fn builtin_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();

    registry.register(HostEndpoint {
        descriptor: descriptor("GET", "/system/info", "system_info", "System Info"),
        input_shape: None,
        handler: Arc::new(|_args| {
            Box::pin(async {
                Ok(json!({
                    "service": "toolgate",
                    "version": env!("CARGO_PKG_VERSION"),
                    "pid": std::process::id(),
                }))
            })
        }),
    });

    registry.register(HostEndpoint {
        descriptor: descriptor("GET", "/system/time", "system_time", "System Time"),
        input_shape: None,
        handler: Arc::new(|_args| {
            Box::pin(async {
                Ok(json!({ "utc": chrono::Utc::now().to_rfc3339() }))
            })
        }),
    });

    registry.register(HostEndpoint {
        descriptor: descriptor("POST", "/echo", "echo", "Echo"),
        input_shape: Some(TypeShape::Record {
            name: "EchoRequest".into(),
            fields: vec![
                Field::required("message", TypeShape::String),
                Field::optional("uppercase", TypeShape::Bool),
            ],
        }),
        handler: Arc::new(|args| {
            Box::pin(async move {
                let message = args
                    .get("message")
                    .and_then(Value::as_str)
                    .ok_or_else(|| "missing required argument: message".to_string())?;
                let uppercase = args
                    .get("uppercase")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let message = if uppercase {
                    message.to_uppercase()
                } else {
                    message.to_string()
                };
                Ok(json!({ "message": message }))
            })
        }),
    });

    registry
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
