//! `tg-mcp` — MCP wire protocol and the upstream gateway.
//!
//! This crate provides:
//! - JSON-RPC 2.0 protocol types shared by the server-side dispatcher
//!   and the upstream client ([`protocol`]).
//! - An HTTP client for upstream MCP servers ([`client`]).
//! - Static and discovery-backed upstream registries ([`registry`]).
//! - The gateway aggregator that probes upstreams and publishes a
//!   namespaced catalog snapshot ([`aggregator`]).
//! - The gateway dispatcher routing `tools/call` to the owning
//!   upstream through a resiliency policy ([`dispatcher`],
//!   [`resilience`]).
//! - Response redaction ([`redact`]).

pub mod aggregator;
pub mod client;
pub mod dispatcher;
pub mod protocol;
pub mod redact;
pub mod registry;
pub mod resilience;

pub use aggregator::{GatewayAggregator, GatewayCatalogSnapshot, GatewayToolRoute, UpstreamStatus};
pub use client::{UpstreamClient, UpstreamError};
pub use dispatcher::{DispatchOutcome, GatewayDispatcher};
pub use redact::Redactor;
pub use registry::{DiscoveryProvider, DynamicUpstreamRegistry, StaticUpstreamRegistry, UpstreamRegistry};
pub use resilience::{BoundedRetryPolicy, NoRetryPolicy, ResiliencyContext, ResiliencyPolicy};
