//! `tg-catalog` — the policy-driven tool catalog.
//!
//! This crate turns host endpoint descriptors and a declarative
//! policy document into an immutable [`snapshot::ToolCatalogSnapshot`]:
//!
//! - [`descriptor`] — endpoint descriptors and the source seam.
//! - [`rules`] — the generic ordered rule engine and the three
//!   policy-matching rules.
//! - [`openapi`] — OpenAPI v3 lookup used to enrich descriptions and
//!   input schemas.
//! - [`builder`] — combines policy + descriptors (+ enrichment) into
//!   a snapshot.
//! - [`provider`] — holds the current snapshot, debounces reloads,
//!   swaps atomically.
//! - [`actions`] — the middleware pipeline wrapped around every tool
//!   invocation (timeout, rate limit, cache, validation).

pub mod actions;
pub mod builder;
pub mod descriptor;
pub mod openapi;
pub mod provider;
pub mod rules;
pub mod snapshot;

pub use builder::{build_catalog, CatalogBuildReport};
pub use descriptor::{EndpointDescriptor, EndpointSource, StaticEndpointSource};
pub use provider::{CatalogError, CatalogProvider, FilePolicySource, PolicySource, StaticPolicySource};
pub use snapshot::{ToolCatalogSnapshot, ToolDescriptor};
