//! Endpoint descriptors and the source seam.
//!
//! The host service describes each of its invocable endpoints with an
//! [`EndpointDescriptor`]. A descriptor list is fetched once per
//! catalog reload through the [`EndpointSource`] trait; extraction is
//! idempotent and the output is totally ordered so catalog builds are
//! deterministic.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EndpointDescriptor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Description of one host endpoint, one HTTP method each.
///
/// Descriptor identities are not stable across reloads; callers must
/// not retain them beyond the invocation they were resolved for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub route_template: String,
    pub http_method: String,
    pub operation_id: String,
    pub display_name: String,
    #[serde(default)]
    pub produces: Vec<String>,
    #[serde(default)]
    pub consumes: Vec<String>,
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default)]
    pub acceptable_auth_schemes: Vec<String>,
}

/// Produces the host's endpoint descriptors. Implementations must be
/// idempotent: calling twice without a host change yields equal lists.
pub trait EndpointSource: Send + Sync {
    /// The current descriptors, sorted by
    /// (http_method, route_template, display_name).
    fn endpoints(&self) -> Vec<EndpointDescriptor>;
}

/// Sort descriptors into the canonical catalog order.
pub fn sort_endpoints(endpoints: &mut [EndpointDescriptor]) {
    endpoints.sort_by(|a, b| {
        a.http_method
            .cmp(&b.http_method)
            .then_with(|| a.route_template.cmp(&b.route_template))
            .then_with(|| a.display_name.cmp(&b.display_name))
    });
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Static source
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fixed descriptor list, mainly for composition and tests.
///
/// Entries registered with multiple HTTP methods are split into one
/// descriptor per method at construction.
pub struct StaticEndpointSource {
    endpoints: Vec<EndpointDescriptor>,
}

impl StaticEndpointSource {
    pub fn new(mut endpoints: Vec<EndpointDescriptor>) -> Self {
        sort_endpoints(&mut endpoints);
        Self { endpoints }
    }

    /// Build from (descriptor, methods) pairs, emitting one descriptor
    /// per method.
    pub fn from_multi_method(entries: Vec<(EndpointDescriptor, Vec<String>)>) -> Self {
        let mut endpoints = Vec::new();
        for (descriptor, methods) in entries {
            if methods.is_empty() {
                endpoints.push(descriptor);
                continue;
            }
            for method in methods {
                let mut per_method = descriptor.clone();
                per_method.http_method = method.to_ascii_uppercase();
                endpoints.push(per_method);
            }
        }
        Self::new(endpoints)
    }
}

impl EndpointSource for StaticEndpointSource {
    fn endpoints(&self) -> Vec<EndpointDescriptor> {
        self.endpoints.clone()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
