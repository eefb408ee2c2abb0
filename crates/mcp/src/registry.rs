//! Upstream registries — static config and dynamic discovery.
//!
//! Both implementations share the same contract: `upstreams()`
//! returns only enabled entries with unique names and unique
//! namespace prefixes, and `watch()` optionally exposes a change
//! channel the aggregator can subscribe to.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;

use tg_domain::config::GatewayUpstream;

use crate::client::UpstreamError;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
pub trait UpstreamRegistry: Send + Sync {
    /// Enabled upstreams, deduplicated by name and by prefix.
    async fn upstreams(&self) -> Vec<GatewayUpstream>;

    /// Change-notification channel: the value increments whenever the
    /// upstream set may have changed. `None` for static registries.
    fn watch(&self) -> Option<watch::Receiver<u64>> {
        None
    }
}

/// Filter to enabled, unique-by-name, unique-by-prefix entries.
/// First occurrence wins; later duplicates are dropped with a warning.
pub(crate) fn sanitize_upstreams(input: &[GatewayUpstream]) -> Vec<GatewayUpstream> {
    let mut seen_names: HashSet<String> = HashSet::new();
    let mut seen_prefixes: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(input.len());

    for upstream in input {
        if !upstream.enabled {
            continue;
        }
        if upstream.name.is_empty() || upstream.prefix.is_empty() {
            tracing::warn!(
                upstream = %upstream.name,
                "dropping upstream with empty name or prefix"
            );
            continue;
        }
        if !seen_names.insert(upstream.name.clone()) {
            tracing::warn!(
                upstream = %upstream.name,
                "dropping upstream with duplicate name"
            );
            continue;
        }
        if !seen_prefixes.insert(upstream.prefix.clone()) {
            tracing::warn!(
                upstream = %upstream.name,
                prefix = %upstream.prefix,
                "dropping upstream with duplicate namespace prefix"
            );
            continue;
        }
        out.push(upstream.clone());
    }
    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Static registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fixed upstream list from configuration.
pub struct StaticUpstreamRegistry {
    upstreams: Arc<Vec<GatewayUpstream>>,
}

impl StaticUpstreamRegistry {
    pub fn new(configured: &[GatewayUpstream]) -> Self {
        Self {
            upstreams: Arc::new(sanitize_upstreams(configured)),
        }
    }
}

#[async_trait]
impl UpstreamRegistry for StaticUpstreamRegistry {
    async fn upstreams(&self) -> Vec<GatewayUpstream> {
        self.upstreams.as_ref().clone()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dynamic registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Supplies the upstream list from an external discovery system.
/// Concrete clients (Consul, DNS, ...) live outside this crate.
#[async_trait]
pub trait DiscoveryProvider: Send + Sync {
    async fn discover(&self) -> Result<Vec<GatewayUpstream>, UpstreamError>;
}

/// Discovery-backed registry holding two immutable arrays (`all`,
/// `enabled`) swapped atomically on refresh. Reads are wait-free;
/// refreshes are single-flight.
pub struct DynamicUpstreamRegistry {
    provider: Arc<dyn DiscoveryProvider>,
    all: RwLock<Arc<Vec<GatewayUpstream>>>,
    enabled: RwLock<Arc<Vec<GatewayUpstream>>>,
    refresh_mutex: tokio::sync::Mutex<()>,
    generation: watch::Sender<u64>,
}

impl DynamicUpstreamRegistry {
    pub fn new(provider: Arc<dyn DiscoveryProvider>) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            provider,
            all: RwLock::new(Arc::new(Vec::new())),
            enabled: RwLock::new(Arc::new(Vec::new())),
            refresh_mutex: tokio::sync::Mutex::new(()),
            generation,
        }
    }

    /// Every discovered entry, including disabled ones (diagnostics).
    pub fn all(&self) -> Arc<Vec<GatewayUpstream>> {
        self.all.read().clone()
    }

    /// Re-run discovery and swap in the validated result. Overlapping
    /// calls coalesce: the loser returns without touching anything.
    pub async fn refresh(&self) -> Result<(), UpstreamError> {
        let Ok(_guard) = self.refresh_mutex.try_lock() else {
            return Ok(());
        };

        let discovered = self.provider.discover().await?;
        let enabled = sanitize_upstreams(&discovered);

        *self.all.write() = Arc::new(discovered);
        *self.enabled.write() = Arc::new(enabled);

        self.generation.send_modify(|g| *g += 1);
        tracing::debug!(
            upstreams = self.enabled.read().len(),
            "dynamic upstream registry refreshed"
        );
        Ok(())
    }
}

#[async_trait]
impl UpstreamRegistry for DynamicUpstreamRegistry {
    async fn upstreams(&self) -> Vec<GatewayUpstream> {
        self.enabled.read().as_ref().clone()
    }

    fn watch(&self) -> Option<watch::Receiver<u64>> {
        Some(self.generation.subscribe())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
