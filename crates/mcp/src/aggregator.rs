//! Gateway aggregator — probes upstreams and publishes a namespaced
//! catalog snapshot.
//!
//! A rebuild fans out `initialize` + `tools/list` probes with bounded
//! concurrency and a per-upstream deadline, so no single upstream can
//! stall the build. Partial availability is a valid outcome: an
//! unhealthy upstream contributes a status entry and zero routes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use tg_domain::config::{GatewayConfig, GatewayUpstream};

use crate::client::{UpstreamClient, UpstreamError};
use crate::protocol::McpToolDef;
use crate::registry::UpstreamRegistry;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Snapshot types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One externally-visible tool owned by an upstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayToolRoute {
    /// `prefix + separator + upstream_tool_name`.
    pub external_name: String,
    pub upstream_name: String,
    pub upstream_tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Health of one upstream at the last rebuild. `latency_ms` and
/// `tool_count` are set iff healthy; `last_error` iff unhealthy.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamStatus {
    pub upstream_name: String,
    pub healthy: bool,
    pub last_check_utc: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl UpstreamStatus {
    pub fn healthy(upstream_name: impl Into<String>, latency_ms: u64, tool_count: usize) -> Self {
        Self {
            upstream_name: upstream_name.into(),
            healthy: true,
            last_check_utc: Utc::now(),
            latency_ms: Some(latency_ms),
            tool_count: Some(tool_count),
            last_error: None,
            warnings: Vec::new(),
        }
    }

    pub fn unhealthy(upstream_name: impl Into<String>, last_error: impl Into<String>) -> Self {
        Self {
            upstream_name: upstream_name.into(),
            healthy: false,
            last_check_utc: Utc::now(),
            latency_ms: None,
            tool_count: None,
            last_error: Some(last_error.into()),
            warnings: Vec::new(),
        }
    }
}

/// The aggregated upstream catalog. Immutable after publication.
#[derive(Debug, Clone)]
pub struct GatewayCatalogSnapshot {
    created_utc: DateTime<Utc>,
    tools: BTreeMap<String, Arc<GatewayToolRoute>>,
    upstream_statuses: Vec<UpstreamStatus>,
}

impl GatewayCatalogSnapshot {
    /// Build and validate: every route's upstream must have a healthy
    /// status entry in the same snapshot.
    pub fn new(
        tools: BTreeMap<String, Arc<GatewayToolRoute>>,
        upstream_statuses: Vec<UpstreamStatus>,
    ) -> Result<Self, String> {
        for route in tools.values() {
            let healthy = upstream_statuses
                .iter()
                .any(|s| s.upstream_name == route.upstream_name && s.healthy);
            if !healthy {
                return Err(format!(
                    "route \"{}\" references upstream \"{}\" with no healthy status",
                    route.external_name, route.upstream_name
                ));
            }
        }
        Ok(Self {
            created_utc: Utc::now(),
            tools,
            upstream_statuses,
        })
    }

    pub fn empty() -> Self {
        Self {
            created_utc: Utc::now(),
            tools: BTreeMap::new(),
            upstream_statuses: Vec::new(),
        }
    }

    pub fn created_utc(&self) -> DateTime<Utc> {
        self.created_utc
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn get(&self, external_name: &str) -> Option<Arc<GatewayToolRoute>> {
        self.tools.get(external_name).cloned()
    }

    /// Routes in deterministic (external name) order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<GatewayToolRoute>> {
        self.tools.values()
    }

    pub fn upstream_statuses(&self) -> &[UpstreamStatus] {
        &self.upstream_statuses
    }

    pub fn status_of(&self, upstream_name: &str) -> Option<&UpstreamStatus> {
        self.upstream_statuses
            .iter()
            .find(|s| s.upstream_name == upstream_name)
    }

    fn ensure_created_after(&mut self, previous: DateTime<Utc>) {
        if self.created_utc <= previous {
            self.created_utc = previous + chrono::Duration::microseconds(1);
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Aggregator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct GatewayAggregator {
    registry: Arc<dyn UpstreamRegistry>,
    client: Arc<UpstreamClient>,
    separator: String,
    per_upstream_timeout: Duration,
    probe_concurrency: usize,
    min_rebuild_interval: Duration,
    current: RwLock<Arc<GatewayCatalogSnapshot>>,
    last_build: Mutex<Option<Instant>>,
    rebuild_mutex: tokio::sync::Mutex<()>,
}

impl GatewayAggregator {
    pub fn new(
        registry: Arc<dyn UpstreamRegistry>,
        client: Arc<UpstreamClient>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            registry,
            client,
            separator: config.namespace_separator.clone(),
            per_upstream_timeout: Duration::from_millis(config.per_upstream_timeout_ms),
            probe_concurrency: config.probe_concurrency.max(1),
            min_rebuild_interval: Duration::from_millis(config.min_rebuild_interval_ms),
            current: RwLock::new(Arc::new(GatewayCatalogSnapshot::empty())),
            last_build: Mutex::new(None),
            rebuild_mutex: tokio::sync::Mutex::new(()),
        }
    }

    /// The current snapshot. Wait-free for readers.
    pub fn get(&self) -> Arc<GatewayCatalogSnapshot> {
        self.current.read().clone()
    }

    /// Return the current snapshot, rebuilding first when the
    /// debounce interval has elapsed.
    pub async fn ensure_fresh(
        &self,
        cancel: &CancellationToken,
    ) -> Arc<GatewayCatalogSnapshot> {
        let within_debounce = {
            let last = self.last_build.lock();
            last.is_some_and(|t| t.elapsed() < self.min_rebuild_interval)
        };
        if within_debounce {
            return self.get();
        }
        self.rebuild_inner(cancel, true).await
    }

    /// Rebuild the snapshot unconditionally.
    pub async fn rebuild(&self, cancel: &CancellationToken) -> Arc<GatewayCatalogSnapshot> {
        self.rebuild_inner(cancel, false).await
    }

    async fn rebuild_inner(
        &self,
        cancel: &CancellationToken,
        skip_if_busy: bool,
    ) -> Arc<GatewayCatalogSnapshot> {
        let _guard = if skip_if_busy {
            match self.rebuild_mutex.try_lock() {
                Ok(g) => g,
                Err(_) => return self.get(),
            }
        } else {
            self.rebuild_mutex.lock().await
        };

        let upstreams = self.registry.upstreams().await;
        let probes = self.probe_all(upstreams, cancel).await;

        let mut snapshot = self.assemble(probes);
        let previous_created = self.current.read().created_utc();
        snapshot.ensure_created_after(previous_created);
        let snapshot = Arc::new(snapshot);

        *self.current.write() = snapshot.clone();
        *self.last_build.lock() = Some(Instant::now());

        tracing::info!(
            routes = snapshot.tool_count(),
            upstreams = snapshot.upstream_statuses().len(),
            healthy = snapshot.upstream_statuses().iter().filter(|s| s.healthy).count(),
            "gateway catalog rebuilt"
        );
        snapshot
    }

    /// Probe every upstream concurrently, each under its own deadline.
    async fn probe_all(
        &self,
        upstreams: Vec<GatewayUpstream>,
        cancel: &CancellationToken,
    ) -> Vec<ProbeResult> {
        let mut results: Vec<ProbeResult> = stream::iter(upstreams.into_iter().map(|upstream| {
            let client = self.client.clone();
            let cancel = cancel.clone();
            let default_timeout = self.per_upstream_timeout;
            async move {
                let timeout = upstream
                    .timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(default_timeout);
                let started = Instant::now();
                let probe = async {
                    client.initialize(&upstream, &cancel).await?;
                    client.list_tools(&upstream, &cancel).await
                };
                let outcome = match tokio::time::timeout(timeout, probe).await {
                    Ok(Ok(tools)) => {
                        Ok((tools, started.elapsed().as_millis() as u64))
                    }
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(UpstreamError::Timeout {
                        elapsed_ms: timeout.as_millis() as u64,
                    }),
                };
                ProbeResult { upstream, outcome }
            }
        }))
        .buffer_unordered(self.probe_concurrency)
        .collect()
        .await;

        // Deterministic assembly order regardless of completion order.
        results.sort_by(|a, b| a.upstream.name.cmp(&b.upstream.name));
        results
    }

    /// Translate probe results into routes + statuses and validate.
    fn assemble(&self, probes: Vec<ProbeResult>) -> GatewayCatalogSnapshot {
        let mut tools: BTreeMap<String, Arc<GatewayToolRoute>> = BTreeMap::new();
        let mut statuses: Vec<UpstreamStatus> = Vec::with_capacity(probes.len());

        for probe in probes {
            let upstream = probe.upstream;
            match probe.outcome {
                Ok((defs, latency_ms)) => {
                    let mut status =
                        UpstreamStatus::healthy(&upstream.name, latency_ms, defs.len());
                    for def in defs {
                        self.insert_route(&mut tools, &upstream, def, &mut status);
                    }
                    statuses.push(status);
                }
                Err(e) => {
                    tracing::warn!(
                        upstream = %upstream.name,
                        error = %e,
                        "upstream probe failed, continuing without it"
                    );
                    statuses.push(UpstreamStatus::unhealthy(&upstream.name, e.to_string()));
                }
            }
        }

        match GatewayCatalogSnapshot::new(tools, statuses) {
            Ok(snapshot) => snapshot,
            // Unreachable by construction; fail closed with an empty
            // snapshot rather than publish an inconsistent one.
            Err(e) => {
                tracing::error!(error = %e, "gateway snapshot failed validation");
                GatewayCatalogSnapshot::empty()
            }
        }
    }

    fn insert_route(
        &self,
        tools: &mut BTreeMap<String, Arc<GatewayToolRoute>>,
        upstream: &GatewayUpstream,
        def: McpToolDef,
        status: &mut UpstreamStatus,
    ) {
        let external_name = format!("{}{}{}", upstream.prefix, self.separator, def.name);
        if let Some(existing) = tools.get(&external_name) {
            // Deterministic winner: lexicographically smaller upstream name.
            if existing.upstream_name <= upstream.name {
                tracing::warn!(
                    external_name = %external_name,
                    winner = %existing.upstream_name,
                    loser = %upstream.name,
                    "external tool name collision, dropping loser"
                );
                status.warnings.push(format!(
                    "tool \"{external_name}\" collides with upstream \"{}\" and was dropped",
                    existing.upstream_name
                ));
                return;
            }
        }
        tools.insert(
            external_name.clone(),
            Arc::new(GatewayToolRoute {
                external_name,
                upstream_name: upstream.name.clone(),
                upstream_tool_name: def.name,
                input_schema: Some(def.input_schema),
                description: if def.description.is_empty() {
                    None
                } else {
                    Some(def.description)
                },
            }),
        );
    }
}

struct ProbeResult {
    upstream: GatewayUpstream,
    outcome: Result<(Vec<McpToolDef>, u64), UpstreamError>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
