//! Catalog provider — holds the current snapshot, debounces reloads,
//! and swaps snapshots atomically.
//!
//! Readers call [`CatalogProvider::get`] and never block. Reloads are
//! serialized through a single-writer mutex; the build itself runs
//! outside the published-handle lock, which is held only for the
//! pointer exchange.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use tg_domain::policy::PolicyConfig;
use tg_domain::validation::has_errors;
use tg_schema::{SchemaBuilder, TypeShape};

use crate::builder::{build_catalog, CatalogBuildReport};
use crate::descriptor::EndpointSource;
use crate::openapi::OpenApiDocument;
use crate::rules::RuleError;
use crate::snapshot::ToolCatalogSnapshot;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("policy source: {0}")]
    Source(String),

    #[error("policy document invalid: {0}")]
    InvalidPolicy(String),

    #[error("catalog build failed: {0}")]
    Build(#[from] RuleError),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy sources
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Loads the policy document and reports its version cheaply.
#[async_trait]
pub trait PolicySource: Send + Sync {
    async fn load(&self) -> Result<PolicyConfig, CatalogError>;

    /// Opaque version of the backing document; `ensure_fresh` skips
    /// the full load when this has not changed.
    async fn version(&self) -> Result<String, CatalogError>;
}

/// Reads the policy from a JSON or TOML file. The version is the
/// sha256 of the raw bytes, so touching the file without changing it
/// does not trigger a rebuild.
pub struct FilePolicySource {
    path: PathBuf,
}

impl FilePolicySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_bytes(&self) -> Result<Vec<u8>, CatalogError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| CatalogError::Source(format!("reading {}: {e}", self.path.display())))
    }

    fn parse(path: &Path, raw: &[u8]) -> Result<PolicyConfig, CatalogError> {
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        if is_toml {
            let text = std::str::from_utf8(raw)
                .map_err(|e| CatalogError::Source(format!("{}: {e}", path.display())))?;
            toml_parse(text).map_err(|e| CatalogError::Source(format!("{}: {e}", path.display())))
        } else {
            serde_json::from_slice(raw)
                .map_err(|e| CatalogError::Source(format!("{}: {e}", path.display())))
        }
    }
}

// TOML parsing goes through a JSON value so both formats share the
// same serde derives and defaults.
fn toml_parse(text: &str) -> Result<PolicyConfig, String> {
    let value: serde_json::Value = {
        let toml_value: toml::Value = text.parse().map_err(|e| format!("{e}"))?;
        serde_json::to_value(toml_value).map_err(|e| format!("{e}"))?
    };
    serde_json::from_value(value).map_err(|e| format!("{e}"))
}

#[async_trait]
impl PolicySource for FilePolicySource {
    async fn load(&self) -> Result<PolicyConfig, CatalogError> {
        let raw = self.read_bytes().await?;
        let mut policy = Self::parse(&self.path, &raw)?;
        if policy.source_version.is_empty() {
            policy.source_version = hex::encode(Sha256::digest(&raw));
        }
        Ok(policy)
    }

    async fn version(&self) -> Result<String, CatalogError> {
        let raw = self.read_bytes().await?;
        Ok(hex::encode(Sha256::digest(&raw)))
    }
}

/// Fixed in-memory policy, for tests and for running without a
/// configured policy file.
pub struct StaticPolicySource {
    policy: RwLock<PolicyConfig>,
}

impl StaticPolicySource {
    pub fn new(policy: PolicyConfig) -> Self {
        Self {
            policy: RwLock::new(policy),
        }
    }

    pub fn set(&self, policy: PolicyConfig) {
        *self.policy.write() = policy;
    }
}

#[async_trait]
impl PolicySource for StaticPolicySource {
    async fn load(&self) -> Result<PolicyConfig, CatalogError> {
        Ok(self.policy.read().clone())
    }

    async fn version(&self) -> Result<String, CatalogError> {
        Ok(self.policy.read().source_version.clone())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct CatalogProvider {
    current: RwLock<Arc<ToolCatalogSnapshot>>,
    report: RwLock<Arc<CatalogBuildReport>>,
    /// Serializes reloads; `ensure_fresh` skips when one is running.
    reload_mutex: tokio::sync::Mutex<()>,
    last_check: Mutex<Option<Instant>>,
    last_version: Mutex<Option<String>>,
    min_reload_interval: Duration,
    policy_source: Arc<dyn PolicySource>,
    endpoint_source: Arc<dyn EndpointSource>,
    input_shapes: HashMap<String, TypeShape>,
    schemas: Arc<SchemaBuilder>,
    openapi: Option<Arc<OpenApiDocument>>,
}

impl CatalogProvider {
    pub fn new(
        policy_source: Arc<dyn PolicySource>,
        endpoint_source: Arc<dyn EndpointSource>,
        input_shapes: HashMap<String, TypeShape>,
        schemas: Arc<SchemaBuilder>,
        openapi: Option<Arc<OpenApiDocument>>,
        min_reload_interval: Duration,
    ) -> Self {
        Self {
            current: RwLock::new(Arc::new(ToolCatalogSnapshot::empty())),
            report: RwLock::new(Arc::new(CatalogBuildReport::default())),
            reload_mutex: tokio::sync::Mutex::new(()),
            last_check: Mutex::new(None),
            last_version: Mutex::new(None),
            min_reload_interval,
            policy_source,
            endpoint_source,
            input_shapes,
            schemas,
            openapi,
        }
    }

    /// The current snapshot. Wait-free for readers.
    pub fn get(&self) -> Arc<ToolCatalogSnapshot> {
        self.current.read().clone()
    }

    /// Findings from the last successful build.
    pub fn last_report(&self) -> Arc<CatalogBuildReport> {
        self.report.read().clone()
    }

    /// Whether an OpenAPI document is wired in (manifest diagnostics).
    pub fn openapi_available(&self) -> bool {
        self.openapi.is_some()
    }

    /// Return the current snapshot, reloading first when the debounce
    /// interval has elapsed and the policy document changed.
    pub async fn ensure_fresh(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<ToolCatalogSnapshot>, CatalogError> {
        let within_debounce = {
            let last = self.last_check.lock();
            last.is_some_and(|t| t.elapsed() < self.min_reload_interval)
        };
        if within_debounce {
            return Ok(self.get());
        }

        let version = self.policy_source.version().await?;
        {
            let mut last_check = self.last_check.lock();
            *last_check = Some(Instant::now());
        }

        let unchanged = {
            let last = self.last_version.lock();
            last.as_deref() == Some(version.as_str())
        };
        if unchanged {
            return Ok(self.get());
        }

        self.reload_inner(cancel, true).await
    }

    /// Rebuild the catalog unconditionally. Serialized with other
    /// writers; on failure the published snapshot is untouched.
    pub async fn reload(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<ToolCatalogSnapshot>, CatalogError> {
        self.reload_inner(cancel, false).await
    }

    async fn reload_inner(
        &self,
        cancel: &CancellationToken,
        skip_if_busy: bool,
    ) -> Result<Arc<ToolCatalogSnapshot>, CatalogError> {
        let _guard = if skip_if_busy {
            match self.reload_mutex.try_lock() {
                Ok(g) => g,
                // Another reload is in flight; readers keep the
                // current snapshot.
                Err(_) => return Ok(self.get()),
            }
        } else {
            self.reload_mutex.lock().await
        };

        let policy = self.policy_source.load().await?;

        let issues = policy.validate();
        if has_errors(&issues) {
            let summary: Vec<String> = issues.iter().map(|i| i.to_string()).collect();
            return Err(CatalogError::InvalidPolicy(summary.join("; ")));
        }
        for issue in &issues {
            tracing::warn!(issue = %issue, "policy validation warning");
        }

        let endpoints = self.endpoint_source.endpoints();
        let (mut snapshot, build_report) = build_catalog(
            &policy,
            endpoints,
            self.openapi.as_deref(),
            &self.input_shapes,
            &self.schemas,
            cancel,
        )?;
        for warning in &build_report.warnings {
            tracing::warn!(warning = %warning, "catalog build warning");
        }

        let previous_created = self.current.read().created_utc();
        snapshot.ensure_created_after(previous_created);
        let snapshot = Arc::new(snapshot);

        *self.current.write() = snapshot.clone();
        *self.report.write() = Arc::new(build_report);
        *self.last_version.lock() = Some(policy.source_version.clone());

        tracing::info!(
            tools = snapshot.tool_count(),
            source_version = %snapshot.policy_source_version(),
            "tool catalog rebuilt"
        );
        Ok(snapshot)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use tg_domain::policy::EndpointPolicy;

    use crate::descriptor::{EndpointDescriptor, StaticEndpointSource};

    fn descriptor(op: &str) -> EndpointDescriptor {
        EndpointDescriptor {
            route_template: format!("/{op}"),
            http_method: "GET".into(),
            operation_id: op.into(),
            display_name: op.into(),
            produces: Vec::new(),
            consumes: Vec::new(),
            requires_auth: false,
            acceptable_auth_schemes: Vec::new(),
        }
    }

    fn policy_with(ops: &[&str], version: &str) -> PolicyConfig {
        PolicyConfig {
            whitelist: ops
                .iter()
                .map(|op| EndpointPolicy {
                    operation_id: Some(op.to_string()),
                    ..EndpointPolicy::default()
                })
                .collect(),
            source_version: version.into(),
            ..PolicyConfig::default()
        }
    }

    fn provider_with(
        source: Arc<dyn PolicySource>,
        ops: &[&str],
        debounce: Duration,
    ) -> CatalogProvider {
        let endpoints = ops.iter().map(|op| descriptor(op)).collect();
        CatalogProvider::new(
            source,
            Arc::new(StaticEndpointSource::new(endpoints)),
            HashMap::new(),
            Arc::new(SchemaBuilder::new()),
            None,
            debounce,
        )
    }

    #[test]
    fn initial_snapshot_is_empty_and_valid() {
        let source = Arc::new(StaticPolicySource::new(policy_with(&["op1"], "v1")));
        let provider = provider_with(source, &["op1"], Duration::ZERO);
        let snap = provider.get();
        assert_eq!(snap.tool_count(), 0);
    }

    #[tokio::test]
    async fn reload_publishes_new_snapshot() {
        let source = Arc::new(StaticPolicySource::new(policy_with(&["op1"], "v1")));
        let provider = provider_with(source, &["op1"], Duration::ZERO);

        let snap = provider.reload(&CancellationToken::new()).await.unwrap();
        assert_eq!(snap.tool_count(), 1);
        assert!(provider.get().contains("op1"));
    }

    #[tokio::test]
    async fn reload_failure_keeps_current_snapshot() {
        let source = Arc::new(StaticPolicySource::new(policy_with(&["op1"], "v1")));
        let provider = provider_with(source.clone(), &["op1"], Duration::ZERO);
        provider.reload(&CancellationToken::new()).await.unwrap();

        // deny_by_default + empty whitelist is a validation error.
        source.set(PolicyConfig {
            source_version: "v2".into(),
            ..PolicyConfig::default()
        });
        let err = provider.reload(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CatalogError::InvalidPolicy(_)));
        assert_eq!(provider.get().tool_count(), 1);
        assert_eq!(provider.get().policy_source_version(), "v1");
    }

    #[tokio::test]
    async fn created_utc_is_strictly_monotonic() {
        let source = Arc::new(StaticPolicySource::new(policy_with(&["op1"], "v1")));
        let provider = provider_with(source.clone(), &["op1"], Duration::ZERO);

        let mut previous = provider.get().created_utc();
        for i in 0..5 {
            source.set(policy_with(&["op1"], &format!("v{i}")));
            let snap = provider.reload(&CancellationToken::new()).await.unwrap();
            assert!(snap.created_utc() > previous);
            previous = snap.created_utc();
        }
    }

    #[tokio::test]
    async fn ensure_fresh_debounces_source_checks() {
        let source = Arc::new(StaticPolicySource::new(policy_with(&["op1"], "v1")));
        let provider = provider_with(source.clone(), &["op1"], Duration::from_secs(3600));
        let cancel = CancellationToken::new();

        let first = provider.ensure_fresh(&cancel).await.unwrap();
        assert_eq!(first.tool_count(), 1);

        // Change the policy: within the debounce window the provider
        // must not even look at the source.
        source.set(policy_with(&["op1", "op2"], "v2"));
        let second = provider.ensure_fresh(&cancel).await.unwrap();
        assert_eq!(second.tool_count(), 1);
    }

    #[tokio::test]
    async fn ensure_fresh_skips_rebuild_when_version_unchanged() {
        let source = Arc::new(StaticPolicySource::new(policy_with(&["op1"], "v1")));
        let provider = provider_with(source, &["op1"], Duration::ZERO);
        let cancel = CancellationToken::new();

        let first = provider.ensure_fresh(&cancel).await.unwrap();
        let second = provider.ensure_fresh(&cancel).await.unwrap();
        // Same snapshot instance: no rebuild happened.
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn ensure_fresh_rebuilds_on_version_change() {
        let source = Arc::new(StaticPolicySource::new(policy_with(&["op1"], "v1")));
        let provider = provider_with(source.clone(), &["op1", "op2"], Duration::ZERO);
        let cancel = CancellationToken::new();

        provider.ensure_fresh(&cancel).await.unwrap();
        source.set(policy_with(&["op1", "op2"], "v2"));
        let snap = provider.ensure_fresh(&cancel).await.unwrap();
        assert_eq!(snap.tool_count(), 2);
        assert_eq!(snap.policy_source_version(), "v2");
    }

    #[tokio::test]
    async fn concurrent_readers_see_whole_snapshots() {
        let source = Arc::new(StaticPolicySource::new(policy_with(&["op1", "op2"], "v1")));
        let provider = Arc::new(provider_with(source.clone(), &["op1", "op2"], Duration::ZERO));
        provider.reload(&CancellationToken::new()).await.unwrap();

        let reader = {
            let provider = provider.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let snap = provider.get();
                    // A snapshot is either pre-reload (2 tools) or
                    // post-reload (1 tool), never in between.
                    assert!(snap.tool_count() == 2 || snap.tool_count() == 1);
                    tokio::task::yield_now().await;
                }
            })
        };

        source.set(policy_with(&["op1"], "v2"));
        provider.reload(&CancellationToken::new()).await.unwrap();
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn file_source_reads_json_policy() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{ "whitelist": [{{ "operation_id": "op1" }}] }}"#
        )
        .unwrap();

        let source = FilePolicySource::new(file.path());
        let policy = source.load().await.unwrap();
        assert_eq!(policy.whitelist.len(), 1);
        assert!(policy.deny_by_default);
        // Version derives from content.
        assert!(!policy.source_version.is_empty());
        assert_eq!(policy.source_version, source.version().await.unwrap());
    }

    #[tokio::test]
    async fn file_source_reads_toml_policy() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            "deny_by_default = true\n\n[[whitelist]]\noperation_id = \"op1\"\ntool_name = \"weather.get_forecast\"\n"
        )
        .unwrap();

        let source = FilePolicySource::new(file.path());
        let policy = source.load().await.unwrap();
        assert_eq!(policy.whitelist[0].tool_name.as_deref(), Some("weather.get_forecast"));
    }

    #[tokio::test]
    async fn file_source_missing_file_is_source_error() {
        let source = FilePolicySource::new("/nonexistent/policy.json");
        assert!(matches!(
            source.load().await.unwrap_err(),
            CatalogError::Source(_)
        ));
    }
}
