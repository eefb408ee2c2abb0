//! Immutable catalog snapshot types.
//!
//! A snapshot is built once, validated, and then published through an
//! atomic handle swap. It is never mutated after publication; readers
//! hold an `Arc` and observe a consistent whole-catalog view.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use tg_domain::policy::EffectivePolicy;

use crate::descriptor::EndpointDescriptor;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolDescriptor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One exposed tool, owned by a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<EndpointDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<EffectivePolicy>,
    /// Kept for diagnostics only; never sent to clients.
    #[serde(skip)]
    pub response_schema: Option<Value>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ToolCatalogSnapshot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The set of tools currently exposed by the host.
#[derive(Debug, Clone)]
pub struct ToolCatalogSnapshot {
    created_utc: DateTime<Utc>,
    policy_source_version: String,
    tools: BTreeMap<String, Arc<ToolDescriptor>>,
}

impl ToolCatalogSnapshot {
    pub fn new(
        policy_source_version: String,
        tools: BTreeMap<String, Arc<ToolDescriptor>>,
    ) -> Self {
        Self {
            created_utc: Utc::now(),
            policy_source_version,
            tools,
        }
    }

    /// A valid snapshot with no tools, used before the first reload.
    pub fn empty() -> Self {
        Self::new(String::new(), BTreeMap::new())
    }

    pub fn created_utc(&self) -> DateTime<Utc> {
        self.created_utc
    }

    pub fn policy_source_version(&self) -> &str {
        &self.policy_source_version
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn get(&self, tool_name: &str) -> Option<Arc<ToolDescriptor>> {
        self.tools.get(tool_name).cloned()
    }

    pub fn contains(&self, tool_name: &str) -> bool {
        self.tools.contains_key(tool_name)
    }

    /// Tools in deterministic (name) order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ToolDescriptor>> {
        self.tools.values()
    }

    /// Push `created_utc` past `previous` so publication timestamps
    /// are strictly monotonic even on coarse clocks.
    pub fn ensure_created_after(&mut self, previous: DateTime<Utc>) {
        if self.created_utc <= previous {
            self.created_utc = previous + chrono::Duration::microseconds(1);
        }
    }

    /// Value copy with independent descriptor instances.
    pub fn deep_copy(&self) -> Self {
        Self {
            created_utc: self.created_utc,
            policy_source_version: self.policy_source_version.clone(),
            tools: self
                .tools
                .iter()
                .map(|(k, v)| (k.clone(), Arc::new((**v).clone())))
                .collect(),
        }
    }

    /// Equality by value, ignoring `Arc` identity.
    pub fn value_eq(&self, other: &Self) -> bool {
        self.created_utc == other.created_utc
            && self.policy_source_version == other.policy_source_version
            && self.tools.len() == other.tools.len()
            && self
                .tools
                .iter()
                .zip(other.tools.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && **va == **vb)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
