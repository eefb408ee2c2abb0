//! Cache action — TTL result cache with singleflight builds.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::{ActionError, InvocationContext, Next, ToolAction, ToolOutput};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fingerprint
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Canonical JSON: object keys sorted recursively, no whitespace,
/// numbers in serde_json's shortest round-trip form.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        leaf => out.push_str(&leaf.to_string()),
    }
}

/// Cache key for one (tool, arguments) pair.
pub fn fingerprint(tool_name: &str, arguments: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tool_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(canonical_json(arguments).as_bytes());
    hex::encode(hasher.finalize())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Action
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
struct CachedEntry {
    output: Arc<ToolOutput>,
    ttl: Duration,
}

struct PerEntryTtl;

impl moka::Expiry<String, CachedEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Outcome of a cache-miss build that must not be stored.
#[derive(Debug)]
enum Bypass {
    /// The pipeline failed; propagate the error.
    Fail(ActionError),
    /// The tool returned an error output; return but never cache it.
    ErrorOutput(ToolOutput),
}

/// Order 300: result cache keyed by the argument fingerprint.
///
/// `try_get_with` gives at-most-one concurrent build per fingerprint;
/// concurrent callers for the same key await the winner's result.
/// Error outputs and pipeline failures are never cached.
pub struct CacheAction {
    cache: moka::future::Cache<String, CachedEntry>,
}

impl CacheAction {
    pub fn new() -> Self {
        Self {
            cache: moka::future::Cache::builder()
                .max_capacity(10_000)
                .expire_after(PerEntryTtl)
                .build(),
        }
    }

    fn ttl_for(ctx: &InvocationContext) -> Option<Duration> {
        ctx.tool
            .policy
            .as_ref()
            .and_then(|p| p.cache.as_ref())
            .filter(|c| c.ttl_ms > 0)
            .map(|c| Duration::from_millis(c.ttl_ms))
    }
}

impl Default for CacheAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolAction for CacheAction {
    fn order(&self) -> i32 {
        300
    }

    fn name(&self) -> &'static str {
        "cache"
    }

    fn applies_to(&self, ctx: &InvocationContext) -> bool {
        Self::ttl_for(ctx).is_some()
    }

    async fn invoke<'a>(
        &self,
        ctx: &'a InvocationContext,
        next: Next<'a>,
    ) -> Result<ToolOutput, ActionError> {
        let Some(ttl) = Self::ttl_for(ctx) else {
            return next.run(ctx).await;
        };

        let key = fingerprint(&ctx.tool_name, &ctx.arguments);
        let result = self
            .cache
            .try_get_with(key, async {
                match next.run(ctx).await {
                    Ok(output) if output.is_error => Err(Bypass::ErrorOutput(output)),
                    Ok(output) => Ok(CachedEntry {
                        output: Arc::new(output),
                        ttl,
                    }),
                    Err(e) => Err(Bypass::Fail(e)),
                }
            })
            .await;

        match result {
            Ok(entry) => Ok((*entry.output).clone()),
            Err(bypass) => match &*bypass {
                Bypass::ErrorOutput(output) => Ok(output.clone()),
                Bypass::Fail(e) => Err(e.clone()),
            },
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
