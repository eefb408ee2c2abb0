use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Output redaction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Post-processing applied to tool responses before they leave the
/// process. Field names are matched case-insensitively; patterns are
/// applied to every string leaf inside the result content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedactionConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Object properties stripped wherever they appear in the content.
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<RedactionPattern>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionPattern {
    /// Regex applied to string leaves.
    pub pattern: String,
    /// Replacement text.
    #[serde(default = "d_replacement")]
    pub replace: String,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_replacement() -> String {
    "[REDACTED]".into()
}
