//! Output redaction — strips sensitive fields and patterns from tool
//! responses before they leave the process.

use std::collections::HashSet;

use regex::Regex;
use serde_json::Value;

use tg_domain::config::RedactionConfig;

use crate::protocol::JsonRpcResponse;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Redactor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Applies field stripping and pattern substitution to the `content`
/// of JSON-RPC results. Envelope fields (`jsonrpc`, `id`, `error`,
/// non-`content` result fields) are never touched.
pub struct Redactor {
    enabled: bool,
    /// Lowercased property names to strip wherever they appear.
    fields: HashSet<String>,
    patterns: Vec<(Regex, String)>,
}

impl Redactor {
    /// Compile the configuration. Patterns were validated at startup;
    /// one that still fails to compile is skipped with a warning
    /// rather than taking redaction down.
    pub fn from_config(config: &RedactionConfig) -> Self {
        let fields = config
            .fields
            .iter()
            .map(|f| f.to_lowercase())
            .collect();
        let patterns = config
            .patterns
            .iter()
            .filter_map(|p| match Regex::new(&p.pattern) {
                Ok(regex) => Some((regex, p.replace.clone())),
                Err(e) => {
                    tracing::warn!(pattern = %p.pattern, error = %e, "skipping invalid redaction pattern");
                    None
                }
            })
            .collect();
        Self {
            enabled: config.enabled,
            fields,
            patterns,
        }
    }

    /// Pass-through redactor.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            fields: HashSet::new(),
            patterns: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Redact a response. The original is returned unchanged when
    /// redaction is disabled or the response has no result content.
    pub fn apply(&self, mut response: JsonRpcResponse) -> JsonRpcResponse {
        if !self.enabled {
            return response;
        }
        if let Some(result) = response.result.as_mut() {
            if let Some(content) = result.get_mut("content") {
                self.redact_value(content);
            }
        }
        response
    }

    fn redact_value(&self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                map.retain(|key, _| !self.fields.contains(&key.to_lowercase()));
                for child in map.values_mut() {
                    self.redact_value(child);
                }
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    self.redact_value(item);
                }
            }
            Value::String(text) => {
                for (regex, replacement) in &self.patterns {
                    if regex.is_match(text) {
                        *text = regex.replace_all(text, replacement.as_str()).into_owned();
                    }
                }
            }
            _ => {}
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use tg_domain::config::RedactionPattern;

    use crate::protocol::RequestId;

    fn redactor(fields: &[&str], patterns: &[(&str, &str)]) -> Redactor {
        Redactor::from_config(&RedactionConfig {
            enabled: true,
            fields: fields.iter().map(|s| s.to_string()).collect(),
            patterns: patterns
                .iter()
                .map(|(p, r)| RedactionPattern {
                    pattern: p.to_string(),
                    replace: r.to_string(),
                })
                .collect(),
        })
    }

    fn response_with_content(content: Value) -> JsonRpcResponse {
        JsonRpcResponse::success(
            RequestId::Number(1),
            json!({ "content": content, "isError": false }),
        )
    }

    #[test]
    fn strips_fields_case_insensitively_and_recursively() {
        let redactor = redactor(&["api_key"], &[]);
        let response = response_with_content(json!([
            { "type": "text", "text": "ok", "API_KEY": "s3cret" },
            { "type": "text", "nested": { "api_key": "deep", "keep": 1 } }
        ]));
        let redacted = redactor.apply(response);
        let content = &redacted.result.unwrap()["content"];
        assert!(content[0].get("API_KEY").is_none());
        assert!(content[1]["nested"].get("api_key").is_none());
        assert_eq!(content[1]["nested"]["keep"], 1);
    }

    #[test]
    fn applies_patterns_to_string_leaves() {
        let redactor = redactor(&[], &[(r"\b\d{16}\b", "[CARD]")]);
        let response = response_with_content(json!([
            { "type": "text", "text": "card 4111111111111111 used" }
        ]));
        let redacted = redactor.apply(response);
        assert_eq!(
            redacted.result.unwrap()["content"][0]["text"],
            "card [CARD] used"
        );
    }

    #[test]
    fn preserves_envelope_fields() {
        let redactor = redactor(&["id"], &[("secret", "[X]")]);
        let response = JsonRpcResponse::success(
            RequestId::String("keep-me".into()),
            json!({
                "content": [{ "type": "text", "text": "secret stuff", "id": "drop-me" }],
                "isError": false,
                "meta": { "id": "untouched" }
            }),
        );
        let redacted = redactor.apply(response);
        // The response id and non-content result fields survive.
        assert_eq!(redacted.id, RequestId::String("keep-me".into()));
        let result = redacted.result.unwrap();
        assert_eq!(result["meta"]["id"], "untouched");
        assert_eq!(result["isError"], false);
        // Inside content, the field is stripped and the pattern applied.
        assert!(result["content"][0].get("id").is_none());
        assert_eq!(result["content"][0]["text"], "[X] stuff");
    }

    #[test]
    fn error_responses_pass_through() {
        let redactor = redactor(&["x"], &[("secret", "[X]")]);
        let response = JsonRpcResponse::failure(RequestId::Number(2), -32603, "secret failure");
        let redacted = redactor.apply(response.clone());
        assert_eq!(redacted, response);
    }

    #[test]
    fn disabled_redactor_is_identity() {
        let redactor = Redactor::disabled();
        let response = response_with_content(json!([{ "type": "text", "text": "anything" }]));
        let redacted = redactor.apply(response.clone());
        assert_eq!(redacted, response);
    }

    #[test]
    fn results_without_content_are_untouched() {
        let redactor = redactor(&["x"], &[]);
        let response = JsonRpcResponse::success(RequestId::Number(1), json!({ "tools": [] }));
        let redacted = redactor.apply(response.clone());
        assert_eq!(redacted, response);
    }

    #[test]
    fn invalid_pattern_is_skipped_not_fatal() {
        let redactor = Redactor::from_config(&RedactionConfig {
            enabled: true,
            fields: vec![],
            patterns: vec![RedactionPattern {
                pattern: "[unclosed".into(),
                replace: "[X]".into(),
            }],
        });
        let response = response_with_content(json!([{ "type": "text", "text": "fine" }]));
        let redacted = redactor.apply(response);
        assert_eq!(redacted.result.unwrap()["content"][0]["text"], "fine");
    }
}
