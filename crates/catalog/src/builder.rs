//! Catalog builder: policy + descriptors (+ enrichment) → snapshot.
//!
//! Builds are deterministic: endpoints are processed in canonical
//! order, tool names derive from stable inputs, and the snapshot map
//! iterates in name order. Given identical inputs the output is
//! identical, including the warning list.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use tg_domain::policy::{EndpointPolicy, PolicyConfig, PolicyKey};
use tg_schema::{SchemaBuilder, TypeShape};

use crate::descriptor::{sort_endpoints, EndpointDescriptor};
use crate::openapi::OpenApiDocument;
use crate::rules::{policy_match_engine, PolicyMatchContext, RuleError};
use crate::snapshot::{ToolCatalogSnapshot, ToolDescriptor};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Build report
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Non-fatal findings from a catalog build, kept for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct CatalogBuildReport {
    pub warnings: Vec<String>,
    /// Whitelist entries that matched no discovered endpoint.
    pub mapping_gaps: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Build
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build a catalog snapshot from a validated policy document.
///
/// `input_shapes` maps operation ids to declared input types; it is
/// consulted when the OpenAPI document has no schema for a tool.
pub fn build_catalog(
    policy: &PolicyConfig,
    mut endpoints: Vec<EndpointDescriptor>,
    openapi: Option<&OpenApiDocument>,
    input_shapes: &HashMap<String, TypeShape>,
    schemas: &SchemaBuilder,
    cancel: &CancellationToken,
) -> Result<(ToolCatalogSnapshot, CatalogBuildReport), RuleError> {
    sort_endpoints(&mut endpoints);

    let engine = policy_match_engine();
    let whitelist = Arc::new(policy.whitelist.clone());
    let blacklist = Arc::new(policy.blacklist.clone());

    let mut report = CatalogBuildReport::default();
    let mut tools: BTreeMap<String, Arc<ToolDescriptor>> = BTreeMap::new();
    let mut matched_whitelist: HashSet<usize> = HashSet::new();

    for descriptor in endpoints {
        // Blacklist hit drops the endpoint outright.
        let mut black_ctx = PolicyMatchContext::new(descriptor.clone(), blacklist.clone());
        engine.execute(&mut black_ctx, cancel)?;
        if black_ctx.matched_policy().is_some_and(|p| p.enabled) {
            continue;
        }

        let mut white_ctx = PolicyMatchContext::new(descriptor.clone(), whitelist.clone());
        engine.execute(&mut white_ctx, cancel)?;

        let matched = white_ctx.matched;
        if let Some(i) = matched {
            matched_whitelist.insert(i);
        }

        let entry = matched.map(|i| &policy.whitelist[i]);
        let exposed = match entry {
            // An explicitly disabled whitelist entry suppresses the tool
            // even when deny-by-default is off.
            Some(e) => e.enabled,
            None => !policy.deny_by_default,
        };
        if !exposed {
            continue;
        }

        let tool_name = synthesize_tool_name(entry, &descriptor);

        let operation = openapi.and_then(|doc| doc.operation(&descriptor.operation_id));
        let description = operation.and_then(|op| op.tool_description());
        let input_schema = match operation {
            Some(op) => op.merged_input_schema(),
            None => input_shapes
                .get(&descriptor.operation_id)
                .map(|shape| (*schemas.build(shape)).clone())
                .unwrap_or_else(SchemaBuilder::empty_object),
        };
        let response_schema = operation.and_then(|op| op.response.clone());

        let tool = ToolDescriptor {
            tool_name: tool_name.clone(),
            description,
            input_schema: Some(input_schema),
            policy: entry.and_then(|e| e.policy.clone()),
            endpoint: Some(descriptor),
            response_schema,
        };

        // First wins on duplicate derived names.
        if tools.contains_key(&tool_name) {
            report.warnings.push(format!(
                "duplicate tool name \"{tool_name}\" — keeping the first occurrence"
            ));
            continue;
        }
        tools.insert(tool_name, Arc::new(tool));
    }

    for (i, entry) in policy.whitelist.iter().enumerate() {
        if !matched_whitelist.contains(&i) {
            report.mapping_gaps.push(format!(
                "whitelist[{i}] ({}) matched no discovered endpoint",
                describe_key(entry)
            ));
        }
    }

    let snapshot = ToolCatalogSnapshot::new(policy.source_version.clone(), tools);
    Ok((snapshot, report))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool name synthesis
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Matched policy's `tool_name` when set, else derived from the
/// operation id, else from method + route.
fn synthesize_tool_name(entry: Option<&EndpointPolicy>, d: &EndpointDescriptor) -> String {
    if let Some(name) = entry
        .and_then(|e| e.tool_name.as_deref())
        .filter(|s| !s.is_empty())
    {
        return name.to_string();
    }
    if !d.operation_id.is_empty() {
        return sanitize_tool_name(&d.operation_id);
    }
    let raw = format!("{}_{}", d.http_method.to_ascii_lowercase(), d.route_template);
    sanitize_tool_name(&raw)
}

/// Replace characters outside the tool-name charset with `_` and
/// collapse the resulting runs.
fn sanitize_tool_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_sep = true;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
            out.push(c);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    out.trim_matches('_').to_string()
}

fn describe_key(entry: &EndpointPolicy) -> String {
    match entry.identity() {
        Some(PolicyKey::OperationId(op)) => format!("operation_id={op}"),
        Some(PolicyKey::Route { template, method }) => {
            format!("route={} method={}", template, method.unwrap_or("*"))
        }
        Some(PolicyKey::DisplayName(name)) => format!("display_name={name}"),
        None => "no identifying key".into(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(method: &str, route: &str, op: &str) -> EndpointDescriptor {
        EndpointDescriptor {
            route_template: route.into(),
            http_method: method.into(),
            operation_id: op.into(),
            display_name: op.into(),
            produces: Vec::new(),
            consumes: Vec::new(),
            requires_auth: false,
            acceptable_auth_schemes: Vec::new(),
        }
    }

    fn whitelist_op(op: &str, tool_name: Option<&str>) -> EndpointPolicy {
        EndpointPolicy {
            operation_id: Some(op.into()),
            tool_name: tool_name.map(String::from),
            ..EndpointPolicy::default()
        }
    }

    fn build(
        policy: &PolicyConfig,
        endpoints: Vec<EndpointDescriptor>,
        openapi: Option<&OpenApiDocument>,
    ) -> (ToolCatalogSnapshot, CatalogBuildReport) {
        build_catalog(
            policy,
            endpoints,
            openapi,
            &HashMap::new(),
            &SchemaBuilder::new(),
            &CancellationToken::new(),
        )
        .unwrap()
    }

    #[test]
    fn whitelist_match_emits_tool_with_policy_name() {
        let policy = PolicyConfig {
            whitelist: vec![whitelist_op("op1", Some("weather.get_forecast"))],
            source_version: "v1".into(),
            ..PolicyConfig::default()
        };
        let (snap, report) = build(&policy, vec![descriptor("GET", "/weather", "op1")], None);
        assert_eq!(snap.tool_count(), 1);
        assert!(snap.contains("weather.get_forecast"));
        assert_eq!(snap.policy_source_version(), "v1");
        assert!(report.warnings.is_empty());
        assert!(report.mapping_gaps.is_empty());
    }

    #[test]
    fn deny_by_default_drops_unmatched_endpoints() {
        let policy = PolicyConfig {
            whitelist: vec![whitelist_op("op1", None)],
            ..PolicyConfig::default()
        };
        let endpoints = vec![
            descriptor("GET", "/weather", "op1"),
            descriptor("GET", "/secret", "op2"),
        ];
        let (snap, _) = build(&policy, endpoints, None);
        assert_eq!(snap.tool_count(), 1);
        assert!(snap.contains("op1"));
    }

    #[test]
    fn allow_by_default_exposes_unmatched_endpoints() {
        let policy = PolicyConfig {
            deny_by_default: false,
            ..PolicyConfig::default()
        };
        let (snap, _) = build(&policy, vec![descriptor("GET", "/weather", "op1")], None);
        assert_eq!(snap.tool_count(), 1);
    }

    #[test]
    fn blacklist_dominates_whitelist() {
        let policy = PolicyConfig {
            whitelist: vec![whitelist_op("op1", None)],
            blacklist: vec![whitelist_op("op1", None)],
            ..PolicyConfig::default()
        };
        let (snap, _) = build(&policy, vec![descriptor("GET", "/weather", "op1")], None);
        assert_eq!(snap.tool_count(), 0);
    }

    #[test]
    fn disabled_whitelist_entry_suppresses_tool() {
        let mut entry = whitelist_op("op1", None);
        entry.enabled = false;
        let policy = PolicyConfig {
            deny_by_default: false,
            whitelist: vec![entry],
            ..PolicyConfig::default()
        };
        let (snap, _) = build(&policy, vec![descriptor("GET", "/weather", "op1")], None);
        assert_eq!(snap.tool_count(), 0);
    }

    #[test]
    fn tool_name_derivation_falls_back_to_method_route() {
        let policy = PolicyConfig {
            deny_by_default: false,
            ..PolicyConfig::default()
        };
        let mut endpoint = descriptor("GET", "/weather/{city}", "");
        endpoint.display_name = "Weather".into();
        let (snap, _) = build(&policy, vec![endpoint], None);
        assert!(snap.contains("get_weather_city"), "tools: {:?}",
            snap.iter().map(|t| &t.tool_name).collect::<Vec<_>>());
    }

    #[test]
    fn duplicate_tool_names_first_wins_with_warning() {
        let policy = PolicyConfig {
            whitelist: vec![
                whitelist_op("op1", Some("same")),
                whitelist_op("op2", Some("same")),
            ],
            ..PolicyConfig::default()
        };
        let endpoints = vec![
            descriptor("GET", "/a", "op1"),
            descriptor("GET", "/b", "op2"),
        ];
        let (snap, report) = build(&policy, endpoints, None);
        assert_eq!(snap.tool_count(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("duplicate tool name"));
        // First in canonical endpoint order wins.
        assert_eq!(
            snap.get("same").unwrap().endpoint.as_ref().unwrap().operation_id,
            "op1"
        );
    }

    #[test]
    fn openapi_enrichment_sets_description_and_schema() {
        let doc = OpenApiDocument::from_json(&json!({
            "paths": { "/weather": { "get": {
                "operationId": "op1",
                "summary": "Get the forecast",
                "parameters": [{
                    "name": "city", "in": "query", "required": true,
                    "schema": { "type": "string" }
                }],
                "responses": {
                    "200": { "content": { "application/json": { "schema": { "type": "object" } } } }
                }
            } } }
        }));
        let policy = PolicyConfig {
            whitelist: vec![whitelist_op("op1", None)],
            ..PolicyConfig::default()
        };
        let (snap, _) = build(&policy, vec![descriptor("GET", "/weather", "op1")], Some(&doc));
        let tool = snap.get("op1").unwrap();
        assert_eq!(tool.description.as_deref(), Some("Get the forecast"));
        let schema = tool.input_schema.as_ref().unwrap();
        assert!(schema["properties"]["city"].is_object());
        assert!(tool.response_schema.is_some());
    }

    #[test]
    fn mapping_gaps_record_unmatched_policies() {
        let policy = PolicyConfig {
            whitelist: vec![whitelist_op("op1", None), whitelist_op("ghost", None)],
            ..PolicyConfig::default()
        };
        let (_, report) = build(&policy, vec![descriptor("GET", "/weather", "op1")], None);
        assert_eq!(report.mapping_gaps.len(), 1);
        assert!(report.mapping_gaps[0].contains("operation_id=ghost"));
    }

    #[test]
    fn build_is_deterministic() {
        let policy = PolicyConfig {
            deny_by_default: false,
            whitelist: vec![whitelist_op("op1", None)],
            ..PolicyConfig::default()
        };
        let endpoints = || {
            vec![
                descriptor("POST", "/b", "op_b"),
                descriptor("GET", "/a", "op1"),
                descriptor("GET", "/c", "op_c"),
            ]
        };
        let (one, _) = build(&policy, endpoints(), None);
        let (two, _) = build(&policy, endpoints(), None);
        let names_one: Vec<&str> = one.iter().map(|t| t.tool_name.as_str()).collect();
        let names_two: Vec<&str> = two.iter().map(|t| t.tool_name.as_str()).collect();
        assert_eq!(names_one, names_two);
    }

    #[test]
    fn unique_tool_names_for_valid_policy() {
        let policy = PolicyConfig {
            deny_by_default: false,
            ..PolicyConfig::default()
        };
        let endpoints = vec![
            descriptor("GET", "/a", "op_a"),
            descriptor("GET", "/b", "op_b"),
            descriptor("POST", "/a", "op_a_post"),
        ];
        let (snap, report) = build(&policy, endpoints, None);
        assert_eq!(snap.tool_count(), 3);
        assert!(report.warnings.is_empty());
        let mut names: Vec<&str> = snap.iter().map(|t| t.tool_name.as_str()).collect();
        names.dedup();
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn sanitize_collapses_invalid_runs() {
        assert_eq!(sanitize_tool_name("get /weather/{city}"), "get_weather_city");
        assert_eq!(sanitize_tool_name("weather.get_forecast"), "weather.get_forecast");
        assert_eq!(sanitize_tool_name("__trim__"), "trim");
    }
}
