//! OpenAPI v3 lookup for catalog enrichment.
//!
//! Document acquisition is out of scope; the builder receives an
//! already-parsed JSON value and indexes the pieces it needs:
//! operation summaries/descriptions, path and query parameter
//! schemas, request body schemas, and the first 2xx response schema
//! (kept for diagnostics only). `$ref` targets are not resolved;
//! referenced schemas degrade to a permissive object schema.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    Path,
    Query,
}

#[derive(Debug, Clone)]
pub struct ParamInfo {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    pub schema: Value,
}

#[derive(Debug, Clone)]
pub struct OperationInfo {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub parameters: Vec<ParamInfo>,
    /// JSON request body schema, when declared.
    pub request_body: Option<Value>,
    /// First 2xx response schema, when declared.
    pub response: Option<Value>,
}

impl OperationInfo {
    /// Tool description: summary, falling back to description.
    pub fn tool_description(&self) -> Option<String> {
        self.summary
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| self.description.clone().filter(|s| !s.is_empty()))
    }

    /// Merge route + query + body schemas into one input object schema.
    pub fn merged_input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            properties.insert(param.name.clone(), param.schema.clone());
            if param.required || param.location == ParamLocation::Path {
                required.push(Value::String(param.name.clone()));
            }
        }

        if let Some(body) = &self.request_body {
            if let Some(body_props) = body.get("properties").and_then(Value::as_object) {
                for (name, schema) in body_props {
                    properties.entry(name.clone()).or_insert_with(|| schema.clone());
                }
            }
            if let Some(body_required) = body.get("required").and_then(Value::as_array) {
                for name in body_required {
                    if !required.contains(name) {
                        required.push(name.clone());
                    }
                }
            }
        }

        required.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
        json!({
            "type": "object",
            "properties": Value::Object(properties),
            "required": Value::Array(required),
        })
    }
}

/// Operation lookup indexed by operation id.
#[derive(Debug, Default)]
pub struct OpenApiDocument {
    operations: HashMap<String, OperationInfo>,
}

impl OpenApiDocument {
    /// Index an OpenAPI v3 JSON document. Unknown constructs are
    /// skipped, not rejected: enrichment is best-effort.
    pub fn from_json(doc: &Value) -> Self {
        let mut operations = HashMap::new();

        let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
            return Self { operations };
        };

        for path_item in paths.values() {
            let Some(path_obj) = path_item.as_object() else {
                continue;
            };
            for (method, operation) in path_obj {
                if !is_http_method(method) {
                    continue;
                }
                let Some(op) = operation.as_object() else {
                    continue;
                };
                let Some(op_id) = op.get("operationId").and_then(Value::as_str) else {
                    continue;
                };
                operations.insert(op_id.to_string(), parse_operation(op));
            }
        }

        Self { operations }
    }

    pub fn operation(&self, operation_id: &str) -> Option<&OperationInfo> {
        self.operations.get(operation_id)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

fn is_http_method(key: &str) -> bool {
    matches!(
        key,
        "get" | "put" | "post" | "delete" | "options" | "head" | "patch" | "trace"
    )
}

fn parse_operation(op: &Map<String, Value>) -> OperationInfo {
    let parameters = op
        .get("parameters")
        .and_then(Value::as_array)
        .map(|params| params.iter().filter_map(parse_parameter).collect())
        .unwrap_or_default();

    let request_body = op
        .get("requestBody")
        .and_then(|rb| json_media_schema(rb.get("content")?));

    let response = op
        .get("responses")
        .and_then(Value::as_object)
        .and_then(|responses| {
            responses
                .iter()
                .find(|(code, _)| code.starts_with('2'))
                .and_then(|(_, resp)| json_media_schema(resp.get("content")?))
        });

    OperationInfo {
        summary: op.get("summary").and_then(Value::as_str).map(String::from),
        description: op
            .get("description")
            .and_then(Value::as_str)
            .map(String::from),
        parameters,
        request_body,
        response,
    }
}

fn parse_parameter(param: &Value) -> Option<ParamInfo> {
    let obj = param.as_object()?;
    let location = match obj.get("in").and_then(Value::as_str)? {
        "path" => ParamLocation::Path,
        "query" => ParamLocation::Query,
        _ => return None,
    };
    Some(ParamInfo {
        name: obj.get("name").and_then(Value::as_str)?.to_string(),
        location,
        required: obj
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        schema: resolve_schema(obj.get("schema")),
    })
}

/// Schema for the `application/json` media type of a content map.
fn json_media_schema(content: &Value) -> Option<Value> {
    content
        .get("application/json")
        .map(|media| resolve_schema(media.get("schema")))
}

fn resolve_schema(schema: Option<&Value>) -> Value {
    match schema {
        Some(v) if v.get("$ref").is_some() => json!({ "type": "object" }),
        Some(v) => v.clone(),
        None => json!({ "type": "object" }),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
