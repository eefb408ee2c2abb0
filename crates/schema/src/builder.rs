//! Type shapes and the schema builder.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{json, Map, Value};

/// JSON-Schema dialect emitted by the builder.
const DIALECT: &str = "https://json-schema.org/draft/2020-12/schema";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Type shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Structural description of a tool input type.
///
/// Record names are type identities: two records with the same name
/// are assumed to be the same type and share a cache slot.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeShape {
    String,
    Char,
    Uuid,
    Uri,
    DateTime,
    Bool,
    Integer,
    Number,
    /// String with a closed value set.
    Enum(Vec<String>),
    /// Ordered sequence with homogeneous items.
    Array(Box<TypeShape>),
    /// String-keyed mapping with homogeneous values.
    Map(Box<TypeShape>),
    /// Named compound record.
    Record { name: String, fields: Vec<Field> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub shape: TypeShape,
    pub optional: bool,
}

impl Field {
    pub fn required(name: impl Into<String>, shape: TypeShape) -> Self {
        Self {
            name: name.into(),
            shape,
            optional: false,
        }
    }

    pub fn optional(name: impl Into<String>, shape: TypeShape) -> Self {
        Self {
            name: name.into(),
            shape,
            optional: true,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Builder
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Builds JSON-Schema documents from [`TypeShape`]s.
///
/// Record schemas are cached by record name. The cache is safe to
/// share across threads; concurrent misses may build the same schema
/// twice but always produce identical values.
#[derive(Default)]
pub struct SchemaBuilder {
    cache: RwLock<HashMap<String, Arc<Value>>>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build (or fetch from cache) the schema document for a shape.
    pub fn build(&self, shape: &TypeShape) -> Arc<Value> {
        if let TypeShape::Record { name, .. } = shape {
            if let Some(cached) = self.cache.read().get(name) {
                return cached.clone();
            }
        }

        let mut doc = shape_to_schema(shape);
        if let Value::Object(ref mut map) = doc {
            map.insert("$schema".into(), Value::String(DIALECT.into()));
        }
        let doc = Arc::new(doc);

        if let TypeShape::Record { name, .. } = shape {
            self.cache.write().insert(name.clone(), doc.clone());
        }
        doc
    }

    /// Schema for a tool that takes no arguments.
    pub fn empty_object() -> Value {
        json!({
            "$schema": DIALECT,
            "type": "object",
            "properties": {}
        })
    }

    #[cfg(test)]
    fn cached_count(&self) -> usize {
        self.cache.read().len()
    }
}

/// Recursive shape-to-schema mapping. Nested schemas do not repeat
/// the `$schema` keyword; only the document root carries it.
fn shape_to_schema(shape: &TypeShape) -> Value {
    match shape {
        TypeShape::String | TypeShape::Char => json!({ "type": "string" }),
        TypeShape::Uuid => json!({ "type": "string", "format": "uuid" }),
        TypeShape::Uri => json!({ "type": "string", "format": "uri" }),
        TypeShape::DateTime => json!({ "type": "string", "format": "date-time" }),
        TypeShape::Bool => json!({ "type": "boolean" }),
        TypeShape::Integer => json!({ "type": "integer" }),
        TypeShape::Number => json!({ "type": "number" }),
        TypeShape::Enum(values) => {
            let mut sorted: Vec<&str> = values.iter().map(String::as_str).collect();
            sorted.sort_unstable();
            json!({ "type": "string", "enum": sorted })
        }
        TypeShape::Array(item) => json!({
            "type": "array",
            "items": shape_to_schema(item)
        }),
        TypeShape::Map(value) => json!({
            "type": "object",
            "additionalProperties": shape_to_schema(value)
        }),
        TypeShape::Record { fields, .. } => {
            let mut sorted: Vec<&Field> = fields.iter().collect();
            sorted.sort_by(|a, b| a.name.cmp(&b.name));

            let mut properties = Map::new();
            let mut required = Vec::new();
            for field in sorted {
                let mut field_schema = shape_to_schema(&field.shape);
                if field.optional {
                    if let Value::Object(ref mut map) = field_schema {
                        map.insert("nullable".into(), Value::Bool(true));
                    }
                } else {
                    required.push(Value::String(field.name.clone()));
                }
                properties.insert(field.name.clone(), field_schema);
            }

            let mut obj = Map::new();
            obj.insert("type".into(), Value::String("object".into()));
            obj.insert("properties".into(), Value::Object(properties));
            obj.insert("required".into(), Value::Array(required));
            Value::Object(obj)
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
