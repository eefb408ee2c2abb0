//! Validation action — checks arguments against the tool's input schema.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::{ActionError, InvocationContext, Next, ToolAction, ToolOutput};

/// Order 400: the innermost built-in action, so only calls that pass
/// every other gate pay for schema validation.
///
/// Compiled validators are cached by schema content, surviving
/// catalog reloads that leave a tool's schema unchanged.
pub struct ValidationAction {
    validators: RwLock<HashMap<String, Arc<jsonschema::Validator>>>,
}

impl ValidationAction {
    pub fn new() -> Self {
        Self {
            validators: RwLock::new(HashMap::new()),
        }
    }

    fn validator_for(&self, schema: &Value) -> Result<Arc<jsonschema::Validator>, ActionError> {
        let key = hex::encode(Sha256::digest(schema.to_string().as_bytes()));
        if let Some(existing) = self.validators.read().get(&key) {
            return Ok(existing.clone());
        }

        let compiled = jsonschema::validator_for(schema)
            .map_err(|e| ActionError::Handler(format!("input schema does not compile: {e}")))?;
        let compiled = Arc::new(compiled);
        self.validators.write().insert(key, compiled.clone());
        Ok(compiled)
    }
}

impl Default for ValidationAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolAction for ValidationAction {
    fn order(&self) -> i32 {
        400
    }

    fn name(&self) -> &'static str {
        "validation"
    }

    fn applies_to(&self, ctx: &InvocationContext) -> bool {
        ctx.tool.input_schema.is_some()
    }

    async fn invoke<'a>(
        &self,
        ctx: &'a InvocationContext,
        next: Next<'a>,
    ) -> Result<ToolOutput, ActionError> {
        let Some(schema) = ctx.tool.input_schema.as_ref() else {
            return next.run(ctx).await;
        };

        let validator = self.validator_for(schema)?;
        if let Err(error) = validator.validate(&ctx.arguments) {
            return Err(ActionError::InvalidArguments(error.to_string()));
        }

        next.run(ctx).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
