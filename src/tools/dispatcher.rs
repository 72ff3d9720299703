//! Tool dispatch
//!
//! Looks up a requested tool, validates its arguments against the declared
//! parameters, and invokes the handler. The dispatcher itself performs no
//! side effects beyond the invocation; failures never mutate state.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{HearthError, Result};

use super::registry::{ToolArgs, ToolRegistry, ToolSpec};

/// Routes tool call requests to registered handlers
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Function-calling manifest for the request body
    pub fn manifest(&self) -> Vec<Value> {
        self.registry.describe_all()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute one tool call request
    ///
    /// Unknown names fail with `ToolNotFound` before any handler runs.
    /// Handler failures propagate as `ToolFailed` without retry.
    pub async fn dispatch(&self, name: &str, arguments: Value) -> Result<Value> {
        let tool = self
            .registry
            .find(name)
            .ok_or_else(|| HearthError::ToolNotFound(name.to_string()))?;

        let args = validate_arguments(&tool.spec, arguments)?;

        tracing::debug!(tool = name, "dispatching tool call");
        tool.handler.call(&args).await.map_err(|e| match e {
            typed @ (HearthError::BadToolArguments { .. } | HearthError::ToolFailed { .. }) => typed,
            other => HearthError::ToolFailed {
                name: name.to_string(),
                cause: other.to_string(),
            },
        })
    }
}

/// Check the payload against the declared parameters: it must be a JSON
/// object carrying every declared parameter as a string. Extra keys are
/// ignored rather than rejected; models occasionally send them.
fn validate_arguments(spec: &ToolSpec, arguments: Value) -> Result<ToolArgs> {
    let values: Map<String, Value> = match arguments {
        Value::Object(map) => map,
        other => {
            return Err(HearthError::BadToolArguments {
                name: spec.name.clone(),
                detail: format!("arguments must be an object, got {}", json_kind(&other)),
            });
        }
    };

    for param in &spec.params {
        match values.get(&param.name) {
            None => {
                return Err(HearthError::BadToolArguments {
                    name: spec.name.clone(),
                    detail: format!("missing required parameter '{}'", param.name),
                });
            }
            Some(Value::String(_)) => {}
            Some(other) => {
                return Err(HearthError::BadToolArguments {
                    name: spec.name.clone(),
                    detail: format!("parameter '{}' must be a string, got {}", param.name, json_kind(other)),
                });
            }
        }
    }

    Ok(ToolArgs::new(spec.name.clone(), values))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
