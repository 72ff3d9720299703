//! Tool registry and manifest generation
//!
//! The registry is populated once at startup and read-only afterwards.
//! Registration order is preserved so the manifest sent to the model is
//! stable within a session.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::error::{HearthError, Result};

/// Side-effecting operation the remote model may request
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: &ToolArgs) -> Result<Value>;
}

/// One declared parameter; the manifest types every parameter as a required string
#[derive(Debug, Clone)]
pub struct ToolParam {
    pub name: String,
    pub description: String,
}

/// Declarative description of a tool
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ToolParam>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.params.push(ToolParam {
            name: name.into(),
            description: description.into(),
        });
        self
    }

    /// Function-calling schema entry in the shape the endpoint expects
    pub fn manifest_entry(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            properties.insert(
                param.name.clone(),
                json!({ "type": "string", "description": param.description }),
            );
        }
        let required: Vec<&str> = self.params.iter().map(|p| p.name.as_str()).collect();

        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required
                }
            }
        })
    }
}

/// Validated arguments handed to a handler
#[derive(Debug, Clone)]
pub struct ToolArgs {
    tool: String,
    values: Map<String, Value>,
}

impl ToolArgs {
    pub fn new(tool: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            tool: tool.into(),
            values,
        }
    }

    /// Fetch a string parameter, failing with a typed argument error
    pub fn str(&self, name: &str) -> Result<&str> {
        self.values
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| HearthError::BadToolArguments {
                name: self.tool.clone(),
                detail: format!("missing string parameter '{}'", name),
            })
    }

    /// Fetch a string parameter holding a decimal integer
    pub fn i64(&self, name: &str) -> Result<i64> {
        let raw = self.str(name)?;
        raw.trim().parse().map_err(|_| HearthError::BadToolArguments {
            name: self.tool.clone(),
            detail: format!("parameter '{}' is not an integer: '{}'", name, raw),
        })
    }
}

/// A registered tool: its spec plus the handler that executes it
pub struct RegisteredTool {
    pub spec: ToolSpec,
    pub handler: Arc<dyn ToolHandler>,
}

/// Fixed, ordered set of tools for the session
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ToolSpec, handler: Arc<dyn ToolHandler>) {
        self.tools.push(RegisteredTool { spec, handler });
    }

    pub fn find(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|t| t.spec.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Specs in registration order
    pub fn list(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.iter().map(|t| &t.spec)
    }

    /// Manifest for every registered tool, in registration order
    pub fn describe_all(&self) -> Vec<Value> {
        self.tools.iter().map(|t| t.spec.manifest_entry()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.iter().map(|t| &t.spec.name).collect::<Vec<_>>())
            .finish()
    }
}
