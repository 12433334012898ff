//! Tool trait and closure-based tool wrapper.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::{Result, VoxlineError};

/// A function the agent may call during a turn.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the arguments object.
    fn parameters(&self) -> &Value;

    /// Execute with parsed arguments, returning the result text shown to the
    /// model and the client.
    async fn execute(&self, args: &Map<String, Value>) -> Result<String>;
}

type ToolHandler =
    dyn Fn(Map<String, Value>) -> Pin<Box<dyn Future<Output = Result<String>> + Send>> + Send + Sync;

/// Closure-based tool.
pub struct FunctionTool {
    name: String,
    description: String,
    parameters: Value,
    handler: Arc<ToolHandler>,
}

impl FunctionTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &Value {
        &self.parameters
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<String> {
        (self.handler)(args.clone()).await
    }
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

/// Builder for object-shaped argument schemas.
#[derive(Debug, Default)]
pub struct ToolParameters {
    properties: Map<String, Value>,
    required: Vec<String>,
}

impl ToolParameters {
    pub fn object() -> Self {
        Self::default()
    }

    pub fn string(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(name, "string", description, required)
    }

    pub fn integer(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(name, "integer", description, required)
    }

    pub fn boolean(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.property(name, "boolean", description, required)
    }

    fn property(
        mut self,
        name: impl Into<String>,
        kind: &str,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(
            name.clone(),
            json!({ "type": kind, "description": description.into() }),
        );
        if required {
            self.required.push(name);
        }
        self
    }

    pub fn build(self) -> Value {
        json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required,
        })
    }
}

/// Fetch a required string argument.
pub fn required_str<'a>(tool: &str, args: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| VoxlineError::ToolExecution {
            tool_name: tool.to_string(),
            message: format!("missing string argument '{key}'"),
        })
}

/// Fetch a required integer argument.
pub fn required_i64(tool: &str, args: &Map<String, Value>, key: &str) -> Result<i64> {
    args.get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| VoxlineError::ToolExecution {
            tool_name: tool.to_string(),
            message: format!("missing integer argument '{key}'"),
        })
}
