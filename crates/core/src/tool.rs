//! Tool trait: the abstraction over invocable capabilities.
//!
//! A tool exposes a schema the model can read and an `execute` operation the
//! loop calls with the model's parsed arguments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ToolError;

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// The model's stated intent to call a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Name of the tool to execute
    pub name: String,

    /// Arguments as the raw JSON string the model produced
    pub arguments: String,

    /// Call ID assigned by the model
    pub tool_call_id: String,
}

impl ToolRequest {
    pub fn new(
        name: impl Into<String>,
        arguments: impl Into<String>,
        tool_call_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.into(),
            tool_call_id: tool_call_id.into(),
        }
    }
}

/// What a tool hands back on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Content fed back to the model
    pub content: String,

    /// Ask the loop to stop after this turn, using `content` as the reason
    #[serde(default)]
    pub should_stop: bool,
}

impl ToolOutput {
    /// A plain result.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            should_stop: false,
        }
    }

    /// A result that ends the run cooperatively.
    pub fn stop(reason: impl Into<String>) -> Self {
        Self {
            content: reason.into(),
            should_stop: true,
        }
    }
}

/// The core Tool trait.
///
/// Implementations must tolerate concurrent invocation: the loop runs every
/// approved call of a turn in parallel and imposes no ordering between them.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "calculator").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A name-keyed registry of available tools.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!(tool = %name, "Replaced previously registered tool");
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tool definitions sorted by name, for sending to the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Parse the raw arguments and execute the named tool.
    ///
    /// A missing tool or unparsable arguments fail locally without invoking
    /// anything.
    pub async fn invoke(&self, request: &ToolRequest) -> Result<ToolOutput, ToolError> {
        let tool = self
            .get(&request.name)
            .ok_or_else(|| ToolError::NotFound(request.name.clone()))?;
        let arguments = parse_arguments(&request.arguments)?;
        tool.execute(arguments).await
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Parse a raw argument payload. An empty payload means "no arguments".
pub fn parse_arguments(raw: &str) -> Result<serde_json::Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}
