//! Tool interface and wire types.
//!
//! Tools are constructed from YAML tool specs by the factory and
//! handed to the agent runner, which exposes them to the model via
//! the OpenAI tool-calling API.

mod factory;
pub mod filesystem;
pub mod git;
pub mod github;

pub use factory::build_tools;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool definition for the OpenAI tools API.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    /// Build a `function` tool definition with a JSON-schema
    /// parameter object.
    pub fn function(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.to_string(),
                description: description.to_string(),
                parameters,
            },
        }
    }
}

/// A tool call made by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

/// The function half of a tool call. OpenAI sends `arguments` as a
/// JSON-encoded string, not an object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

impl FunctionCall {
    /// Decode the arguments string into a JSON value. An empty
    /// string decodes to an empty object.
    pub fn parsed_arguments(&self) -> Result<Value> {
        if self.arguments.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        Ok(serde_json::from_str(&self.arguments)?)
    }
}

/// Result of executing a tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(message.into()),
        }
    }

    /// Text handed back to the model for this result.
    pub fn into_message(self) -> String {
        if self.success {
            self.output
        } else {
            format!("Error: {}", self.error.unwrap_or_default())
        }
    }
}

/// A callable capability bound to a fixed configuration.
///
/// Construction is side-effect free; all I/O happens in `call`.
/// Tools hold no state between calls beyond their configuration.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to invoke this tool.
    fn name(&self) -> &str;

    /// Definition advertised to the model.
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with decoded JSON arguments.
    ///
    /// Domain failures (missing file, dirty repo, bad arguments)
    /// come back as `ToolResult::error` so the model can react;
    /// `Err` is reserved for failures of the tool machinery itself.
    async fn call(&self, args: &Value) -> Result<ToolResult>;
}
