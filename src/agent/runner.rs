//! Chat-completion loop with tool calling.
//!
//! The runner owns the tools for one invocation. Each iteration
//! sends the conversation to the API; when the model answers with
//! tool calls they are executed in order and their results appended
//! as `role: "tool"` messages, otherwise the assistant text is the
//! final answer.

use crate::error::{AgentError, AgentResult};
use crate::tools::{Tool, ToolCall, ToolDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Runner configuration, resolved from CLI flags and environment.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Explicit temperature; `None` picks a model-dependent default.
    pub temperature: Option<f32>,
    pub max_iterations: usize,
    pub timeout_seconds: u64,
}

/// Resolve the API key from `OPENAI_API_KEY`.
///
/// Called before any request is built so a missing key never
/// produces a confusing HTTP failure.
pub fn resolve_api_key() -> AgentResult<String> {
    api_key_from(std::env::var("OPENAI_API_KEY").ok())
}

fn api_key_from(value: Option<String>) -> AgentResult<String> {
    value
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| AgentError::Auth("OPENAI_API_KEY is not set or empty".to_string()))
}

/// Default sampling temperature for a model family.
pub fn default_temperature(model: &str) -> f32 {
    if model.contains("gpt-5") {
        1.0
    } else {
        0.7
    }
}

/// One message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    fn tool(call_id: &str, content: String) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: Some(call_id.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDefinition>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

/// Drives one agent invocation against the chat API.
pub struct AgentRunner {
    config: RunnerConfig,
    client: reqwest::Client,
    tools: Vec<Box<dyn Tool>>,
}

impl AgentRunner {
    pub fn new(config: RunnerConfig, tools: Vec<Box<dyn Tool>>) -> AgentResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AgentError::Api(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            tools,
        })
    }

    /// Run the loop: system prompt, user request, tool rounds,
    /// final text. Stops after `max_iterations` rounds.
    pub async fn run(&self, system_prompt: &str, request: &str) -> AgentResult<String> {
        let mut messages = vec![
            ChatMessage::text("system", system_prompt),
            ChatMessage::text("user", request),
        ];

        for iteration in 0..self.config.max_iterations {
            debug!("Iteration {} of {}", iteration + 1, self.config.max_iterations);

            let reply = self.chat(&messages).await?;

            match reply.tool_calls {
                Some(calls) if !calls.is_empty() => {
                    messages.push(ChatMessage {
                        role: "assistant".to_string(),
                        content: reply.content,
                        tool_calls: Some(calls.clone()),
                        tool_call_id: None,
                    });

                    for call in &calls {
                        let output = self.execute(call).await;
                        messages.push(ChatMessage::tool(&call.id, output));
                    }
                }
                _ => {
                    let answer = reply.content.unwrap_or_default();
                    info!("Agent finished after {} iteration(s)", iteration + 1);
                    return Ok(answer);
                }
            }
        }

        warn!(
            "Stopping after {} iterations without a final answer",
            self.config.max_iterations
        );
        Ok(format!(
            "Stopped after {} iterations without a final answer.",
            self.config.max_iterations
        ))
    }

    /// Execute one tool call and render the text handed back to the
    /// model. Unknown tools and failures come back as error text so
    /// the model can adjust instead of the run aborting.
    async fn execute(&self, call: &ToolCall) -> String {
        let name = &call.function.name;

        let Some(tool) = self.tools.iter().find(|t| t.name() == *name) else {
            warn!("Model requested unknown tool '{}'", name);
            return format!("Error: unknown tool '{}'", name);
        };

        let args: Value = match call.function.parsed_arguments() {
            Ok(args) => args,
            Err(e) => return format!("Error: invalid tool arguments: {}", e),
        };

        info!("Executing tool {}", name);
        match tool.call(&args).await {
            Ok(result) => result.into_message(),
            Err(e) => {
                warn!("Tool {} failed: {}", name, e);
                format!("Error: {}", e)
            }
        }
    }

    async fn chat(&self, messages: &[ChatMessage]) -> AgentResult<ResponseMessage> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let request = ChatRequest {
            model: &self.config.model,
            messages,
            tools: self.tools.iter().map(|t| t.definition()).collect(),
            temperature: self
                .config
                .temperature
                .unwrap_or_else(|| default_temperature(&self.config.model)),
        };

        debug!("Sending chat request with {} messages", messages.len());

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::Api(format!(
                        "request timed out after {}s",
                        self.config.timeout_seconds
                    ))
                } else if e.is_connect() {
                    AgentError::Api(format!("cannot connect to {}", self.config.base_url))
                } else {
                    AgentError::Api(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(AgentError::Auth(format!(
                "API rejected the key ({})",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Api(format!("API error {}: {}", status, body)));
        }

        let mut decoded: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Api(format!("cannot decode API response: {}", e)))?;

        if decoded.choices.is_empty() {
            return Err(AgentError::Api("API returned no choices".to_string()));
        }
        Ok(decoded.choices.remove(0).message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{FunctionCall, ToolResult};
    use async_trait::async_trait;
    use serde_json::json;

    #[test]
    fn test_api_key_required() {
        assert!(matches!(api_key_from(None), Err(AgentError::Auth(_))));
        assert!(matches!(
            api_key_from(Some("  ".into())),
            Err(AgentError::Auth(_))
        ));
        assert_eq!(api_key_from(Some("sk-test".into())).unwrap(), "sk-test");
    }

    #[test]
    fn test_default_temperature_by_model() {
        assert_eq!(default_temperature("gpt-4o-mini"), 0.7);
        assert_eq!(default_temperature("gpt-5"), 1.0);
        assert_eq!(default_temperature("gpt-5-mini"), 1.0);
        assert_eq!(default_temperature("llama3"), 0.7);
    }

    #[test]
    fn test_message_serialization_shape() {
        let system = ChatMessage::text("system", "be helpful");
        let v = serde_json::to_value(&system).unwrap();
        assert_eq!(v, json!({"role": "system", "content": "be helpful"}));

        let tool = ChatMessage::tool("call_1", "output".to_string());
        let v = serde_json::to_value(&tool).unwrap();
        assert_eq!(v["tool_call_id"], "call_1");
        assert_eq!(v["role"], "tool");
    }

    #[test]
    fn test_response_decoding() {
        let body = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "git_diff", "arguments": "{}"}
                    }]
                }
            }]
        }"#;
        let decoded: ChatResponse = serde_json::from_str(body).unwrap();
        let message = &decoded.choices[0].message;
        assert!(message.content.is_none());
        let calls = message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "git_diff");
    }

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn definition(&self) -> ToolDefinition {
            ToolDefinition::function("echo", "echo", json!({"type": "object"}))
        }

        async fn call(&self, args: &Value) -> anyhow::Result<ToolResult> {
            Ok(ToolResult::success(
                args.get("text").and_then(|v| v.as_str()).unwrap_or(""),
            ))
        }
    }

    fn runner_with_echo() -> AgentRunner {
        let config = RunnerConfig {
            api_key: "sk-test".into(),
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            temperature: None,
            max_iterations: 10,
            timeout_seconds: 5,
        };
        AgentRunner::new(config, vec![Box::new(Echo)]).unwrap()
    }

    #[tokio::test]
    async fn test_execute_dispatches_by_name() {
        let runner = runner_with_echo();
        let call = ToolCall {
            id: "call_1".into(),
            call_type: "function".into(),
            function: FunctionCall {
                name: "echo".into(),
                arguments: r#"{"text": "hi"}"#.into(),
            },
        };
        assert_eq!(runner.execute(&call).await, "hi");
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let runner = runner_with_echo();
        let call = ToolCall {
            id: "call_1".into(),
            call_type: "function".into(),
            function: FunctionCall {
                name: "missing".into(),
                arguments: String::new(),
            },
        };
        let output = runner.execute(&call).await;
        assert!(output.starts_with("Error: unknown tool"));
    }

    #[tokio::test]
    async fn test_execute_bad_arguments() {
        let runner = runner_with_echo();
        let call = ToolCall {
            id: "call_1".into(),
            call_type: "function".into(),
            function: FunctionCall {
                name: "echo".into(),
                arguments: "not json".into(),
            },
        };
        let output = runner.execute(&call).await;
        assert!(output.starts_with("Error: invalid tool arguments"));
    }
}
