//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI and any server exposing an OpenAI-compatible
//! `/v1/chat/completions` endpoint (vLLM, llama.cpp server, LM Studio,
//! Ollama, ...). Local mode sends no credentials; online mode sends a
//! bearer key.
//!
//! Request and response mapping are pure functions so they can be tested
//! without a server.

use async_trait::async_trait;
use parley_core::error::ProviderError;
use parley_core::provider::{PromptTurn, Provider, ProviderResponse, ToolDefinition};
use parley_core::tool::{ToolRequest, ToolResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Characters of an error body kept in `ProviderError::ApiError`.
const ERROR_BODY_CHARS: usize = 500;

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a provider posting to the full chat-completions `endpoint`.
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client,
        }
    }

    /// A local server; no credentials.
    pub fn local(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self::new("local", endpoint, None, timeout)
    }

    /// A hosted API authenticated with a bearer key.
    pub fn online(endpoint: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self::new("online", endpoint, Some(api_key.into()), timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, turn: PromptTurn) -> std::result::Result<ProviderResponse, ProviderError> {
        let body = build_body(&turn);

        debug!(
            provider = %self.name,
            model = %turn.options.model,
            history = turn.history.len(),
            tools = turn.tools.len(),
            tool_results = turn.tool_results.len(),
            "Sending completion request"
        );

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(format!("{} did not answer in time", self.endpoint))
            } else {
                ProviderError::Network(format!("failed to reach {}: {e}", self.endpoint))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status = status.as_u16(), "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status.as_u16(),
                message: error_body.chars().take(ERROR_BODY_CHARS).collect(),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(format!("failed to read response body: {e}")))?;

        parse_response(&text, &turn.options.model)
    }
}

/// Map a prompt turn to an OpenAI chat-completions request body.
///
/// History goes first, then the prompt as the final user message. Tool
/// results from earlier rounds follow as one more user message.
pub fn build_body(turn: &PromptTurn) -> serde_json::Value {
    let mut messages: Vec<ApiMessage> = turn
        .history
        .iter()
        .map(|m| ApiMessage {
            role: m.role.as_str().to_string(),
            content: Some(m.content.clone()),
            tool_calls: None,
        })
        .collect();

    messages.push(ApiMessage {
        role: "user".into(),
        content: Some(turn.prompt.clone()),
        tool_calls: None,
    });

    if !turn.tool_results.is_empty() {
        messages.push(ApiMessage {
            role: "user".into(),
            content: Some(render_tool_results(&turn.tool_results)),
            tool_calls: None,
        });
    }

    let mut body = serde_json::json!({
        "model": turn.options.model,
        "temperature": turn.options.temperature,
        "max_tokens": turn.options.max_tokens,
        "messages": messages,
        "stream": false,
    });

    if !turn.tools.is_empty() {
        body["tools"] = serde_json::json!(to_api_tools(&turn.tools));
        body["tool_choice"] = serde_json::json!("auto");
    }

    body
}

/// Parse a chat-completions response body.
///
/// Empty content is fine when tool calls are present; neither is an error.
pub fn parse_response(body: &str, requested_model: &str) -> std::result::Result<ProviderResponse, ProviderError> {
    let api_response: ApiResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::MalformedResponse(format!("failed to parse response: {e}")))?;

    let choice = api_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::MalformedResponse("no choices in response".into()))?;

    let tool_requests: Vec<ToolRequest> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolRequest {
            id: tc.id,
            arguments: parse_arguments(&tc.function.name, &tc.function.arguments),
            name: tc.function.name,
        })
        .collect();

    let content = choice.message.content.unwrap_or_default().trim().to_string();
    if content.is_empty() && tool_requests.is_empty() {
        return Err(ProviderError::MalformedResponse(
            "response had neither content nor tool calls".into(),
        ));
    }

    Ok(ProviderResponse {
        content,
        model: api_response.model.or_else(|| Some(requested_model.to_string())),
        tool_requests,
    })
}

/// Tool-call arguments arrive as a JSON string; anything that is not an
/// object becomes `{}`.
fn parse_arguments(tool_name: &str, raw: &str) -> serde_json::Value {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value @ serde_json::Value::Object(_)) => value,
        _ => {
            if !raw.trim().is_empty() {
                warn!(tool = %tool_name, "Ignoring non-object tool arguments");
            }
            serde_json::json!({})
        }
    }
}

fn render_tool_results(results: &[ToolResult]) -> String {
    let rendered = serde_json::to_string(results).unwrap_or_else(|_| "[]".into());
    format!("Tool results (JSON, in call order):\n{rendered}")
}

/// Convert tool definitions to OpenAI API format.
fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
    tools
        .iter()
        .map(|t| ApiToolDefinition {
            r#type: "function".into(),
            function: ApiToolFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        })
        .collect()
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(default)]
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}
