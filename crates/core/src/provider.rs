//! Provider trait — the abstraction over LLM backends.
//!
//! A Provider takes one structured prompt turn (prompt, history, generation
//! options, tool definitions and any tool results gathered so far) and returns
//! content and/or tool-call requests.
//!
//! Implementations: OpenAI-compatible (local and online), unavailable stub.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::ChatMessage;
use crate::tool::{ToolRequest, ToolResult};

/// Sampling options for one model request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// The model to use (e.g., "gpt-4o-mini", "local-model")
    pub model: String,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    500
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "local-model".into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Everything the model sees in one round of the tool loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTurn {
    /// The assembled invocation prompt
    pub prompt: String,

    /// Budgeted conversation history, chronological
    #[serde(default)]
    pub history: Vec<ChatMessage>,

    pub options: GenerationOptions,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Results of tool calls from earlier rounds, in call order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,
}

/// A complete response from a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated text. May be empty when tool requests are present.
    #[serde(default)]
    pub content: String,

    /// Which model actually responded (may differ from requested)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Tool calls the model wants executed before it answers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_requests: Vec<ToolRequest>,
}

impl ProviderResponse {
    /// A plain text answer with no tool requests.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: None,
            tool_requests: Vec::new(),
        }
    }

    /// A response that only asks for tools.
    pub fn with_tool_requests(tool_requests: Vec<ToolRequest>) -> Self {
        Self {
            content: String::new(),
            model: None,
            tool_requests,
        }
    }

    pub fn has_tool_requests(&self) -> bool {
        !self.tool_requests.is_empty()
    }
}

/// The core Provider trait.
///
/// Every LLM backend implements this trait. The tool orchestrator calls
/// `send()` without knowing which backend is being used.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "local", "online").
    fn name(&self) -> &str;

    /// Send one turn and get a complete response.
    ///
    /// Implementations fail on network errors, non-success statuses, and
    /// responses with neither content nor tool requests.
    async fn send(&self, turn: PromptTurn) -> std::result::Result<ProviderResponse, ProviderError>;
}
