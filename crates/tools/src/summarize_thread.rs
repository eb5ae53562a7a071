//! Thread digest tool: numbers the recent messages into a plain-text digest.

use async_trait::async_trait;
use parley_core::error::ToolError;
use parley_core::tool::{Tool, ToolContext, ToolOutput};

use crate::limit_arg;

const MIN_LIMIT: u64 = 3;
const MAX_LIMIT: u64 = 40;
const DEFAULT_LIMIT: u64 = 20;

pub struct SummarizeThreadTool;

#[async_trait]
impl Tool for SummarizeThreadTool {
    fn name(&self) -> &str {
        "summarize_thread"
    }

    fn description(&self) -> &str {
        "Produce a numbered digest of the most recent messages in the current channel."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "number",
                    "minimum": MIN_LIMIT,
                    "maximum": MAX_LIMIT,
                    "description": "How many recent messages to include in the summary"
                }
            },
            "required": [],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: serde_json::Value, context: &ToolContext) -> Result<ToolOutput, ToolError> {
        let limit = limit_arg(&arguments, MIN_LIMIT, MAX_LIMIT, DEFAULT_LIMIT);
        let start = context.messages.len().saturating_sub(limit);
        let scope = &context.messages[start..];

        let numbered: Vec<String> = scope
            .iter()
            .enumerate()
            .map(|(i, message)| format!("{}. {message}", i + 1))
            .collect();

        Ok(ToolOutput::success(format!(
            "Thread digest ({} messages):\n{}",
            scope.len(),
            numbered.join("\n")
        )))
    }
}
