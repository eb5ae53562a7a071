//! Returns the tail of the channel snapshot as JSON.

use async_trait::async_trait;
use parley_core::error::ToolError;
use parley_core::tool::{Tool, ToolContext, ToolOutput};

use crate::limit_arg;

const MIN_LIMIT: u64 = 1;
const MAX_LIMIT: u64 = 30;
const DEFAULT_LIMIT: u64 = 12;

pub struct FetchRecentMessagesTool;

#[async_trait]
impl Tool for FetchRecentMessagesTool {
    fn name(&self) -> &str {
        "fetch_recent_channel_messages"
    }

    fn description(&self) -> &str {
        "Fetch the most recent messages in the current channel, oldest first."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "number",
                    "minimum": MIN_LIMIT,
                    "maximum": MAX_LIMIT,
                    "description": "How many recent messages to fetch"
                }
            },
            "required": [],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: serde_json::Value, context: &ToolContext) -> Result<ToolOutput, ToolError> {
        let limit = limit_arg(&arguments, MIN_LIMIT, MAX_LIMIT, DEFAULT_LIMIT);
        let start = context.messages.len().saturating_sub(limit);
        let body = serde_json::json!({ "messages": &context.messages[start..] });
        Ok(ToolOutput::success(body.to_string()))
    }
}
