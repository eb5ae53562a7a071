//! Participants tool: who has been talking recently.

use async_trait::async_trait;
use parley_core::error::ToolError;
use parley_core::tool::{Tool, ToolContext, ToolOutput};

pub struct ListParticipantsTool;

#[async_trait]
impl Tool for ListParticipantsTool {
    fn name(&self) -> &str {
        "list_participants"
    }

    fn description(&self) -> &str {
        "List the people who have recently spoken in the current channel."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": [],
            "additionalProperties": false
        })
    }

    async fn execute(&self, _arguments: serde_json::Value, context: &ToolContext) -> Result<ToolOutput, ToolError> {
        let body = serde_json::json!({ "participants": &context.participants });
        Ok(ToolOutput::success(body.to_string()))
    }
}
