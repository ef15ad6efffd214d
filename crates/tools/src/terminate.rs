//! Terminate tool: lets the model declare the task finished.
//!
//! The tool itself only echoes the status; the agent loop treats a call to
//! it as a request to enter `FINISHED`.

use async_trait::async_trait;
use stepwise_core::error::ToolError;
use stepwise_core::tool::{Tool, ToolResult};

pub const TERMINATE_TOOL: &str = "terminate";

pub struct TerminateTool;

#[async_trait]
impl Tool for TerminateTool {
    fn name(&self) -> &str {
        TERMINATE_TOOL
    }

    fn description(&self) -> &str {
        "Terminate the interaction when the request is met OR if the assistant cannot proceed further with the task. When you have finished all the tasks, call this tool to end the work."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "description": "The finish status of the interaction.",
                    "enum": ["success", "failure"]
                }
            },
            "required": ["status"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let status = match arguments["status"].as_str() {
            Some(s @ ("success" | "failure")) => s,
            Some(other) => {
                return Err(ToolError::InvalidArguments(format!(
                    "status must be 'success' or 'failure', got '{other}'"
                )));
            }
            None => return Err(ToolError::InvalidArguments("Missing 'status' argument".into())),
        };

        Ok(ToolResult::ok(format!(
            "The interaction has been completed with status: {status}"
        ))
        .with_data(serde_json::json!({ "status": status })))
    }
}
