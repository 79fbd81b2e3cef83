//! Finish tool: lets the model end a run cooperatively.
//!
//! The summary becomes the run's stop reason.

use async_trait::async_trait;
use operative_core::error::ToolError;
use operative_core::tool::{Tool, ToolOutput};

pub struct FinishTool;

#[async_trait]
impl Tool for FinishTool {
    fn name(&self) -> &str {
        "finish"
    }

    fn description(&self) -> &str {
        "Call when the task is complete. Ends the run with the given summary."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "What was accomplished"
                }
            },
            "required": ["summary"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let summary = arguments["summary"]
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("missing 'summary' argument".into()))?;
        tracing::debug!(summary, "Finish tool requested stop");
        Ok(ToolOutput::stop(summary))
    }
}
