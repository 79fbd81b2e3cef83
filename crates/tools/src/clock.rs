//! Clock tool: reports the current time.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use operative_core::error::ToolError;
use operative_core::tool::{Tool, ToolOutput};

pub struct ClockTool;

#[async_trait]
impl Tool for ClockTool {
    fn name(&self) -> &str {
        "clock"
    }

    fn description(&self) -> &str {
        "Get the current date and time in UTC (RFC 3339)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::text(
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        ))
    }
}
