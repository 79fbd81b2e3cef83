//! Tracing middleware. Observes every hook, mutates nothing.
//!
//! Install a subscriber to see the output, for example:
//!
//! ```no_run
//! tracing_subscriber::fmt()
//!     .with_env_filter("operative_agent=debug")
//!     .init();
//! ```

use async_trait::async_trait;
use operative_core::{MiddlewareError, ToolError};
use tracing::debug;

use super::{Middleware, RequestContext, ResponseContext, ToolCallContext, ToolErrorRecovery};

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    async fn before_request(&self, ctx: &mut RequestContext) -> Result<(), MiddlewareError> {
        debug!(
            turn = ctx.turn,
            messages = ctx.messages.len(),
            tools = ctx.tool_definitions.len(),
            pressure = ctx.pressure.len(),
            "Outbound request"
        );
        Ok(())
    }

    async fn after_response(&self, ctx: &mut ResponseContext) -> Result<(), MiddlewareError> {
        debug!(
            turn = ctx.turn,
            text_len = ctx.response_text.len(),
            thinking = ctx.thinking.is_some(),
            tool_calls = ctx.tool_calls.len(),
            "Model responded"
        );
        Ok(())
    }

    async fn before_tool_calls(&self, calls: &mut [ToolCallContext]) -> Result<(), MiddlewareError> {
        for call in calls.iter() {
            debug!(
                tool = call.name(),
                call_id = %call.request.tool_call_id,
                decision = ?call.decision,
                "Tool call pending"
            );
        }
        Ok(())
    }

    async fn on_tool_error(
        &self,
        error: &ToolError,
        call: &ToolCallContext,
    ) -> Result<Option<ToolErrorRecovery>, MiddlewareError> {
        debug!(tool = call.name(), error = %error, "Tool failed");
        Ok(None)
    }
}
