//! The Operative turn loop.
//!
//! Each run follows a **budget → request → respond → act** cycle:
//!
//! 1. **Check the budget**: stop if turns, tokens, or time are exhausted
//! 2. **Prepare the request** through the middleware pipeline
//! 3. **Call the model** and account for its usage
//! 4. **If tool calls**: approve, dispatch concurrently, feed results back, loop
//! 5. **If text only**: complete with the final text and conversation
//!
//! Progress is reported as a stream of [`Operation`] events ending in exactly
//! one terminal event.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use operative_agent::Operative;
//! # use operative_core::{Budget, ModelClient, ToolRegistry};
//! # async fn demo(client: Arc<dyn ModelClient>) -> Result<(), operative_agent::OperativeError> {
//! let agent = Operative::new(client, ToolRegistry::new())
//!     .with_system_prompt("You are terse.")
//!     .with_budget(Budget::default().with_max_turns(8));
//!
//! let result = agent.run("What time is it?").result().await?;
//! println!("{}", result.text);
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod error;
pub mod loop_runner;
pub mod middleware;
pub mod operation;
pub mod token;

#[cfg(test)]
mod test_helpers;

pub use dispatch::{ToolBatch, ToolOutcome};
pub use error::OperativeError;
pub use loop_runner::Operative;
pub use middleware::{
    ErrorPolicy, LoggingMiddleware, Middleware, MiddlewareStack, PressureCompaction,
    RequestContext, ResponseContext, ToolCallContext, ToolDecision, ToolErrorRecovery, ToolPolicy,
};
pub use operation::{Operation, OperationStream, RunResult, ToolFailure, ToolRejection};
