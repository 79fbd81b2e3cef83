//! Concurrent tool dispatch.
//!
//! Every approved call of a turn runs as its own task on a [`JoinSet`].
//! Outcomes are yielded in completion order. Dropping or aborting the batch
//! cancels whatever is still running.

use futures::FutureExt;
use operative_core::{ToolError, ToolOutput, ToolRegistry};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::middleware::ToolCallContext;

/// The single outcome of one dispatched call.
#[derive(Debug)]
pub struct ToolOutcome {
    pub call: ToolCallContext,
    pub result: Result<ToolOutput, ToolError>,
}

/// An in-flight batch of tool calls.
pub struct ToolBatch {
    tasks: JoinSet<ToolOutcome>,
}

impl ToolBatch {
    /// Spawn one task per call.
    pub fn spawn(registry: Arc<ToolRegistry>, calls: Vec<ToolCallContext>) -> Self {
        let mut tasks = JoinSet::new();
        for call in calls {
            let registry = registry.clone();
            tasks.spawn(async move {
                let request = call.effective_request();
                debug!(tool = %request.name, call_id = %request.tool_call_id, "Dispatching tool");
                let result = AssertUnwindSafe(registry.invoke(&request))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        Err(ToolError::ExecutionFailed {
                            tool_name: request.name.clone(),
                            reason: "tool panicked".into(),
                        })
                    });
                ToolOutcome { call, result }
            });
        }
        Self { tasks }
    }

    /// The next outcome to finish, or `None` once the batch is drained.
    pub async fn next(&mut self) -> Option<ToolOutcome> {
        loop {
            match self.tasks.join_next().await? {
                Ok(outcome) => return Some(outcome),
                Err(e) if e.is_cancelled() => debug!("Tool task cancelled"),
                Err(e) => error!(error = %e, "Tool task did not complete"),
            }
        }
    }

    /// Cancel every call still running.
    pub fn abort(&mut self) {
        if !self.tasks.is_empty() {
            debug!(outstanding = self.tasks.len(), "Aborting tool batch");
        }
        self.tasks.abort_all();
    }
}
