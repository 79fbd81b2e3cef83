//! Operation events: the observable output of a run.
//!
//! A run produces an ordered, single-consumer sequence of [`Operation`]
//! values ending in exactly one terminal event, [`Operation::Completed`] or
//! [`Operation::Stopped`], which is always last.

use futures::Stream;
use operative_core::{
    Budget, Conversation, PressureInfo, StopReason, TokenUsage, ToolError, ToolOutput, ToolRequest,
};
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::OperativeError;

/// The final state of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// Text of the last model response
    pub text: String,

    /// The conversation, ready to pass to a later run
    pub conversation: Conversation,

    /// Cumulative usage across every turn
    pub usage: TokenUsage,

    pub turns_used: u32,
}

/// A tool call that was not run, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolRejection {
    pub request: ToolRequest,
    pub reason: String,
}

/// A failed tool call as reported to the caller.
#[derive(Debug, Clone)]
pub struct ToolFailure {
    /// The message fed back to the model
    pub message: String,

    pub cause: Arc<ToolError>,
}

impl std::fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ToolFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause.as_ref())
    }
}

/// One discrete moment in a run.
#[derive(Debug, Clone)]
pub enum Operation {
    TurnStarted {
        turn: u32,
        /// Snapshot of what is left; informational only
        remaining: Budget,
    },
    Thinking(String),
    Text(String),
    Pressure(PressureInfo),
    /// Raw model intent, before any approval logic.
    ToolsRequested(Vec<ToolRequest>),
    ToolsRejected(Vec<ToolRejection>),
    ToolCompleted {
        request: ToolRequest,
        output: ToolOutput,
    },
    ToolFailed {
        request: ToolRequest,
        error: ToolFailure,
    },
    TurnCompleted {
        turn: u32,
        usage: TokenUsage,
        tool_calls: usize,
        cumulative: TokenUsage,
    },
    Completed(RunResult),
    Stopped(StopReason),
}

impl Operation {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TurnStarted { .. } => "turn_started",
            Self::Thinking(_) => "thinking",
            Self::Text(_) => "text",
            Self::Pressure(_) => "pressure",
            Self::ToolsRequested(_) => "tools_requested",
            Self::ToolsRejected(_) => "tools_rejected",
            Self::ToolCompleted { .. } => "tool_completed",
            Self::ToolFailed { .. } => "tool_failed",
            Self::TurnCompleted { .. } => "turn_completed",
            Self::Completed(_) => "completed",
            Self::Stopped(_) => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Stopped(_))
    }
}

/// The event stream of one run.
///
/// Dropping it cancels the run at its next emission point.
pub struct OperationStream {
    inner: ReceiverStream<Operation>,
}

impl OperationStream {
    pub(crate) fn new(inner: ReceiverStream<Operation>) -> Self {
        Self { inner }
    }

    /// Discard intermediate events and surface the terminal one.
    pub async fn result(mut self) -> Result<RunResult, OperativeError> {
        while let Some(op) = self.inner.next().await {
            match op {
                Operation::Completed(result) => return Ok(result),
                Operation::Stopped(reason) => return Err(OperativeError::Stopped(reason)),
                _ => {}
            }
        }
        Err(OperativeError::Incomplete)
    }

    /// Drain every event, terminal one included.
    pub async fn collect_all(mut self) -> Vec<Operation> {
        let mut ops = Vec::new();
        while let Some(op) = self.inner.next().await {
            ops.push(op);
        }
        ops
    }
}

impl Stream for OperationStream {
    type Item = Operation;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Operation>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
