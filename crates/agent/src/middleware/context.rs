//! Mutable working records threaded through the middleware stages.
//!
//! Each context is owned by the loop and lent to one middleware at a time,
//! so later middleware always observe what earlier ones changed.

use operative_core::{Message, PressureInfo, ToolDefinition, ToolRequest};
use serde::{Deserialize, Serialize};

/// Passed through `before_request`.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The turn about to call the model
    pub turn: u32,

    /// Messages that will be sent
    pub messages: Vec<Message>,

    /// Tools the model will be offered
    pub tool_definitions: Vec<ToolDefinition>,

    /// Pressure computed after the previous response
    pub pressure: Vec<PressureInfo>,
}

impl RequestContext {
    /// Whether any dimension is under pressure.
    pub fn under_pressure(&self) -> bool {
        !self.pressure.is_empty()
    }
}

/// Passed through `after_response`.
///
/// `response_text` and `thinking` are advisory; changing them only affects
/// the events emitted for this turn. `tool_calls` may be filtered or rewritten.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    pub turn: u32,
    pub response_text: String,
    pub thinking: Option<String>,
    pub tool_calls: Vec<ToolRequest>,
}

/// What should happen to a tool call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "value", rename_all = "snake_case")]
pub enum ToolDecision {
    #[default]
    Proceed,
    /// Run with these raw JSON arguments instead.
    Modify(String),
    /// Do not run; report the reason to the model.
    Reject(String),
}

/// Working record for one tool call, passed through `before_tool_calls`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallContext {
    pub request: ToolRequest,
    pub decision: ToolDecision,
    pub attempt_count: u32,
}

impl ToolCallContext {
    pub fn new(request: ToolRequest) -> Self {
        Self {
            request,
            decision: ToolDecision::Proceed,
            attempt_count: 1,
        }
    }

    pub fn proceed(&mut self) {
        self.decision = ToolDecision::Proceed;
    }

    pub fn modify(&mut self, arguments: impl Into<String>) {
        self.decision = ToolDecision::Modify(arguments.into());
    }

    pub fn reject(&mut self, reason: impl Into<String>) {
        self.decision = ToolDecision::Reject(reason.into());
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.decision, ToolDecision::Reject(_))
    }

    /// The tool name this call targets.
    pub fn name(&self) -> &str {
        &self.request.name
    }

    /// The request as it will actually run, with any modified arguments.
    pub fn effective_request(&self) -> ToolRequest {
        match &self.decision {
            ToolDecision::Modify(arguments) => ToolRequest {
                arguments: arguments.clone(),
                ..self.request.clone()
            },
            _ => self.request.clone(),
        }
    }
}
