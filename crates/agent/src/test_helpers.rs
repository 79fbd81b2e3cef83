//! Shared test helpers: a scripted model client and tool fixtures.

use async_trait::async_trait;
use operative_core::{
    Conversation, Message, ModelClient, ModelError, ModelResponse, TokenUsage, Tool, ToolError,
    ToolOutput, ToolRequest,
};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// One scripted model reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    /// Text preceded by reasoning.
    Reasoned { thinking: String, text: String },
    ToolCalls(Vec<ToolRequest>),
    Error(ModelError),
    /// Wait before producing the inner reply.
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    pub fn text(text: &str) -> Self {
        Self::Text(text.into())
    }

    pub fn reasoned(thinking: &str, text: &str) -> Self {
        Self::Reasoned {
            thinking: thinking.into(),
            text: text.into(),
        }
    }

    pub fn call(name: &str, arguments: serde_json::Value, id: &str) -> Self {
        Self::ToolCalls(vec![ToolRequest::new(name, arguments.to_string(), id)])
    }

    pub fn delayed(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }
}

/// A model client that plays back a fixed script.
///
/// Once the script runs out it either repeats the last reply (see
/// [`repeating`](Self::repeating)) or fails with a model error.
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Reply>>,
    repeat_last: bool,
    usage: TokenUsage,
    seen: Mutex<Vec<Conversation>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            repeat_last: false,
            usage: TokenUsage::from_counts(10, 5),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with `reply`.
    pub fn repeating(reply: Reply) -> Self {
        Self {
            repeat_last: true,
            ..Self::new(vec![reply])
        }
    }

    /// Usage reported with every reply.
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// Every conversation the client was called with, in order.
    pub fn conversations(&self) -> Vec<Conversation> {
        self.seen.lock().unwrap().clone()
    }

    fn next_reply(&self) -> Option<Reply> {
        let mut replies = self.replies.lock().unwrap();
        if self.repeat_last && replies.len() == 1 {
            return replies.front().cloned();
        }
        replies.pop_front()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn respond(&self, conversation: Conversation) -> Result<ModelResponse, ModelError> {
        self.seen.lock().unwrap().push(conversation.clone());
        let mut reply = self
            .next_reply()
            .ok_or_else(|| ModelError::Other("script exhausted".into()))?;

        while let Reply::Delayed(delay, inner) = reply {
            tokio::time::sleep(delay).await;
            reply = *inner;
        }

        let response = match reply {
            Reply::Text(text) => {
                ModelResponse::from_assistant(conversation, Message::assistant(text), self.usage)
            }
            Reply::Reasoned { thinking, text } => {
                ModelResponse::from_assistant(conversation, Message::assistant(text), self.usage)
                    .with_thinking(thinking)
            }
            Reply::ToolCalls(calls) => ModelResponse::from_assistant(
                conversation,
                Message::assistant_tool_calls(None, &calls),
                self.usage,
            ),
            Reply::Error(e) => return Err(e),
            Reply::Delayed(..) => return Err(ModelError::Other("unresolved delay".into())),
        };
        Ok(response)
    }
}

/// Returns its `message` argument.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Echoes back the message"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "message": { "type": "string" } },
            "required": ["message"]
        })
    }
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let message = arguments["message"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'message'".into()))?;
        Ok(ToolOutput::text(message))
    }
}

/// Always fails.
pub struct FailTool;

#[async_trait]
impl Tool for FailTool {
    fn name(&self) -> &str {
        "fail"
    }
    fn description(&self) -> &str {
        "Always fails"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }
    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "fail".into(),
            reason: "boom".into(),
        })
    }
}

/// Panics when invoked.
pub struct PanicTool;

#[async_trait]
impl Tool for PanicTool {
    fn name(&self) -> &str {
        "panic"
    }
    fn description(&self) -> &str {
        "Panics"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }
    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        panic!("tool blew up");
    }
}

/// Sleeps, then answers "slow".
pub struct SlowTool {
    delay: Duration,
}

impl SlowTool {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow"
    }
    fn description(&self) -> &str {
        "Sleeps before answering"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }
    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        tokio::time::sleep(self.delay).await;
        Ok(ToolOutput::text("slow"))
    }
}
