//! ModelClient trait: the abstraction over model backends.
//!
//! A client takes the conversation, talks to whatever transport it wraps,
//! and returns the response together with the conversation updated to
//! include the assistant turn.

use async_trait::async_trait;

use crate::budget::TokenUsage;
use crate::error::ModelError;
use crate::message::{Conversation, Message};
use crate::tool::ToolRequest;

/// A complete response from a model client.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    /// Response text (empty if the model produced none)
    pub text: String,

    /// Reasoning text, if the model exposes it
    pub thinking: Option<String>,

    /// Tool calls requested by the model
    pub tool_calls: Vec<ToolRequest>,

    /// Token usage; zero-filled if the backend does not report it
    pub usage: TokenUsage,

    /// The conversation with the assistant turn appended
    pub conversation: Conversation,
}

impl ModelResponse {
    /// Build a response from an assistant message, appending it to
    /// `conversation`.
    pub fn from_assistant(
        mut conversation: Conversation,
        message: Message,
        usage: TokenUsage,
    ) -> Self {
        let text = message.text().to_string();
        let tool_calls = message
            .tool_calls
            .iter()
            .cloned()
            .map(ToolRequest::from)
            .collect();
        conversation.push(message);
        Self {
            text,
            thinking: None,
            tool_calls,
            usage,
            conversation,
        }
    }

    pub fn with_thinking(mut self, thinking: impl Into<String>) -> Self {
        self.thinking = Some(thinking.into());
        self
    }
}

/// The model-client contract.
///
/// The loop never retries; retry policy belongs to the implementation.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// A human-readable name for this client (e.g., "openai", "scripted").
    fn name(&self) -> &str;

    /// Send the conversation and wait for the complete response.
    async fn respond(&self, conversation: Conversation) -> Result<ModelResponse, ModelError>;
}
