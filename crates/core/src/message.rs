//! Message and Conversation domain types.
//!
//! The conversation is owned by the caller: the loop appends to it, reads its
//! tail, and hands it back in the final result so a later run can continue it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool::{ToolDefinition, ToolRequest};

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// The end user
    User,
    /// The model
    Assistant,
    /// Tool execution result
    Tool,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, Some(content.into()))
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, Some(content.into()))
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, Some(content.into()))
    }

    /// Create an assistant message carrying a batch of tool calls.
    pub fn assistant_tool_calls(content: Option<String>, requests: &[ToolRequest]) -> Self {
        let mut msg = Self::with_role(Role::Assistant, content.filter(|c| !c.is_empty()));
        msg.tool_calls = requests.iter().map(MessageToolCall::from).collect();
        msg
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role(Role::Tool, Some(content.into()));
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// The text content, or an empty string.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as JSON string
    pub arguments: String,
}

impl From<&ToolRequest> for MessageToolCall {
    fn from(request: &ToolRequest) -> Self {
        Self {
            id: request.tool_call_id.clone(),
            name: request.name.clone(),
            arguments: request.arguments.clone(),
        }
    }
}

impl From<MessageToolCall> for ToolRequest {
    fn from(call: MessageToolCall) -> Self {
        ToolRequest {
            name: call.name,
            arguments: call.arguments,
            tool_call_id: call.id,
        }
    }
}

/// An ordered message history plus the configuration sent with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Ordered messages
    pub messages: Vec<Message>,

    /// Tool schemas offered to the model on the next call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Cap on tokens the model may generate per response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            messages: Vec::new(),
            tools: Vec::new(),
            max_output_tokens: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// The most recent message, if any.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Whether the conversation opens with a system message.
    pub fn has_system_prompt(&self) -> bool {
        self.messages
            .first()
            .is_some_and(|m| m.role == Role::System)
    }

    /// Whether the tail already records an assistant turn requesting exactly
    /// these tool calls.
    pub fn ends_with_tool_calls(&self, requests: &[ToolRequest]) -> bool {
        let Some(last) = self.last() else {
            return false;
        };
        last.role == Role::Assistant
            && !last.tool_calls.is_empty()
            && requests
                .iter()
                .all(|r| last.tool_calls.iter().any(|c| c.id == r.tool_call_id))
    }

    /// Every tool message answers a tool call recorded by an earlier
    /// assistant message.
    pub fn tool_results_are_paired(&self) -> bool {
        let mut seen: Vec<&str> = Vec::new();
        for msg in &self.messages {
            match msg.role {
                Role::Assistant => seen.extend(msg.tool_calls.iter().map(|c| c.id.as_str())),
                Role::Tool => match msg.tool_call_id.as_deref() {
                    Some(id) if seen.contains(&id) => {}
                    _ => return false,
                },
                _ => {}
            }
        }
        true
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
