//! # Operative Core
//!
//! Domain types, contracts, and error definitions for the Operative agent
//! loop runtime. This crate holds no loop logic: it defines the data the loop
//! moves around and the traits its collaborators implement.
//!
//! ## Contents
//!
//! - [`Budget`], [`TokenUsage`], [`PressureInfo`]: the resource ledger
//! - [`Conversation`] and [`Message`]: the caller-owned history
//! - [`ModelClient`]: the model transport contract
//! - [`Tool`], [`ToolRegistry`], [`ToolBridge`]: capabilities and their dispatch table

pub mod bridge;
pub mod budget;
pub mod error;
pub mod message;
pub mod model;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use bridge::ToolBridge;
pub use budget::{Budget, PressureDimension, PressureInfo, StopReason, TokenUsage};
pub use error::{BoxError, MiddlewareError, ModelError, ToolError};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use model::{ModelClient, ModelResponse};
pub use tool::{Tool, ToolDefinition, ToolOutput, ToolRegistry, ToolRequest};
