//! Error types for the Operative domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context (model client, tools, middleware) has its own enum.

use thiserror::Error;

/// Boxed, type-erased error used where the origin type is unbounded.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures reported by a [`ModelClient`](crate::model::ModelClient).
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("{0}")]
    Other(String),
}

/// The cause of a failed tool invocation.
///
/// Tools may fail with anything; `Other` carries the arbitrary cause.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool bridge error: {0}")]
    Bridge(String),

    #[error("{0}")]
    Other(#[from] BoxError),
}

impl ToolError {
    /// Wrap any error as a tool failure cause.
    pub fn other<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(Box::new(error))
    }
}

/// Raised by a middleware hook to abort its stage.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct MiddlewareError {
    pub message: String,
}

impl MiddlewareError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for MiddlewareError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for MiddlewareError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
