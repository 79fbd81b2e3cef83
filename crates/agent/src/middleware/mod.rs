//! Middleware pipeline: interceptors at four fixed points of every turn.
//!
//! A [`MiddlewareStack`] runs its interceptors strictly in registration
//! order. Each stage has its own failure rule:
//!
//! | Stage               | On error                                        |
//! |---------------------|-------------------------------------------------|
//! | `before_request`    | stops the chain, run ends with an explicit stop |
//! | `after_response`    | stops the chain, run ends with an explicit stop |
//! | `before_tool_calls` | stops the chain, error is logged and discarded  |
//! | `on_tool_error`     | that interceptor votes for the default recovery |

pub mod compaction;
pub mod context;
pub mod logging;
pub mod policy;

pub use compaction::PressureCompaction;
pub use context::{RequestContext, ResponseContext, ToolCallContext, ToolDecision};
pub use logging::LoggingMiddleware;
pub use policy::{ErrorPolicy, ToolPolicy};

use async_trait::async_trait;
use operative_core::{MiddlewareError, ToolError};
use std::sync::Arc;
use tracing::warn;

/// How the loop should react to a failed tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolErrorRecovery {
    /// Report this message to the model as the tool's result.
    Feedback(String),
    /// End the whole run.
    Throw,
}

impl ToolErrorRecovery {
    /// The recovery used when no interceptor decides otherwise.
    pub fn default_for(error: &ToolError) -> Self {
        Self::Feedback(error.to_string())
    }
}

/// An interceptor. Every hook is optional.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Mutate the outbound messages or tool definitions.
    async fn before_request(&self, _ctx: &mut RequestContext) -> Result<(), MiddlewareError> {
        Ok(())
    }

    /// Inspect the response and filter or rewrite its tool calls.
    async fn after_response(&self, _ctx: &mut ResponseContext) -> Result<(), MiddlewareError> {
        Ok(())
    }

    /// Decide the fate of a whole batch of tool calls at once.
    async fn before_tool_calls(
        &self,
        _calls: &mut [ToolCallContext],
    ) -> Result<(), MiddlewareError> {
        Ok(())
    }

    /// Vote on how a failed tool call is handled. `None` abstains.
    async fn on_tool_error(
        &self,
        _error: &ToolError,
        _call: &ToolCallContext,
    ) -> Result<Option<ToolErrorRecovery>, MiddlewareError> {
        Ok(None)
    }
}

/// An ordered, immutable list of interceptors.
#[derive(Clone, Default)]
pub struct MiddlewareStack {
    layers: Arc<[Arc<dyn Middleware>]>,
}

impl MiddlewareStack {
    pub fn new(layers: Vec<Arc<dyn Middleware>>) -> Self {
        Self {
            layers: layers.into(),
        }
    }

    /// A new stack with `layer` appended.
    pub fn with(&self, layer: Arc<dyn Middleware>) -> Self {
        let mut layers = self.layers.to_vec();
        layers.push(layer);
        Self::new(layers)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub async fn before_request(&self, ctx: &mut RequestContext) -> Result<(), MiddlewareError> {
        for layer in self.layers.iter() {
            layer.before_request(ctx).await.inspect_err(|e| {
                warn!(middleware = layer.name(), error = %e, "before_request aborted the run");
            })?;
        }
        Ok(())
    }

    pub async fn after_response(&self, ctx: &mut ResponseContext) -> Result<(), MiddlewareError> {
        for layer in self.layers.iter() {
            layer.after_response(ctx).await.inspect_err(|e| {
                warn!(middleware = layer.name(), error = %e, "after_response aborted the run");
            })?;
        }
        Ok(())
    }

    /// Best effort: the first failure ends the chain and is discarded.
    pub async fn before_tool_calls(&self, calls: &mut [ToolCallContext]) {
        for layer in self.layers.iter() {
            if let Err(e) = layer.before_tool_calls(calls).await {
                warn!(
                    middleware = layer.name(),
                    error = %e,
                    "before_tool_calls failed; error discarded"
                );
                return;
            }
        }
    }

    /// Resolve a recovery. The last interceptor to vote wins.
    pub async fn on_tool_error(&self, error: &ToolError, call: &ToolCallContext) -> ToolErrorRecovery {
        let mut recovery = ToolErrorRecovery::default_for(error);
        for layer in self.layers.iter() {
            match layer.on_tool_error(error, call).await {
                Ok(Some(vote)) => recovery = vote,
                Ok(None) => {}
                Err(e) => {
                    warn!(middleware = layer.name(), error = %e, "on_tool_error failed");
                    recovery = ToolErrorRecovery::default_for(error);
                }
            }
        }
        recovery
    }
}

impl std::fmt::Debug for MiddlewareStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.layers.iter().map(|l| l.name()))
            .finish()
    }
}

impl FromIterator<Arc<dyn Middleware>> for MiddlewareStack {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Middleware>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
