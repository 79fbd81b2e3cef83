//! Tool-protocol bridge: remote tool servers exposed as local tools.
//!
//! A bridge owns its connection lifecycle. Once connected it discovers the
//! remotely hosted capabilities and hands each back as a [`Tool`], translating
//! arguments and results to and from the generic JSON form itself.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::error::ToolError;
use crate::tool::{Tool, ToolRegistry};

#[async_trait]
pub trait ToolBridge: Send + Sync {
    /// The remote endpoint this bridge talks to.
    fn endpoint(&self) -> &str;

    /// Open the connection. Calling it on a connected bridge is a no-op.
    async fn connect(&self) -> Result<(), ToolError>;

    /// List the capabilities the remote side offers.
    async fn discover(&self) -> Result<Vec<Arc<dyn Tool>>, ToolError>;

    /// Close the connection. Must be idempotent.
    async fn disconnect(&self) -> Result<(), ToolError>;
}

impl ToolRegistry {
    /// Connect `bridge`, discover its tools, and register every one of them.
    ///
    /// Returns how many tools were registered.
    pub async fn register_bridge(&mut self, bridge: &dyn ToolBridge) -> Result<usize, ToolError> {
        bridge.connect().await?;
        let tools = bridge.discover().await?;
        let count = tools.len();
        for tool in tools {
            self.register(tool);
        }
        info!(endpoint = %bridge.endpoint(), tools = count, "Registered bridged tools");
        Ok(count)
    }
}
