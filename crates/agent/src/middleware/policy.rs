//! Name-based tool policies.
//!
//! [`ToolPolicy`] gates which tools may run at all; [`ErrorPolicy`] decides
//! which tool failures are fatal to the run.

use async_trait::async_trait;
use operative_config::ToolsConfig;
use operative_core::{MiddlewareError, ToolError};

use super::{Middleware, ToolCallContext, ToolErrorRecovery};

fn listed(list: &[String], name: &str) -> bool {
    list.iter().any(|entry| entry == "*" || entry == name)
}

/// Allow/deny lists by tool name.
///
/// Rules:
/// - A name on the deny list (or `"*"`) is rejected
/// - If the allow list is empty, everything else is allowed
/// - Otherwise the name must be on the allow list (or it contains `"*"`)
#[derive(Debug, Clone, Default)]
pub struct ToolPolicy {
    allow: Vec<String>,
    deny: Vec<String>,
}

impl ToolPolicy {
    pub fn new(allow: Vec<String>, deny: Vec<String>) -> Self {
        Self { allow, deny }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(config.allow.clone(), config.deny.clone())
    }

    /// Why `name` is blocked, if it is.
    pub fn check(&self, name: &str) -> Option<String> {
        if listed(&self.deny, name) {
            return Some(format!("tool '{name}' is on the deny list"));
        }
        if !self.allow.is_empty() && !listed(&self.allow, name) {
            return Some(format!("tool '{name}' is not on the allow list"));
        }
        None
    }
}

#[async_trait]
impl Middleware for ToolPolicy {
    fn name(&self) -> &str {
        "tool_policy"
    }

    async fn before_tool_calls(&self, calls: &mut [ToolCallContext]) -> Result<(), MiddlewareError> {
        for call in calls.iter_mut() {
            if let Some(reason) = self.check(call.name()) {
                call.reject(reason);
            }
        }
        Ok(())
    }
}

/// Ends the run when a tool marked fatal fails. Abstains otherwise.
#[derive(Debug, Clone, Default)]
pub struct ErrorPolicy {
    fatal: Vec<String>,
}

impl ErrorPolicy {
    pub fn new(fatal: Vec<String>) -> Self {
        Self { fatal }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(config.fatal.clone())
    }
}

#[async_trait]
impl Middleware for ErrorPolicy {
    fn name(&self) -> &str {
        "error_policy"
    }

    async fn on_tool_error(
        &self,
        _error: &ToolError,
        call: &ToolCallContext,
    ) -> Result<Option<ToolErrorRecovery>, MiddlewareError> {
        Ok(listed(&self.fatal, call.name()).then_some(ToolErrorRecovery::Throw))
    }
}
