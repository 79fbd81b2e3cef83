//! History compaction driven by context-window pressure.

use async_trait::async_trait;
use operative_core::{Message, MiddlewareError, PressureDimension, Role};
use std::ops::Range;
use tracing::info;

use super::{Middleware, RequestContext};
use crate::token::{estimate_message_tokens, estimate_tool_tokens};

/// Drops the oldest history when the last prompt crowded the context window.
///
/// Acts only when the request carries a context-window pressure entry.
/// System messages and the latest user message are never dropped, and an
/// assistant tool-call message always leaves together with its results.
#[derive(Debug, Clone)]
pub struct PressureCompaction {
    target: f64,
}

impl PressureCompaction {
    /// Compact until the estimate falls below `target` of the window.
    pub fn new(target: f64) -> Self {
        Self { target }
    }
}

impl Default for PressureCompaction {
    fn default() -> Self {
        Self::new(0.8)
    }
}

#[async_trait]
impl Middleware for PressureCompaction {
    fn name(&self) -> &str {
        "pressure_compaction"
    }

    async fn before_request(&self, ctx: &mut RequestContext) -> Result<(), MiddlewareError> {
        if !ctx.under_pressure() {
            return Ok(());
        }
        let Some(window) = ctx
            .pressure
            .iter()
            .find(|p| p.dimension == PressureDimension::ContextWindow)
        else {
            return Ok(());
        };

        let budget = window.limit as f64 * self.target;
        let tools: usize = ctx.tool_definitions.iter().map(estimate_tool_tokens).sum();
        let mut estimate = tools + ctx.messages.iter().map(estimate_message_tokens).sum::<usize>();
        let before = ctx.messages.len();

        let keep_user = ctx.messages.iter().rposition(|m| m.role == Role::User);
        let mut dropped = vec![false; ctx.messages.len()];
        for unit in droppable_units(&ctx.messages) {
            if (estimate as f64) < budget {
                break;
            }
            if keep_user.is_some_and(|i| unit.contains(&i)) {
                continue;
            }
            for i in unit {
                estimate = estimate.saturating_sub(estimate_message_tokens(&ctx.messages[i]));
                dropped[i] = true;
            }
        }

        let mut index = 0;
        ctx.messages.retain(|_| {
            let keep = !dropped[index];
            index += 1;
            keep
        });

        if ctx.messages.len() < before {
            info!(
                turn = ctx.turn,
                dropped = before - ctx.messages.len(),
                estimated_tokens = estimate,
                limit = window.limit,
                "Compacted history under context-window pressure"
            );
        }
        Ok(())
    }
}

/// Non-system history split into units that must be dropped whole, oldest first.
fn droppable_units(messages: &[Message]) -> Vec<Range<usize>> {
    let mut units = Vec::new();
    let mut i = 0;
    while i < messages.len() {
        let msg = &messages[i];
        let mut end = i + 1;
        if msg.role == Role::Assistant && !msg.tool_calls.is_empty() {
            while end < messages.len() && messages[end].role == Role::Tool {
                end += 1;
            }
        }
        if msg.role != Role::System {
            units.push(i..end);
        }
        i = end;
    }
    units
}
