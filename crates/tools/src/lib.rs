//! Built-in tool implementations for Operative.
//!
//! These are small, self-contained capabilities that are safe to run
//! concurrently: arithmetic, the current time, and a cooperative stop.

pub mod calculator;
pub mod clock;
pub mod finish;

pub use calculator::CalculatorTool;
pub use clock::ClockTool;
pub use finish::FinishTool;

use operative_core::tool::ToolRegistry;

/// Create a registry with every built-in tool.
pub fn default_registry() -> ToolRegistry {
    ToolRegistry::new()
        .with(CalculatorTool)
        .with(ClockTool)
        .with(FinishTool)
}
