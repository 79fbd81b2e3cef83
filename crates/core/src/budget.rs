//! Resource ledger: configured limits, running usage, and derived pressure.
//!
//! Everything here is pure computation. The loop asks [`Budget::should_stop`]
//! at the top of each turn and recomputes [`Budget::pressure`] after each
//! model response.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};
use std::time::Duration;

/// Token usage statistics for one response or a running total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    /// The additive identity.
    pub const ZERO: Self = Self {
        prompt_tokens: 0,
        completion_tokens: 0,
        total_tokens: 0,
    };

    pub fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }

    /// Usage whose total is the sum of prompt and completion.
    pub fn from_counts(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self::new(
            prompt_tokens,
            completion_tokens,
            prompt_tokens.saturating_add(completion_tokens),
        )
    }
}

impl Add for TokenUsage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            prompt_tokens: self.prompt_tokens.saturating_add(rhs.prompt_tokens),
            completion_tokens: self.completion_tokens.saturating_add(rhs.completion_tokens),
            total_tokens: self.total_tokens.saturating_add(rhs.total_tokens),
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for TokenUsage {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

/// Why a run stopped without completing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "message", rename_all = "snake_case")]
pub enum StopReason {
    /// The turn counter passed `max_turns`.
    TurnLimitReached,
    /// Cumulative usage reached `max_tokens`.
    TokenBudgetExhausted,
    /// The wall-clock budget ran out.
    Timeout,
    /// A tool, a middleware, or a model failure asked the run to end.
    ExplicitStop(String),
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TurnLimitReached => write!(f, "turn limit reached"),
            Self::TokenBudgetExhausted => write!(f, "token budget exhausted"),
            Self::Timeout => write!(f, "timeout"),
            Self::ExplicitStop(reason) => write!(f, "stopped: {reason}"),
        }
    }
}

/// The resource a pressure signal refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureDimension {
    /// Prompt size of the last response against the model's context window.
    ContextWindow,
    /// Cumulative usage against `max_tokens`.
    TokenBudget,
}

/// Advisory signal that a dimension is approaching its limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureInfo {
    pub dimension: PressureDimension,
    /// `current / limit`; may exceed 1.0.
    pub utilization: f64,
    pub current: u64,
    pub limit: u64,
}

impl PressureInfo {
    fn measure(dimension: PressureDimension, current: u64, limit: u64) -> Self {
        // A zero limit is saturated by definition.
        let utilization = if limit == 0 {
            f64::INFINITY
        } else {
            current as f64 / limit as f64
        };
        Self {
            dimension,
            utilization,
            current,
            limit,
        }
    }
}

fn default_pressure_threshold() -> f64 {
    0.8
}

/// Negative thresholds clamp to zero; NaN falls back to the default.
fn sanitize_threshold(threshold: f64) -> f64 {
    if threshold.is_nan() {
        default_pressure_threshold()
    } else {
        threshold.max(0.0)
    }
}

/// Resource limits for one run. `None` leaves a dimension unconstrained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens_per_turn: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window_tokens: Option<u64>,

    /// Utilization at which pressure is signalled. Values above 1.0 delay it.
    /// Negative values act as 0.0 and NaN as the default.
    #[serde(default = "default_pressure_threshold")]
    pub pressure_threshold: f64,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_turns: None,
            max_tokens: None,
            max_tokens_per_turn: None,
            timeout: None,
            context_window_tokens: None,
            pressure_threshold: default_pressure_threshold(),
        }
    }
}

impl Budget {
    /// A budget with no limits.
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_turns(mut self, turns: u32) -> Self {
        self.max_turns = Some(turns);
        self
    }

    pub fn with_max_tokens(mut self, tokens: u64) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    pub fn with_max_tokens_per_turn(mut self, tokens: u64) -> Self {
        self.max_tokens_per_turn = Some(tokens);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_context_window(mut self, tokens: u64) -> Self {
        self.context_window_tokens = Some(tokens);
        self
    }

    pub fn with_pressure_threshold(mut self, threshold: f64) -> Self {
        self.pressure_threshold = sanitize_threshold(threshold);
        self
    }

    /// Decide whether the run must stop before starting `turn`.
    ///
    /// Checks run in a fixed order: turns, then tokens, then time. The first
    /// exhausted dimension wins.
    pub fn should_stop(
        &self,
        turn: u32,
        cumulative: &TokenUsage,
        elapsed: Duration,
    ) -> Option<StopReason> {
        if self.max_turns.is_some_and(|max| turn > max) {
            return Some(StopReason::TurnLimitReached);
        }
        if self
            .max_tokens
            .is_some_and(|max| cumulative.total_tokens >= max)
        {
            return Some(StopReason::TokenBudgetExhausted);
        }
        if self.timeout.is_some_and(|limit| elapsed >= limit) {
            return Some(StopReason::Timeout);
        }
        None
    }

    /// Snapshot of what is left when `turn` starts. Informational only.
    pub fn remaining(&self, turn: u32, used: &TokenUsage, elapsed: Duration) -> Budget {
        Budget {
            max_turns: self
                .max_turns
                .map(|max| max.saturating_sub(turn).saturating_add(1)),
            max_tokens: self
                .max_tokens
                .map(|max| max.saturating_sub(used.total_tokens)),
            max_tokens_per_turn: self.max_tokens_per_turn,
            timeout: self.timeout.map(|limit| limit.saturating_sub(elapsed)),
            context_window_tokens: self.context_window_tokens,
            pressure_threshold: self.pressure_threshold,
        }
    }

    /// Time left before the wall-clock budget is exhausted, if one is set.
    pub fn time_left(&self, elapsed: Duration) -> Option<Duration> {
        self.timeout.map(|limit| limit.saturating_sub(elapsed))
    }

    /// Compute pressure signals. Zero, one, or two entries may result.
    pub fn pressure(&self, last_response: &TokenUsage, cumulative: &TokenUsage) -> Vec<PressureInfo> {
        let mut signals = Vec::new();
        let threshold = sanitize_threshold(self.pressure_threshold);

        if let Some(limit) = self.max_tokens {
            let info =
                PressureInfo::measure(PressureDimension::TokenBudget, cumulative.total_tokens, limit);
            if info.utilization >= threshold {
                signals.push(info);
            }
        }

        if let Some(limit) = self.context_window_tokens {
            let info = PressureInfo::measure(
                PressureDimension::ContextWindow,
                last_response.prompt_tokens,
                limit,
            );
            if info.utilization >= threshold {
                signals.push(info);
            }
        }

        signals
    }
}
