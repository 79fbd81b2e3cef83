use operative_core::StopReason;
use thiserror::Error;

/// What a caller sees when collapsing an operation stream to one result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperativeError {
    #[error("run stopped: {0}")]
    Stopped(StopReason),

    #[error("operation stream ended without a terminal event")]
    Incomplete,
}

impl OperativeError {
    /// The stop reason, if the run was stopped.
    pub fn stop_reason(&self) -> Option<&StopReason> {
        match self {
            Self::Stopped(reason) => Some(reason),
            Self::Incomplete => None,
        }
    }
}
