//! Failure taxonomy surfaced to callers.

use thiserror::Error;

/// Prefix carried by every 5xx message.
pub const UNAVAILABLE_PREFIX: &str = "Service unavailable: ";

/// Classified failure of a dispatched request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Malformed input. Never reaches a breaker.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rejected by an open circuit without a backend roundtrip.
    #[error("Service unavailable: circuit open for '{service}'")]
    CircuitOpen { service: String },

    /// The backend did not answer within the breaker timeout.
    #[error("Service unavailable: '{service}' timed out after {timeout_ms}ms")]
    Timeout { service: String, timeout_ms: u64 },

    /// The backend answered with a failure, or could not be reached.
    #[error("Service unavailable: {message}")]
    Backend { service: String, message: String },
}

pub type DispatchResult<T> = Result<T, DispatchError>;

impl DispatchError {
    /// HTTP status this failure maps to.
    pub fn status(&self) -> u16 {
        match self {
            DispatchError::BadRequest(_) => 400,
            DispatchError::CircuitOpen { .. } | DispatchError::Backend { .. } => 503,
            DispatchError::Timeout { .. } => 504,
        }
    }

    /// True for failures the breaker accounted as backend failures.
    pub fn is_counted(&self) -> bool {
        matches!(
            self,
            DispatchError::Timeout { .. } | DispatchError::Backend { .. }
        )
    }
}
