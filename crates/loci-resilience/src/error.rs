//! Outbound error classification and the timeout error type.

use thiserror::Error;

/// Classification seam consumed by the retry wrapper.
///
/// Implemented by any error type whose failures can be split into
/// transient (worth retrying) and permanent.
pub trait Retryable {
    /// Whether the failure is transient and the call may be retried.
    fn is_retryable(&self) -> bool;

    /// Whether the failure was an explicit rate-limit signal. Rate-limited
    /// calls back off with a longer, multiplier-scaled floor.
    fn is_rate_limited(&self) -> bool {
        false
    }
}

/// Error vocabulary for calls that leave the process.
///
/// Retryable: connection resets, timeouts, HTTP 5xx, and HTTP 429.
/// Everything else propagates immediately without delay.
#[derive(Debug, Clone, Error)]
pub enum OutboundError {
    #[error("Connection reset: {0}")]
    ConnectionReset(String),

    #[error("Call timed out: {0}")]
    TimedOut(String),

    #[error("HTTP status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("{0}")]
    Other(String),
}

impl Retryable for OutboundError {
    fn is_retryable(&self) -> bool {
        match self {
            OutboundError::ConnectionReset(_) | OutboundError::TimedOut(_) => true,
            OutboundError::Status { code, .. } => *code == 429 || (500..600).contains(code),
            OutboundError::Other(_) => false,
        }
    }

    fn is_rate_limited(&self) -> bool {
        matches!(self, OutboundError::Status { code: 429, .. })
    }
}

/// Raised when a call exceeds its timeout budget.
///
/// Deliberately a distinct type from the underlying call's error so that
/// callers can tell budget expiry apart from call failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Call exceeded its {budget_ms} ms timeout budget")]
pub struct TimeoutError {
    pub budget_ms: u64,
}

impl From<TimeoutError> for OutboundError {
    fn from(err: TimeoutError) -> Self {
        OutboundError::TimedOut(err.to_string())
    }
}
