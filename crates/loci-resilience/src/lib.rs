//! Resilience primitives for outbound calls.
//!
//! Every call that leaves the process (AI planning, notification delivery,
//! integration sync) goes through the retry and timeout wrappers defined
//! here. Retries block the calling request for the cumulative backoff
//! duration; there is no background retry queue.

pub mod error;
pub mod retry;
pub mod timeout;

pub use error::{OutboundError, Retryable, TimeoutError};
pub use retry::{retry, RetryPolicy};
pub use timeout::{
    with_timeout, Budgets, AI_CALL_BUDGET, INTEGRATION_BUDGET, STORAGE_QUERY_BUDGET,
    WEBHOOK_BUDGET,
};
