//! Timeout budgets for outbound calls.
//!
//! A timeout cancels only the outbound future; partial mutations already
//! committed before the call are not rolled back.

use std::future::Future;
use std::time::Duration;

use loci_core::config::TimeoutConfig;

use crate::error::TimeoutError;

/// AI generation calls (plan decomposition, classification).
pub const AI_CALL_BUDGET: Duration = Duration::from_secs(30);
/// Integration calls (calendar, Notion, Slack, notification delivery).
pub const INTEGRATION_BUDGET: Duration = Duration::from_secs(15);
/// Storage queries.
pub const STORAGE_QUERY_BUDGET: Duration = Duration::from_secs(10);
/// Inbound webhook processing.
pub const WEBHOOK_BUDGET: Duration = Duration::from_secs(5);

/// Race `fut` against the timer.
///
/// On expiry the future is dropped and a `TimeoutError` is returned,
/// never the underlying call's own error type.
pub async fn with_timeout<T, F>(budget: Duration, fut: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(value) => Ok(value),
        Err(_) => Err(TimeoutError {
            budget_ms: budget.as_millis() as u64,
        }),
    }
}

/// Budget lookup from configuration, falling back to the preset constants.
#[derive(Debug, Clone)]
pub struct Budgets {
    pub ai_call: Duration,
    pub integration: Duration,
    pub storage_query: Duration,
    pub webhook: Duration,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            ai_call: AI_CALL_BUDGET,
            integration: INTEGRATION_BUDGET,
            storage_query: STORAGE_QUERY_BUDGET,
            webhook: WEBHOOK_BUDGET,
        }
    }
}

impl From<&TimeoutConfig> for Budgets {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            ai_call: Duration::from_secs(config.ai_call_secs),
            integration: Duration::from_secs(config.integration_secs),
            storage_query: Duration::from_secs(config.storage_query_secs),
            webhook: Duration::from_secs(config.webhook_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OutboundError;

    #[tokio::test]
    async fn test_fast_call_completes() {
        let result = with_timeout(Duration::from_secs(1), async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out() {
        let result = with_timeout(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            42
        })
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.budget_ms, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_error_is_distinct_from_inner_error() {
        // The inner call would fail with its own error; the budget expires
        // first and the caller must see TimeoutError, not OutboundError.
        let result: Result<Result<(), OutboundError>, TimeoutError> =
            with_timeout(Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Err(OutboundError::Other("inner failure".to_string()))
            })
            .await;
        assert!(matches!(result, Err(TimeoutError { budget_ms: 10 })));
    }

    #[tokio::test]
    async fn test_inner_error_passes_through_within_budget() {
        let result: Result<Result<(), OutboundError>, TimeoutError> =
            with_timeout(Duration::from_secs(1), async {
                Err(OutboundError::Other("inner failure".to_string()))
            })
            .await;
        // Budget not exceeded: the inner result comes back intact.
        assert!(matches!(result, Ok(Err(OutboundError::Other(_)))));
    }

    #[test]
    fn test_preset_budgets() {
        assert_eq!(AI_CALL_BUDGET, Duration::from_secs(30));
        assert_eq!(INTEGRATION_BUDGET, Duration::from_secs(15));
        assert_eq!(STORAGE_QUERY_BUDGET, Duration::from_secs(10));
        assert_eq!(WEBHOOK_BUDGET, Duration::from_secs(5));
    }

    #[test]
    fn test_budgets_from_config() {
        let config = TimeoutConfig {
            ai_call_secs: 60,
            integration_secs: 20,
            storage_query_secs: 5,
            webhook_secs: 2,
        };
        let budgets = Budgets::from(&config);
        assert_eq!(budgets.ai_call, Duration::from_secs(60));
        assert_eq!(budgets.integration, Duration::from_secs(20));
        assert_eq!(budgets.storage_query, Duration::from_secs(5));
        assert_eq!(budgets.webhook, Duration::from_secs(2));
    }
}
