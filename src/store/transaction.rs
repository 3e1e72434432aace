// Optimistic read-modify-write with bounded re-execution on store conflicts.
// Only conflicts are retried; every other failure is surfaced on first sight.

use std::future::Future;
use std::time::Duration;

use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

use crate::config::CoordinatorConfig;
use crate::errors::CoordinatorError;
use crate::observability::membership_metrics;

#[derive(Debug, Clone)]
pub struct TransactionPolicy {
    /// Re-executions allowed after the first attempt.
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for TransactionPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
            jitter: true,
        }
    }
}

impl From<&CoordinatorConfig> for TransactionPolicy {
    fn from(config: &CoordinatorConfig) -> Self {
        Self {
            max_retries: config.max_store_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            jitter: true,
        }
    }
}

impl TransactionPolicy {
    fn delays(&self) -> Vec<Duration> {
        let backoff = ExponentialBackoff::from_millis(self.base_delay.as_millis().max(1) as u64)
            .max_delay(self.max_delay)
            .take(self.max_retries);
        if self.jitter {
            backoff.map(jitter).collect()
        } else {
            backoff.collect()
        }
    }
}

/// Run `attempt` until it commits, re-executing it from scratch whenever it
/// reports a store conflict, up to `policy.max_retries` times.
pub async fn run_in_transaction<T, F, Fut>(
    policy: &TransactionPolicy,
    operation: &str,
    mut attempt: F,
) -> Result<T, CoordinatorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoordinatorError>>,
{
    let mut attempts = 0usize;
    let result = RetryIf::start(
        policy.delays(),
        || {
            attempts += 1;
            debug!(operation, attempt = attempts, "Starting transaction attempt");
            attempt()
        },
        |err: &CoordinatorError| {
            if err.is_store_conflict() {
                membership_metrics().record_store_conflict();
                warn!(operation, error = %err, "Store conflict, re-running transaction");
                true
            } else {
                false
            }
        },
    )
    .await;

    if let Err(err) = &result {
        if err.is_store_conflict() {
            warn!(operation, retries = policy.max_retries, "Transaction retries exhausted");
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(max_retries: usize) -> TransactionPolicy {
        TransactionPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: false,
        }
    }

    #[tokio::test]
    async fn test_conflicts_are_retried_until_commit() {
        let calls = &AtomicUsize::new(0);
        let result = run_in_transaction(&fast_policy(3), "test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(CoordinatorError::StoreConflict("Item 1".into()))
            } else {
                Ok("committed")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "committed");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let calls = &AtomicUsize::new(0);
        let result: Result<(), _> = run_in_transaction(&fast_policy(2), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CoordinatorError::StoreConflict("Item 1".into()))
        })
        .await;

        assert!(result.unwrap_err().is_store_conflict());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = &AtomicUsize::new(0);
        let result: Result<(), _> = run_in_transaction(&fast_policy(5), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CoordinatorError::ProviderUnavailable("timeout".into()))
        })
        .await;

        assert!(matches!(result, Err(CoordinatorError::ProviderUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
