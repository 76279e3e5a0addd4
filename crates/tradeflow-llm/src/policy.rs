//! Call policy: per-call timeout plus retry with exponential backoff
//!
//! Every generation a worker makes goes through a [`CallPolicy`]. Each
//! attempt is bounded by the policy timeout; transient failures
//! ([`GenerationError::is_retryable`]) are retried with exponential backoff
//! until the attempt budget is spent. With a [`RateLimit`] attached, each
//! attempt first waits for request budget; that wait is not part of the
//! attempt's timeout.

use crate::throttle::RateLimit;
use crate::{GenerationError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Outcome of a policy-governed call
#[derive(Debug)]
pub struct Attempted<T> {
    /// Final result after all attempts
    pub result: Result<T>,

    /// Number of attempts made (at least 1)
    pub attempts: u32,
}

impl<T> Attempted<T> {
    /// Attempts beyond the first
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Timeout and retry configuration for generation calls
#[derive(Debug, Clone)]
pub struct CallPolicy {
    /// Maximum number of attempts (1 means no retry)
    pub max_attempts: u32,

    /// Backoff before the first retry
    pub initial_backoff: Duration,

    /// Upper bound for a single backoff
    pub max_backoff: Duration,

    /// Backoff multiplier between retries
    pub backoff_multiplier: f64,

    /// Timeout applied to each attempt
    pub call_timeout: Duration,

    /// Request budget awaited before each attempt
    pub rate_limit: Option<RateLimit>,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            call_timeout: Duration::from_secs(120),
            rate_limit: None,
        }
    }
}

impl CallPolicy {
    /// Create a policy from a retry count, backoff base and per-call timeout
    pub fn new(max_retries: u32, backoff_base: Duration, call_timeout: Duration) -> Self {
        Self {
            max_attempts: max_retries.saturating_add(1),
            initial_backoff: backoff_base,
            call_timeout,
            ..Self::default()
        }
    }

    /// Create a policy with no retries
    pub fn no_retry(call_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
            call_timeout,
            rate_limit: None,
        }
    }

    /// Create a policy with fast retries (for testing)
    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            call_timeout: Duration::from_secs(5),
            rate_limit: None,
        }
    }

    /// Share a request budget across every call made under this policy
    pub fn with_rate_limit(mut self, rate_limit: Option<RateLimit>) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Backoff before retry number `retry` (1-based)
    fn backoff_duration(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let scaled = self
            .initial_backoff
            .mul_f64(self.backoff_multiplier.powi(exponent).min(1e6));

        scaled.min(self.max_backoff)
    }

    /// Execute an async operation under the policy
    ///
    /// The operation is invoked once per attempt. An attempt that outlives
    /// `call_timeout` is abandoned and counts as a
    /// [`GenerationError::Timeout`].
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(
                operation = operation_name,
                attempt = attempts,
                max_attempts,
                "Starting attempt"
            );

            if let Some(limit) = &self.rate_limit {
                limit.until_ready().await;
            }

            let error = match timeout(self.call_timeout, operation()).await {
                Ok(Ok(value)) => {
                    if attempts > 1 {
                        debug!(
                            operation = operation_name,
                            retries = attempts - 1,
                            "Operation succeeded after retry"
                        );
                    }
                    return Attempted {
                        result: Ok(value),
                        attempts,
                    };
                }
                Ok(Err(e)) => e,
                Err(_) => GenerationError::Timeout(self.call_timeout),
            };

            if !error.is_retryable() || attempts >= max_attempts {
                warn!(
                    operation = operation_name,
                    attempts,
                    error = %error,
                    "Operation failed"
                );
                return Attempted {
                    result: Err(error),
                    attempts,
                };
            }

            let backoff = self.backoff_duration(attempts);
            warn!(
                operation = operation_name,
                attempt = attempts,
                max_attempts,
                error = %error,
                ?backoff,
                "Attempt failed, retrying"
            );
            sleep(backoff).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor::Quota;
    use std::num::NonZeroU32;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_new_policy_counts_first_attempt() {
        let policy = CallPolicy::new(3, Duration::from_secs(1), Duration::from_secs(120));
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.call_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_backoff_calculation() {
        let policy = CallPolicy::new(5, Duration::from_millis(100), Duration::from_secs(1));

        assert_eq!(policy.backoff_duration(0), Duration::ZERO);
        assert_eq!(policy.backoff_duration(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_duration(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_duration(3), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_capped_at_max() {
        let policy = CallPolicy::fast();
        assert_eq!(policy.backoff_duration(20), policy.max_backoff);
    }

    #[tokio::test]
    async fn test_execute_success_first_try() {
        let policy = CallPolicy::fast();
        let outcome = policy.execute("op", || async { Ok(7) }).await;

        assert_eq!(outcome.result, Ok(7));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.retries(), 0);
    }

    #[tokio::test]
    async fn test_execute_retries_transient_failures() {
        let policy = CallPolicy::fast();
        let counter = Arc::new(AtomicU32::new(0));

        let outcome = policy
            .execute("op", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(GenerationError::RequestFailed("reset".into()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(outcome.result, Ok("done"));
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn test_execute_stops_on_permanent_failure() {
        let policy = CallPolicy::fast();
        let counter = Arc::new(AtomicU32::new(0));

        let outcome: Attempted<()> = policy
            .execute("op", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(GenerationError::AuthenticationFailed)
                }
            })
            .await;

        assert_eq!(outcome.result, Err(GenerationError::AuthenticationFailed));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_times_out_each_attempt() {
        let policy = CallPolicy {
            call_timeout: Duration::from_millis(20),
            ..CallPolicy::fast()
        };

        let outcome: Attempted<()> = policy
            .execute("op", || async {
                sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;

        assert_eq!(
            outcome.result,
            Err(GenerationError::Timeout(Duration::from_millis(20)))
        );
        assert_eq!(outcome.attempts, policy.max_attempts);
    }

    #[tokio::test]
    async fn test_rate_limit_wait_is_outside_the_call_timeout() {
        let policy = CallPolicy {
            call_timeout: Duration::from_millis(100),
            ..CallPolicy::fast()
        }
        .with_rate_limit(Some(RateLimit::new(Quota::per_second(
            NonZeroU32::new(1).unwrap(),
        ))));
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let outcome = policy
                .execute("op", || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
                .await;

            assert_eq!(outcome.result, Ok(()));
            assert_eq!(outcome.attempts, 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
