//! Retry policy for gateway calls.
//!
//! Failed attempts are retried immediately by default. A linear backoff
//! (`backoff * attempt`) can be configured per stage.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// How many times a call is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first. Never zero.
    max_attempts: usize,
    /// Base delay between attempts.
    backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1)
    }
}

impl RetryPolicy {
    /// Creates a policy with `max_attempts` attempts and no backoff.
    #[must_use]
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Duration::ZERO,
        }
    }

    /// Creates a policy allowing `retries` retries after the first attempt.
    #[must_use]
    pub fn from_retries(retries: u32) -> Self {
        Self::new(retries as usize + 1)
    }

    /// Sets the base backoff delay.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Returns the maximum number of attempts.
    #[must_use]
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Returns the delay before the retry following failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: usize) -> Duration {
        self.backoff
            .saturating_mul(u32::try_from(attempt).unwrap_or(u32::MAX))
    }
}

/// Runs `operation` until it succeeds or the policy is exhausted.
///
/// The closure receives the 1-based attempt number. Returns the final result
/// together with the number of attempts made.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    key: &str,
    mut operation: F,
) -> (Result<T, E>, usize)
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => return (Ok(value), attempt),
            Err(e) if attempt >= policy.max_attempts() => {
                tracing::warn!(
                    key,
                    attempt,
                    max_attempts = policy.max_attempts(),
                    error = %e,
                    "Giving up after final attempt"
                );
                return (Err(e), attempt);
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    key,
                    attempt,
                    max_attempts = policy.max_attempts(),
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Attempt failed, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.delay_after(1), Duration::ZERO);
    }

    #[test]
    fn test_from_retries() {
        assert_eq!(RetryPolicy::from_retries(0).max_attempts(), 1);
        assert_eq!(RetryPolicy::from_retries(3).max_attempts(), 4);
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::new(0).max_attempts(), 1);
    }

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::new(3).with_backoff(Duration::from_millis(100));
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_with_retry_success_first_try() {
        let policy = RetryPolicy::new(3);

        let (result, attempts): (Result<i32, &str>, usize) =
            with_retry(&policy, "test", |_| async { Ok(42) }).await;

        assert_eq!(result, Ok(42));
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_with_retry_success_after_failures() {
        let policy = RetryPolicy::new(5);

        let (result, attempts) = with_retry(&policy, "test", |attempt| async move {
            if attempt < 3 {
                Err(format!("attempt {attempt}"))
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_exactly_max_attempts() {
        let policy = RetryPolicy::from_retries(2);
        let calls = AtomicUsize::new(0);

        let (result, attempts): (Result<(), String>, usize) =
            with_retry(&policy, "test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("always fails".to_string()) }
            })
            .await;

        assert_eq!(result, Err("always fails".to_string()));
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
