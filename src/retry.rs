//! Bounded retry policy shared by the change-set poller and the event reader.
//!
//! Both loops have the same shape: run an operation, and if it fails with an
//! error the caller considers retryable, sleep and try again until the attempt
//! budget is spent. Only the predicate differs between call sites.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, StackDeployError};

/// How long to sleep between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// The same delay after every attempt.
    Fixed(Duration),
    /// `base * 2^(attempt - 1)`, capped at `max`.
    Exponential {
        /// Delay after the first failed attempt.
        base: Duration,
        /// Upper bound on any single delay.
        max: Duration,
    },
}

/// Maximum attempts plus backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay schedule between attempts.
    pub backoff: Backoff,
}

impl Backoff {
    /// Returns the delay to apply after the given failed attempt (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { base, max } => {
                let exponent = attempt.saturating_sub(1).min(16);
                base.saturating_mul(1 << exponent).min(max)
            }
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with a fixed delay between attempts.
    #[must_use]
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    /// Creates a policy with exponential backoff.
    #[must_use]
    pub const fn exponential(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential { base, max },
        }
    }

    /// Runs `operation` until it succeeds, fails with an error that
    /// `is_retryable` rejects, or the attempt budget is spent.
    ///
    /// On exhaustion the last error is returned unchanged so callers can
    /// translate it (e.g. a still-pending signal into a timeout).
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the last error once the
    /// attempt budget is spent.
    pub async fn run<T, F, Fut, P>(&self, mut operation: F, is_retryable: P) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&StackDeployError) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts && is_retryable(&err) => {
                    let delay = self.backoff.delay(attempt);
                    debug!("Attempt {attempt}/{max_attempts} not done ({err}), retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn throttled() -> StackDeployError {
        StackDeployError::Provider(ProviderError::Throttled {
            operation: String::from("ListChangeSets"),
            message: String::from("Rate exceeded"),
        })
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_millis(350),
        };
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(350));
        assert_eq!(backoff.delay(40), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(3, Duration::ZERO);

        let result = policy
            .run(
                || async {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(throttled())
                    } else {
                        Ok("done")
                    }
                },
                StackDeployError::is_retryable,
            )
            .await;

        assert_eq!(result.ok(), Some("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(2, Duration::ZERO);

        let result: Result<()> = policy
            .run(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(throttled())
                },
                StackDeployError::is_retryable,
            )
            .await;

        assert!(result.is_err_and(|e| e.is_retryable()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(5, Duration::ZERO);

        let result: Result<()> = policy
            .run(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(StackDeployError::internal("boom"))
                },
                StackDeployError::is_retryable,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
