//! # Bounded Retry with Exponential Backoff
//!
//! Shared retry policy used by `appendBatch` (event store, spec §4.1), the
//! dead-letter retry ladder (spec §4.4.3), and the bus reconnection loop
//! (spec §4.4.5). Each caller supplies its own jitter/backoff shape through
//! [`RetryPolicy`]; this module only owns the loop.

use super::LibraryError;
use std::future::Future;
use std::time::Duration;

/// Trait implemented by errors that know whether they're worth retrying.
pub trait RetryableError {
    fn is_retryable(&self) -> bool;
}

impl RetryableError for LibraryError {
    fn is_retryable(&self) -> bool {
        LibraryError::is_retryable(self)
    }
}

/// Configurable retry policy: bounded attempts, exponential backoff, capped delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// The policy `appendBatch` uses: 3 attempts, `50 + rand(0, 100*2^attempt) ms`.
    pub fn event_store_append() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(1000),
            multiplier: 2.0,
        }
    }

    /// The policy bus reconnection uses: `min(30s, 1000 * 2^attempts)`.
    pub fn bus_reconnect() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped = scaled.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Builder for one-off retry policies.
#[derive(Debug, Default)]
pub struct RetryBuilder {
    policy: RetryPolicy,
}

impl RetryBuilder {
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy::default(),
        }
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.policy.max_attempts = n;
        self
    }

    pub fn base_delay(mut self, d: Duration) -> Self {
        self.policy.base_delay = d;
        self
    }

    pub fn max_delay(mut self, d: Duration) -> Self {
        self.policy.max_delay = d;
        self
    }

    pub fn build(self) -> RetryPolicy {
        self.policy
    }
}

/// Run `operation` up to `policy.max_attempts` times, sleeping with capped
/// exponential backoff between attempts, but only while the error is
/// retryable. The first non-retryable error is returned immediately.
pub async fn retry_with_policy<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                attempt += 1;
                if !error.is_retryable() || attempt >= policy.max_attempts {
                    return Err(error);
                }
                let delay = policy.delay_for(attempt);
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying after transient failure");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        };

        let result: Result<u32, LibraryError> = retry_with_policy(&policy, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(LibraryError::EventStoreUnavailable {
                    message: "timeout".into(),
                })
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::event_store_append();

        let result: Result<(), LibraryError> = retry_with_policy(&policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(LibraryError::ValidationError {
                message: "bad input".into(),
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_bounded_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
        };

        let result: Result<(), LibraryError> = retry_with_policy(&policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(LibraryError::ConcurrencyConflict {
                aggregate_id: "a".into(),
                expected: 1,
                actual: 2,
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
