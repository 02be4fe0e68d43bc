use std::future::Future;
use std::time::Duration;

use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use tracing::warn;

use crate::types::Result;

/// Uniform retry policy applied to scoring and delivery calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Randomization factor for the exponential backoff, 0.0..=1.0.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            jitter: 0.5,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    fn backoff(&self) -> ExponentialBackoff<backoff::SystemClock> {
        ExponentialBackoff {
            current_interval: self.base_delay,
            initial_interval: self.base_delay,
            randomization_factor: self.jitter,
            multiplier: 2.0,
            max_interval: self.base_delay * 32,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Run `op`, retrying transient failures with exponential backoff until
    /// the attempt budget is spent. Permanent errors return immediately.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = self.backoff();
        let attempts = self.max_attempts.max(1);

        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = backoff.next_backoff().unwrap_or(self.base_delay);
                    warn!(
                        "{} attempt {}/{} failed ({}), retrying in {:?}",
                        what, attempt, attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        unreachable!("retry loop always returns from its last attempt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DigestError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_up_to_budget() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));

        let result: Result<()> = policy
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DigestError::Timeout) }
            })
            .await;

        assert!(matches!(result, Err(DigestError::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));

        let result = policy
            .run("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 1 {
                        Err(DigestError::RateLimited)
                    } else {
                        Ok(42u8)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(1));

        let result: Result<()> = policy
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DigestError::Config("bad".into())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
