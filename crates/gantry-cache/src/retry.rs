//! Backoff for connection acquisition
//!
//! Only acquiring a connection is retried. A command that reached the server
//! is never re-sent by this crate.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::error::{CacheError, CacheResult, ErrorKind};

/// Exponential backoff bounded by the configured min/max
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        let floor = self.min_backoff.min(self.max_backoff);
        delay.clamp(floor, self.max_backoff)
    }

    /// Run `connect` until it succeeds, fails with a non-connection error,
    /// or the retry budget is spent.
    pub(crate) async fn acquire<T, F, Fut>(&self, what: &str, mut connect: F) -> CacheResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CacheResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match connect().await {
                Ok(value) => return Ok(value),
                Err(err) if retryable(&err) && attempt < self.max_retries => {
                    let delay = self.delay(attempt);
                    debug!(
                        node = what,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying connection acquisition"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn retryable(err: &CacheError) -> bool {
    matches!(err.kind(), ErrorKind::ConnectionFailed | ErrorKind::Timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(100),
            min_backoff: Duration::from_millis(8),
            max_backoff: Duration::from_millis(512),
        }
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = policy(3);
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert_eq!(policy.delay(3), Duration::from_millis(512));
        assert_eq!(policy.delay(40), Duration::from_millis(512));
    }

    #[test]
    fn test_delay_respects_floor() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..policy(3)
        };
        assert_eq!(policy.delay(0), Duration::from_millis(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_retries_connection_errors() {
        let calls = AtomicU32::new(0);
        let result = policy(3)
            .acquire("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(CacheError::connection("127.0.0.1:1", "refused"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: CacheResult<()> = policy(2)
            .acquire("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CacheError::connection("127.0.0.1:1", "refused")) }
            })
            .await;

        assert!(matches!(result, Err(CacheError::Connection(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_acquire_does_not_retry_other_errors() {
        let calls = AtomicU32::new(0);
        let result: CacheResult<()> = policy(5)
            .acquire("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CacheError::InvalidArgument("bad".into())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
