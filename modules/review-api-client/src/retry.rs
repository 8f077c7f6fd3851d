use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{Result, ReviewApiError};

/// Bounded exponential backoff for throttled requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Factor applied to the delay after each retry.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay before the `retry`-th retry (1-based): `initial * multiplier^(retry - 1)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(retry.saturating_sub(1));
        self.initial_delay.saturating_mul(factor)
    }
}

/// Sleep for `duration` unless `cancel` fires first. Returns false when cancelled.
pub async fn cancellable_sleep(cancel: &CancellationToken, duration: Duration) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the policy's
/// retries are spent. The last error is returned on exhaustion.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retries = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(ReviewApiError::Cancelled);
        }

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && retries < policy.max_retries => {
                retries += 1;
                let delay = policy.delay_for(retries);
                warn!(
                    label,
                    retry = retries,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retryable failure, backing off"
                );
                if !cancellable_sleep(cancel, delay).await {
                    return Err(ReviewApiError::Cancelled);
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(1),
            multiplier: 2,
        }
    }

    #[test]
    fn delay_doubles_each_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn succeeds_after_transient_throttling() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let cancel = CancellationToken::new();
        let result = retry_with_backoff(&fast_policy(3), &cancel, "test", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ReviewApiError::RateLimited)
            } else {
                Ok("page")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "page");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let cancel = CancellationToken::new();
        let result: Result<()> = retry_with_backoff(&fast_policy(3), &cancel, "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ReviewApiError::RateLimited)
        })
        .await;

        assert!(matches!(result, Err(ReviewApiError::RateLimited)));
        assert_eq!(calls.load(Ordering::SeqCst), 4, "one attempt plus three retries");
    }

    #[tokio::test]
    async fn non_retryable_errors_return_immediately() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let cancel = CancellationToken::new();
        let result: Result<()> = retry_with_backoff(&fast_policy(3), &cancel, "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ReviewApiError::Api {
                status: 503,
                message: "unavailable".into(),
            })
        })
        .await;

        assert!(matches!(result, Err(ReviewApiError::Api { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<()> =
            retry_with_backoff(&fast_policy(3), &cancel, "test", || async { Ok(()) }).await;
        assert!(matches!(result, Err(ReviewApiError::Cancelled)));
    }
}
