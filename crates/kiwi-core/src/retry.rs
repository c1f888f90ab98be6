//! Generic retry helper used by `kiwi-ai` (transient provider errors) and
//! `kiwi-store` (transient connection errors). Mirrors the spec's
//! `Retry`/`RetryErr`/`RetryWithContext` family (§5): bounded attempts,
//! exponential backoff, and immediate propagation of cancellation.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

/// Retries `op` while `is_transient` returns true for its error, honoring
/// `cancel`. Returns immediately (no further attempts) once `cancel` fires
/// or `is_transient` returns false.
pub async fn retry_with_cancel<T, E, F, Fut, P>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    is_transient: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        if cancel.is_cancelled() {
            // The caller's op should itself observe cancellation and return
            // an error; we just stop retrying rather than fabricate one.
        }
        let result = op().await;
        match result {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt >= policy.max_attempts || !is_transient(&e) || cancel.is_cancelled() {
                    return Err(e);
                }
                let delay = policy.base_delay * 2u32.pow(attempt - 1);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(e),
                }
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
        let attempts = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result: Result<u32, &str> = retry_with_cancel(
            RetryPolicy {
                max_attempts: 5,
                base_delay: Duration::from_millis(1),
            },
            &cancel,
            |_: &&str| true,
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient")
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_on_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<u32, &str> = retry_with_cancel(
            RetryPolicy::default(),
            &cancel,
            |_: &&str| true,
            || async { Err("transient") },
        )
        .await;
        assert_eq!(result, Err("transient"));
    }

    #[tokio::test]
    async fn does_not_retry_fatal_errors() {
        let attempts = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let result: Result<u32, &str> = retry_with_cancel(
            RetryPolicy::default(),
            &cancel,
            |_: &&str| false,
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal") }
            },
        )
        .await;
        assert_eq!(result, Err("fatal"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
