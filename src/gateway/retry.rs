//! Exponential backoff with full jitter, for idempotent reads only.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// `base * 2^attempt`, capped at `max`, jittered uniformly in `[0, computed]`.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exp = base.as_millis().saturating_mul(1u128 << attempt.min(16));
    let capped = exp.min(max.as_millis());
    let jittered = rand::thread_rng().gen_range(0..=capped.max(1));
    Duration::from_millis(jittered as u64)
}

/// Retries `f` up to `attempts` times (the first call plus `attempts - 1`
/// retries), sleeping a jittered backoff between each — but only while
/// `should_retry` says the error is worth another attempt. A non-retryable
/// error (e.g. a disabled provider) returns immediately on the first failure
/// instead of burning the full attempt budget on backoff that can't help.
/// Only call this for idempotent reads — writes are never retried by the
/// Gateway.
pub async fn retry_with_backoff<F, Fut, T, E>(attempts: u32, should_retry: impl Fn(&E) -> bool, f: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut last_err = None;
    for attempt in 0..attempts.max(1) {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let retryable = should_retry(&e);
                last_err = Some(e);
                if !retryable {
                    break;
                }
                if attempt + 1 < attempts {
                    let delay = backoff_delay(attempt, Duration::from_millis(100), Duration::from_secs(5));
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    Err(last_err.expect("attempts >= 1 guarantees at least one iteration"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn backoff_delay_is_bounded_by_max() {
        for attempt in 0..20 {
            let d = backoff_delay(attempt, Duration::from_millis(100), Duration::from_secs(1));
            assert!(d <= Duration::from_secs(1));
        }
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_with_backoff(
            5,
            |_: &&str| true,
            || {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err("transient")
                    } else {
                        Ok(n)
                    }
                }
            },
        )
        .await;
        assert_eq!(result, Ok(2));
    }

    #[tokio::test]
    async fn retry_gives_up_after_attempts_exhausted() {
        let result: Result<(), &str> = retry_with_backoff(3, |_| true, || async { Err("permanent") }).await;
        assert_eq!(result, Err("permanent"));
    }

    #[tokio::test]
    async fn non_retryable_error_returns_after_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), &str> = retry_with_backoff(5, |_| false, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("unavailable")
            }
        })
        .await;
        assert_eq!(result, Err("unavailable"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
