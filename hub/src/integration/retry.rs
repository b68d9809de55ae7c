//! Retry policy for integration calls (spec §4.4).
//!
//! Up to 3 attempts total, exponential backoff `1s * 2^attempt` between
//! them. Network-level failures and HTTP 5xx are retryable; other 4xx and
//! aborts are not. A 401 on the first attempt gets one chance at an
//! out-of-band OAuth2 token refresh before the retry, handled by the
//! caller — this module only runs the loop and classifies outcomes.

use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);

/// What a single attempt produced, normalised so the retry loop never has
/// to match on a raw `reqwest::Response` or distinguish "thrown" from
/// "returned".
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// Attempt succeeded; stop.
    Done(T),
    /// Attempt failed in a way worth retrying (network error, 5xx, or a
    /// 401 the caller just refreshed credentials for).
    Retryable(crate::error::Error),
    /// Attempt failed in a way that retrying won't fix (4xx other than a
    /// refreshed 401, or an aborted call).
    Fatal(crate::error::Error),
}

/// Runs `attempt` up to [`MAX_ATTEMPTS`] times, sleeping `1s * 2^n`
/// between retryable failures, bounded overall by `deadline` elapsing.
/// `attempt` is given the zero-based attempt index so it can decide
/// whether a 401 is eligible for a token refresh (only on attempt 0).
pub async fn retry_with_backoff<T, F, Fut>(mut attempt: F) -> Result<T, crate::error::Error>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = RetryOutcome<T>>,
{
    let mut last_err = crate::error::Error::Internal("retry loop never ran".to_string());
    for n in 0..MAX_ATTEMPTS {
        match attempt(n).await {
            RetryOutcome::Done(value) => return Ok(value),
            RetryOutcome::Fatal(err) => return Err(err),
            RetryOutcome::Retryable(err) => {
                last_err = err;
                if n + 1 < MAX_ATTEMPTS {
                    let backoff = BASE_DELAY * 2u32.pow(n);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_is_done() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(|_n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { RetryOutcome::Done(42) }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_up_to_three_attempts_then_gives_up() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = retry_with_backoff(|_n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { RetryOutcome::Retryable(Error::Transport("boom".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_outcome_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = retry_with_backoff(|_n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { RetryOutcome::Fatal(Error::Validation("bad request".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_on_a_later_attempt() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(|n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    RetryOutcome::Retryable(Error::Transport("flaky".to_string()))
                } else {
                    RetryOutcome::Done("ok")
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
