//! Retry loop: run an async closure until success or the policy says stop.

use std::future::Future;

use super::classify::classify;
use super::policy::{RetryDecision, RetryPolicy};
use crate::error::TransferError;

/// Runs `f` until it succeeds or the retry policy says to stop.
/// On a transient failure, sleeps for the fixed delay then tries again.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut f: F,
) -> Result<T, TransferError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransferError>>,
{
    let mut attempt = 1u32;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => match policy.decide(attempt, classify(&e)) {
                RetryDecision::NoRetry => return Err(e),
                RetryDecision::RetryAfter(d) => {
                    tracing::warn!(attempt, error = %e, "{what} failed, retrying in {:?}", d);
                    tokio::time::sleep(d).await;
                    attempt += 1;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let out = run_with_retry(&fast(5), "lookup", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(TransferError::Remote(RemoteError::Timeout))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> = run_with_retry(&fast(3), "lookup", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TransferError::Remote(RemoteError::Server(500)))
        })
        .await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let res: Result<(), _> = run_with_retry(&fast(5), "lookup", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TransferError::Remote(RemoteError::Quota))
        })
        .await;
        assert!(matches!(res, Err(TransferError::Remote(RemoteError::Quota))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
