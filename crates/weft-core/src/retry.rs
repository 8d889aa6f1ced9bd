//! Bounded retry harness for cloud API operations.
//!
//! Managed queue, storage, and invoke APIs exhibit spurious transient
//! failures; a cheap local retry markedly improves end-to-end success
//! without masking hard faults. Retries are a fixed attempt count with no
//! backoff: the platform's own throttling provides the global backoff, and
//! call volumes are low enough that local jitter buys nothing.

use std::future::Future;

use crate::error::Result;

/// Total attempts made by [`with_retries`], including the first.
pub const TOTAL_ATTEMPTS: u32 = 3;

/// Runs `op`, re-running it on failure up to [`TOTAL_ATTEMPTS`] times.
///
/// Each failed attempt is logged once with `label`; the last failure's
/// error is surfaced unchanged. Success after a retry is observable only
/// in the logs; the attempt count is not propagated.
///
/// # Errors
///
/// Returns the final attempt's error once all attempts are exhausted.
pub async fn with_retries<T, F, Fut>(label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 1..TOTAL_ATTEMPTS {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::warn!(label, attempt, error = %err, "operation failed, retrying");
            }
        }
    }
    op().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn first_attempt_success_runs_once() {
        let calls = AtomicU32::new(0);
        let result = with_retries("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(7) }
        })
        .await;
        assert_eq!(result.expect("should succeed"), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = with_retries("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::queue("transient"))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(result.expect("third attempt should succeed"), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn surfaces_last_error_after_exhaustion() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retries("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(Error::queue(format!("failure {n}"))) }
        })
        .await;
        let err = result.expect_err("all attempts should fail");
        assert!(err.to_string().contains("failure 2"), "last error surfaced");
        assert_eq!(calls.load(Ordering::SeqCst), TOTAL_ATTEMPTS);
    }
}
