//! Retry logic with exponential backoff
//!
//! Used for idempotent requests (result downloads) where a dropped connection
//! should not force the user to click again. Uploads and submissions are not
//! retried automatically: a failure there is reported and the user decides.
//!
//! # Example
//!
//! ```no_run
//! use invoice_workflow::retry::{IsRetryable, with_retry};
//! use invoice_workflow::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! with_retry(&config, || async {
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets, 5xx) return `true`.
/// Permanent failures (validation, 4xx, bad configuration) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;

    /// Delay the remote side asked for before the next attempt
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            // 408 Request Timeout, 429 Too Many Requests, 5xx
            Error::Http { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Config { .. } => false,
            Error::Validation(_) => false,
            Error::InvalidState { .. } => false,
            Error::Busy(_) => false,
            Error::Superseded(_) => false,
            Error::Url(_) => false,
            Error::Serialization(_) => false,
            Error::FileUnreadable { .. } => false,
            Error::PollingAbandoned { .. } => false,
            Error::Other(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// Returns the successful result or the last error after `config.max_attempts`
/// retries are exhausted. Non-retryable errors are returned immediately.
///
/// A server-requested delay (`Retry-After`) replaces the backoff delay for
/// that attempt, capped at `config.max_delay` and without jitter. The
/// exponential schedule keeps advancing underneath it.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut backoff = config.initial_delay;

    loop {
        let e = match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => e,
        };

        if !e.is_retryable() {
            tracing::debug!(error = %e, "Operation failed with non-retryable error");
            return Err(e);
        }
        if attempt >= config.max_attempts {
            tracing::error!(
                error = %e,
                attempts = attempt + 1,
                "Operation failed after all retry attempts exhausted"
            );
            return Err(e);
        }

        attempt += 1;
        let wait = next_wait(config, backoff, e.retry_after());
        tracing::warn!(
            error = %e,
            attempt,
            max_attempts = config.max_attempts,
            delay_ms = wait.as_millis(),
            server_requested = e.retry_after().is_some(),
            "Operation failed, retrying"
        );
        tokio::time::sleep(wait).await;

        backoff = Duration::from_secs_f64(backoff.as_secs_f64() * config.backoff_multiplier)
            .min(config.max_delay);
    }
}

/// Pick the delay before the next attempt
fn next_wait(config: &RetryConfig, backoff: Duration, requested: Option<Duration>) -> Duration {
    match requested {
        Some(requested) => requested.min(config.max_delay),
        None if config.jitter => add_jitter(backoff),
        None => backoff,
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn http(status: u16, retry_after: Option<Duration>) -> Error {
        Error::Http {
            status,
            message: "artifact store".into(),
            retry_after,
        }
    }

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    /// Fails with `errors` in order, then succeeds with the attempt count
    async fn run_script(config: &RetryConfig, errors: Vec<Error>) -> (Result<u32, Error>, u32) {
        let calls = Arc::new(AtomicU32::new(0));
        let errors = Arc::new(std::sync::Mutex::new(errors.into_iter()));
        let result = with_retry(config, || {
            let calls = calls.clone();
            let errors = errors.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                match errors.lock().unwrap().next() {
                    Some(e) => Err(e),
                    None => Ok(n),
                }
            }
        })
        .await;
        (result, calls.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_success_needs_one_attempt() {
        let (result, calls) = run_script(&RetryConfig::default(), vec![]).await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_until_success() {
        let (result, calls) =
            run_script(&fast_config(3), vec![http(503, None), http(502, None)]).await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let errors = (0..5).map(|_| http(500, None)).collect();
        let (result, calls) = run_script(&fast_config(2), errors).await;
        assert!(matches!(result, Err(Error::Http { status: 500, .. })));
        assert_eq!(calls, 3, "initial attempt + 2 retries");
    }

    #[tokio::test]
    async fn test_missing_artifact_is_not_retried() {
        let (result, calls) = run_script(&fast_config(3), vec![http(404, None)]).await;
        assert!(matches!(result, Err(Error::Http { status: 404, .. })));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_backoff_grows_between_attempts() {
        let start = std::time::Instant::now();
        let errors = (0..4).map(|_| http(503, None)).collect();
        let _ = run_script(&fast_config(3), errors).await;

        // 10ms + 20ms + 40ms
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(70), "waited {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "waited {elapsed:?}");
    }

    #[tokio::test]
    async fn test_retry_after_replaces_backoff() {
        let start = std::time::Instant::now();
        let (result, calls) = run_script(
            &fast_config(1),
            vec![http(429, Some(Duration::from_millis(150)))],
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls, 2);
        assert!(
            start.elapsed() >= Duration::from_millis(150),
            "server-requested delay was not honored"
        );
    }

    #[test]
    fn test_retry_after_is_capped_and_not_jittered() {
        let mut config = fast_config(3);
        config.max_delay = Duration::from_millis(200);
        config.jitter = true;
        let backoff = Duration::from_millis(10);

        assert_eq!(
            next_wait(&config, backoff, Some(Duration::from_secs(30))),
            Duration::from_millis(200)
        );
        assert_eq!(
            next_wait(&config, backoff, Some(Duration::from_millis(50))),
            Duration::from_millis(50)
        );
        let jittered = next_wait(&config, backoff, None);
        assert!(jittered >= backoff && jittered <= backoff * 2);
    }

    #[test]
    fn test_http_status_retryability() {
        for status in [408, 429, 500, 502, 503] {
            assert!(http(status, None).is_retryable(), "{status}");
        }
        for status in [400, 404, 410, 422] {
            assert!(!http(status, None).is_retryable(), "{status}");
        }
    }

    #[test]
    fn test_io_errors_retry_only_when_transient() {
        let timeout_err = Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout"));
        assert!(timeout_err.is_retryable());

        let not_found = Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "not found",
        ));
        assert!(!not_found.is_retryable());
        assert_eq!(not_found.retry_after(), None);
    }

    #[test]
    fn test_local_errors_are_permanent() {
        assert!(!Error::Validation(crate::error::ValidationError::EmptySelection).is_retryable());
        assert!(
            !Error::InvalidState {
                operation: "download".into(),
                step: "upload".into()
            }
            .is_retryable()
        );
    }
}
