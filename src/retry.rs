//! Retry with exponential backoff for transient backend failures.
//!
//! Built on the `backon` crate. Only errors classified as
//! [`BackendErrorKind::ConnectionBlocked`] are retried; everything else is
//! returned on the first failure.

use backon::{BlockingRetryable, ExponentialBuilder};
use std::time::Duration;

use crate::error::{BackendErrorKind, Error, Result};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub(crate) struct RetryConfig {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryConfig {
    /// For waiting until another store in this process has released a
    /// backend file it is closing.
    pub(crate) fn handle_release() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(250),
        }
    }

    fn build_backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries as usize)
            .with_factor(2.0)
            .with_jitter()
    }
}

/// Whether an error may go away on its own.
pub(crate) fn is_transient(err: &Error) -> bool {
    err.backend_kind() == Some(BackendErrorKind::ConnectionBlocked)
}

/// Retries a blocking operation while it fails transiently.
///
/// Must run off the async runtime (it sleeps the calling thread).
pub(crate) fn retry_blocking<T, F>(config: &RetryConfig, operation: &str, op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let max_retries = config.max_retries;
    let mut attempt = 0u32;

    op.retry(config.build_backoff())
        .sleep(std::thread::sleep)
        .when(is_transient)
        .notify(|err: &Error, delay: Duration| {
            attempt += 1;
            tracing::debug!(
                operation,
                attempt,
                max_retries,
                next_delay_ms = delay.as_millis() as u64,
                error = %err,
                "Backend busy, will retry"
            );
        })
        .call()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn blocked() -> Error {
        Error::backend("test", BackendErrorKind::ConnectionBlocked, "locked")
    }

    #[test]
    fn test_retries_until_success() {
        let mut calls = 0;
        let result = retry_blocking(&quick(), "open", || {
            calls += 1;
            if calls < 3 { Err(blocked()) } else { Ok(calls) }
        });
        assert_eq!(result, Ok(3));
    }

    #[test]
    fn test_gives_up_after_max_retries() {
        let mut calls = 0;
        let result: Result<()> = retry_blocking(&quick(), "open", || {
            calls += 1;
            Err(blocked())
        });
        assert_eq!(result, Err(blocked()));
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_permanent_errors_not_retried() {
        let mut calls = 0;
        let result: Result<()> = retry_blocking(&quick(), "open", || {
            calls += 1;
            Err(Error::config("bad"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
