use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Error produced when an operation does not settle before its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation timed out after {}ms", limit.as_millis())]
pub struct TimeoutError {
    pub limit: Duration,
}

/// Runs `future` with a wall-clock bound.
///
/// When the deadline elapses first the inner future is dropped, which cancels
/// it at its next suspension point (for an HTTP call this closes the
/// connection). The deadline timer is owned by the returned future and never
/// outlives it.
///
/// The caller's error type absorbs the timeout through `From<TimeoutError>`.
pub async fn with_timeout<F, T, E>(limit: Duration, future: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<TimeoutError>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => {
            tracing::debug!(limit_ms = limit.as_millis() as u64, "Operation timed out");
            Err(TimeoutError { limit }.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Timeout,
        Inner,
    }

    impl From<TimeoutError> for TestError {
        fn from(_: TimeoutError) -> Self {
            TestError::Timeout
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_before_deadline() {
        let result: Result<u32, TestError> = with_timeout(Duration::from_secs(5), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(7)
        })
        .await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let result: Result<u32, TestError> = with_timeout(Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(7)
        })
        .await;
        assert_eq!(result, Err(TestError::Timeout));
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let result: Result<u32, TestError> =
            with_timeout(Duration::from_secs(1), async { Err(TestError::Inner) }).await;
        assert_eq!(result, Err(TestError::Inner));
    }

    #[test]
    fn test_timeout_error_display() {
        let err = TimeoutError {
            limit: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "operation timed out after 1500ms");
    }
}
