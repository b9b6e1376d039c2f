/// Deadline wrappers for async operations
///
/// Dropping the wrapped future on expiry is the cancellation mechanism; the
/// operation must tolerate being abandoned at any await point.
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub duration: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimeoutError {
    #[error("Operation timed out after {0:?}")]
    Elapsed(Duration),
}

/// Execute a future with timeout
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    timeout(duration, future)
        .await
        .map_err(|_| TimeoutError::Elapsed(duration))
}

/// Execute a fallible future with timeout, folding expiry into the caller's error type
pub async fn with_timeout_result<F, T, E>(duration: Duration, future: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<TimeoutError>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(TimeoutError::Elapsed(duration).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Failed,
        TimedOut(Duration),
    }

    impl From<TimeoutError> for TestError {
        fn from(err: TimeoutError) -> Self {
            match err {
                TimeoutError::Elapsed(d) => TestError::TimedOut(d),
            }
        }
    }

    #[tokio::test]
    async fn test_timeout_success() {
        let result = with_timeout(Duration::from_secs(1), async { 42 }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_timeout_elapsed() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            42
        })
        .await;

        assert_eq!(result, Err(TimeoutError::Elapsed(Duration::from_millis(10))));
    }

    #[tokio::test]
    async fn test_timeout_result_keeps_inner_error() {
        let result: Result<i32, TestError> =
            with_timeout_result(Duration::from_secs(1), async { Err(TestError::Failed) }).await;
        assert_eq!(result, Err(TestError::Failed));
    }

    #[tokio::test]
    async fn test_timeout_result_converts_elapsed() {
        let result: Result<i32, TestError> =
            with_timeout_result(Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(1)
            })
            .await;
        assert_eq!(
            result,
            Err(TestError::TimedOut(Duration::from_millis(10)))
        );
    }
}
