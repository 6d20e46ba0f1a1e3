use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Configuration for retry behavior with exponential backoff.
///
/// Nothing in the client retries on its own. A policy is applied only where
/// the caller wraps an operation in [`retry_with_policy`], typically a whole
/// transaction after a [`CommitConflict`](crate::ClientError::CommitConflict).
/// A [`CommitOutcomeUnknown`](crate::ClientError::CommitOutcomeUnknown) is
/// never retried, since the transaction may already be applied.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (not including the initial attempt)
    pub max_attempts: u32,

    /// Initial backoff duration in milliseconds
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration in milliseconds
    pub max_backoff_ms: u64,

    /// Multiplier applied to backoff after each retry
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Creates a new retry policy with the specified parameters.
    pub fn new(
        max_attempts: u32,
        initial_backoff_ms: u64,
        max_backoff_ms: u64,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms,
            max_backoff_ms,
            backoff_multiplier,
        }
    }

    /// Returns a policy with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// Returns a policy for quick transient failures such as commit conflicts.
    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 10,
            max_backoff_ms: 100,
            backoff_multiplier: 2.0,
        }
    }

    /// Returns a policy for outages that take a while to clear.
    pub fn standard() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }

    /// Calculates the backoff duration for a given attempt number (0-indexed).
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let backoff_ms = (self.initial_backoff_ms as f64
            * self.backoff_multiplier.powi(attempt as i32))
            .min(self.max_backoff_ms as f64) as u64;
        Duration::from_millis(backoff_ms)
    }
}

impl Default for RetryPolicy {
    /// Same as `standard()`.
    fn default() -> Self {
        Self::standard()
    }
}

/// Re-runs an async operation according to `policy`.
///
/// Only errors for which [`is_retryable`](crate::ClientError::is_retryable)
/// holds are retried, at most `policy.max_attempts` times, sleeping with exponential backoff
/// in between. Any other error is returned immediately.
///
/// # Examples
///
/// ```no_run
/// use kevo_client::{retry_with_policy, Client, ClientOptions, RetryPolicy};
///
/// # async fn example() -> kevo_client::Result<()> {
/// let client = Client::new(ClientOptions::default())?;
/// client.connect().await?;
///
/// retry_with_policy(&RetryPolicy::fast(), || async {
///     let mut tx = client.begin_transaction(false).await?;
///     let current = tx.get(b"counter").await?;
///     let next = current
///         .and_then(|v| std::str::from_utf8(&v).ok()?.parse::<u64>().ok())
///         .unwrap_or(0)
///         + 1;
///     tx.put(b"counter", next.to_string().as_bytes()).await?;
///     tx.commit().await
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_policy<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt >= policy.max_attempts => return Err(e),
            Err(e) => {
                let backoff = policy.backoff_duration(attempt);
                debug!(attempt = attempt + 1, backoff_ms = backoff.as_millis() as u64, error = %e, "retrying");
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

/// Retries an operation with the default policy.
pub async fn retry<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with_policy(&RetryPolicy::default(), operation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_backoff_ms, 100);
        assert_eq!(policy.max_backoff_ms, 5000);
        assert_eq!(policy.backoff_multiplier, 2.0);
    }

    #[test]
    fn test_backoff_duration_exponential() {
        let policy = RetryPolicy::new(5, 100, 10000, 2.0);

        assert_eq!(policy.backoff_duration(0).as_millis(), 100);
        assert_eq!(policy.backoff_duration(1).as_millis(), 200);
        assert_eq!(policy.backoff_duration(3).as_millis(), 800);
    }

    #[test]
    fn test_backoff_duration_respects_max() {
        let policy = RetryPolicy::new(10, 100, 500, 2.0);

        assert_eq!(policy.backoff_duration(5).as_millis(), 500);
        assert_eq!(policy.backoff_duration(10).as_millis(), 500);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_conflicts() {
        let calls = AtomicU32::new(0);

        let result = retry_with_policy(&RetryPolicy::new(3, 1, 5, 2.0), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ClientError::CommitConflict("counter".to_string()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_is_bounded() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = retry_with_policy(&RetryPolicy::new(2, 1, 5, 1.5), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ClientError::Timeout("slow".to_string()))
        })
        .await;

        assert!(matches!(result, Err(ClientError::Timeout(_))));
        // Initial attempt + 2 retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_precondition_errors_are_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = retry_with_policy(&RetryPolicy::fast(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ClientError::ReadOnlyViolation)
        })
        .await;

        assert!(matches!(result, Err(ClientError::ReadOnlyViolation)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_retry_policy() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = retry_with_policy(&RetryPolicy::no_retry(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ClientError::Connection("refused".to_string()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
