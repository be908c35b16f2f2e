//! Retry helper for activity execution.
//!
//! Runs an async operation under a [`RetryPolicy`]:
//! - Retries only errors whose [`RetryableError::is_retryable`] is true
//! - Stops after `max_attempts` attempts
//! - Sleeps `policy.delay_for_attempt(n)` between attempts

use crate::core::{RetryPolicy, RetryableError};
use std::future::Future;

/// Final error of a retried operation, with the number of attempts spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub error: E,
}

/// Executes a fallible operation with retry logic.
///
/// `operation` receives the current attempt number (1-indexed). On success the
/// value is returned immediately. On failure the operation is retried after the
/// policy's delay while the error is retryable and attempts remain; otherwise the
/// last error is returned together with the attempt count.
///
/// # Example
///
/// ```ignore
/// let route = retry_with_policy(RetryPolicy::route_lookup(3), |_attempt| {
///     selector.select_route(&tried)
/// })
/// .await;
/// ```
pub async fn retry_with_policy<F, Fut, T, E>(
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, Exhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError + std::fmt::Debug,
{
    let mut attempt = 1;

    loop {
        let error = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !error.is_retryable() {
            tracing::debug!(attempt, ?error, "activity failed with non-retryable error");
            return Err(Exhausted { attempts: attempt, error });
        }

        match policy.delay_for_attempt(attempt) {
            Some(delay) => {
                tracing::debug!(
                    "activity failed with retryable error (attempt {}/{}): {:?}. Retrying after {:?}",
                    attempt,
                    policy.max_attempts,
                    error,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            None => {
                tracing::warn!(
                    "activity failed and exhausted retry attempts ({}/{}): {:?}",
                    attempt,
                    policy.max_attempts,
                    error
                );
                return Err(Exhausted { attempts: attempt, error });
            }
        }
    }
}
