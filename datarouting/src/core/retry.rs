// =============================================================================
// ACTIVITY RETRY BEHAVIOR
// =============================================================================
//
// Two remote calls sit inside a delivery and they fail in different ways:
//
// 1. ROUTE LOOKUP: transient network failures. Retried in place with a
//    constant backoff (250ms, multiplier 1.0, capped at 1s) up to
//    `route_max_attempts` times.
//
// 2. TRANSMISSION: never retried at the activity layer
//    (`RetryPolicy::NONE`). A failed transmission is answered by picking a new
//    provider, which is the delivery loop's job, not the retry helper's.
//
// Which errors are worth another attempt is decided by the error type through
// `RetryableError`; how many attempts and how long to wait between them is
// decided by `RetryPolicy`.
// =============================================================================

use std::time::Duration;

/// Configuration for activity retry behavior.
///
/// # Examples
///
/// ```
/// use datarouting::core::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::route_lookup(3);
/// assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(250)));
/// assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(250)));
/// assert_eq!(policy.delay_for_attempt(3), None);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first try).
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Maximum delay between retries.
    pub max_delay: Duration,

    /// Multiplier applied per retry.
    ///
    /// Each retry delay is `min(initial_delay * backoff_multiplier^(attempt-1), max_delay)`.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// No retries - the first failure is final.
    ///
    /// Used for transmissions: a failed provider is replaced, not retried.
    pub const NONE: Self = Self {
        max_attempts: 1,
        initial_delay: Duration::from_secs(0),
        max_delay: Duration::from_secs(0),
        backoff_multiplier: 1.0,
    };

    /// Initial interval of the route lookup policy.
    pub const ROUTE_INITIAL_DELAY: Duration = Duration::from_millis(250);

    /// Cap of the route lookup policy.
    pub const ROUTE_MAX_DELAY: Duration = Duration::from_secs(1);

    /// Policy used for route lookups: constant 250ms between attempts, capped at 1s.
    ///
    /// A `max_attempts` of zero is treated as one attempt.
    pub const fn route_lookup(max_attempts: u32) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            initial_delay: Self::ROUTE_INITIAL_DELAY,
            max_delay: Self::ROUTE_MAX_DELAY,
            backoff_multiplier: 1.0,
        }
    }

    /// Calculate the delay before the next retry attempt.
    ///
    /// * `attempt` - The attempt that just failed (1-indexed)
    ///
    /// Returns `None` once `attempt` reaches `max_attempts`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }

        let exponent = attempt.saturating_sub(1) as f64;
        let multiplier = self.backoff_multiplier.powf(exponent);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;

        Some(Duration::from_secs_f64(
            delay_secs.min(self.max_delay.as_secs_f64()),
        ))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::NONE
    }
}

impl From<u32> for RetryPolicy {
    /// Shorthand for a route lookup policy with `max_attempts` attempts.
    fn from(max_attempts: u32) -> Self {
        Self::route_lookup(max_attempts)
    }
}

/// Trait for error types to specify whether they should trigger a retry.
///
/// - `true`: the failure is transient and the same call may succeed later.
/// - `false`: the failure is final for this call.
pub trait RetryableError {
    fn is_retryable(&self) -> bool;
}
