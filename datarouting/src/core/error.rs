use super::packet::Packet;
use super::retry::RetryableError;
use super::token::ResumeToken;
use std::time::Duration;
use thiserror::Error;

/// A boxed error that can be sent across threads.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure of a route lookup call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RouteError {
    /// Simulated network failure; the same lookup may succeed on retry.
    #[error("IO Error: network disconnect")]
    TransientLookup,
}

impl RetryableError for RouteError {
    fn is_retryable(&self) -> bool {
        matches!(self, RouteError::TransientLookup)
    }
}

/// Failure of a single transmission attempt.
///
/// Every variant is answered the same way by the delivery loop: the current
/// provider is marked failed and another one is selected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransmitError {
    /// The resume-token could not be handed to the remote system.
    #[error("failed to submit resume token upstream: {0}")]
    Submission(String),

    /// No confirmation arrived within the activity timeout.
    #[error("transmission timed out after {0:?}")]
    Timeout(Duration),

    /// The parked transmission was released without a result.
    #[error("transmission abandoned before completion")]
    Abandoned,
}

impl RetryableError for TransmitError {
    fn is_retryable(&self) -> bool {
        false
    }
}

/// Failure to resume a parked transmission by token.
///
/// Raised toward the callback registry only; it never reaches the submitter
/// of the callback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum CallbackResolutionError {
    /// No transmission is parked on this token (unknown or already consumed).
    #[error("no transmission is waiting on token {0}")]
    UnknownToken(ResumeToken),

    /// The transmission stopped waiting before the result arrived.
    #[error("transmission waiting on token {0} is gone")]
    Abandoned(ResumeToken),

    /// A transmission is already parked on this token.
    #[error("token {0} is already parked")]
    AlreadyParked(ResumeToken),
}

/// Failure that ends a delivery early.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeliveryError {
    #[error("gave up on route lookup after {attempts} tries")]
    RouteLookupExhausted {
        attempts: u32,
        #[source]
        source: RouteError,
    },
}

/// A failed delivery together with the best-known state of its packet.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("delivery of packet {} failed: {}", .packet.id(), .error)]
pub struct DeliveryFailure {
    pub packet: Packet,
    #[source]
    pub error: DeliveryError,
}
