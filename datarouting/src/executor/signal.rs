//! Async completion by resume-token.
//!
//! This module hides the complexity of:
//! - Parking a transmission until an external actor presents its token
//! - Handing the result payload to exactly one waiter
//! - Cleaning up waiters that gave up (timeout, submission failure)
//!
//! A transmission parks itself with [`CompletionHub::park`] and awaits the
//! returned [`ParkedCompletion`]. Whoever later holds the token resumes it
//! through [`ActivityCompleter::complete`]. A token resumes at most once:
//! the second completion finds nothing parked and fails with
//! [`CallbackResolutionError::UnknownToken`].

use crate::core::{CallbackResolutionError, ResumeToken, TransmitError, TransmitOutcome};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::debug;

/// Resumes a parked unit of work by presenting its token and a result.
///
/// This is the resume-by-token primitive of the execution engine. The callback
/// registry depends only on this trait.
#[async_trait]
pub trait ActivityCompleter: Send + Sync {
    async fn complete(
        &self,
        token: &ResumeToken,
        outcome: TransmitOutcome,
    ) -> Result<(), CallbackResolutionError>;
}

/// In-process table of parked transmissions keyed by resume-token.
#[derive(Clone, Default)]
pub struct CompletionHub {
    waiting: Arc<DashMap<ResumeToken, oneshot::Sender<TransmitOutcome>>>,
}

impl CompletionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks a unit of work on `token`.
    ///
    /// # Errors
    /// Returns [`CallbackResolutionError::AlreadyParked`] if the token is in use.
    pub fn park(&self, token: ResumeToken) -> Result<ParkedCompletion, CallbackResolutionError> {
        match self.waiting.entry(token.clone()) {
            Entry::Occupied(_) => Err(CallbackResolutionError::AlreadyParked(token)),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(tx);
                debug!(%token, "parked transmission");
                Ok(ParkedCompletion {
                    token,
                    rx,
                    waiting: Arc::clone(&self.waiting),
                })
            }
        }
    }

    /// Drops the waiter parked on `token`, if any. Returns whether one was removed.
    pub fn release(&self, token: &ResumeToken) -> bool {
        self.waiting.remove(token).is_some()
    }

    /// Number of transmissions currently parked.
    pub fn parked_count(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_parked(&self, token: &ResumeToken) -> bool {
        self.waiting.contains_key(token)
    }
}

#[async_trait]
impl ActivityCompleter for CompletionHub {
    async fn complete(
        &self,
        token: &ResumeToken,
        outcome: TransmitOutcome,
    ) -> Result<(), CallbackResolutionError> {
        // Removal is the claim: only one caller can take the sender out.
        let (_, tx) = self
            .waiting
            .remove(token)
            .ok_or_else(|| CallbackResolutionError::UnknownToken(token.clone()))?;

        tx.send(outcome)
            .map_err(|_| CallbackResolutionError::Abandoned(token.clone()))?;

        debug!(%token, delivered = outcome.delivered, "resumed transmission");
        Ok(())
    }
}

/// A transmission waiting for its token to be completed.
///
/// Resolves to the delivered outcome, or to [`TransmitError::Abandoned`] if the
/// waiter was released without a result. Dropping it (for example when an
/// activity timeout fires) unparks the token, so a late callback fails with
/// `UnknownToken` instead of resuming a delivery that moved on.
pub struct ParkedCompletion {
    token: ResumeToken,
    rx: oneshot::Receiver<TransmitOutcome>,
    waiting: Arc<DashMap<ResumeToken, oneshot::Sender<TransmitOutcome>>>,
}

impl ParkedCompletion {
    pub fn token(&self) -> &ResumeToken {
        &self.token
    }
}

impl Future for ParkedCompletion {
    type Output = Result<TransmitOutcome, TransmitError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx)
            .poll(cx)
            .map(|received| received.map_err(|_| TransmitError::Abandoned))
    }
}

impl Drop for ParkedCompletion {
    fn drop(&mut self) {
        self.waiting.remove(&self.token);
    }
}

impl std::fmt::Debug for ParkedCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParkedCompletion")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_complete_resumes_parked_waiter() {
        let hub = CompletionHub::new();
        let token = ResumeToken::generate();
        let parked = hub.park(token.clone()).unwrap();
        assert_eq!(hub.parked_count(), 1);

        hub.complete(&token, TransmitOutcome::DELIVERED).await.unwrap();

        assert_eq!(parked.await, Ok(TransmitOutcome::DELIVERED));
        assert_eq!(hub.parked_count(), 0);
    }

    #[tokio::test]
    async fn test_second_completion_is_rejected() {
        let hub = CompletionHub::new();
        let token = ResumeToken::generate();
        let parked = hub.park(token.clone()).unwrap();

        hub.complete(&token, TransmitOutcome::DELIVERED).await.unwrap();
        let second = hub.complete(&token, TransmitOutcome::NOT_DELIVERED).await;

        assert_eq!(
            second,
            Err(CallbackResolutionError::UnknownToken(token.clone()))
        );
        // The waiter saw the first result only
        assert_eq!(parked.await, Ok(TransmitOutcome::DELIVERED));
    }

    #[tokio::test]
    async fn test_unknown_token_is_rejected() {
        let hub = CompletionHub::new();
        let token = ResumeToken::generate();

        let result = hub.complete(&token, TransmitOutcome::DELIVERED).await;
        assert!(matches!(
            result,
            Err(CallbackResolutionError::UnknownToken(_))
        ));
    }

    #[tokio::test]
    async fn test_parking_same_token_twice_fails() {
        let hub = CompletionHub::new();
        let token = ResumeToken::generate();
        let _parked = hub.park(token.clone()).unwrap();

        assert!(matches!(
            hub.park(token),
            Err(CallbackResolutionError::AlreadyParked(_))
        ));
    }

    #[tokio::test]
    async fn test_dropping_waiter_unparks_token() {
        let hub = CompletionHub::new();
        let token = ResumeToken::generate();
        let parked = hub.park(token.clone()).unwrap();

        let timed_out = tokio::time::timeout(Duration::from_millis(10), parked).await;
        assert!(timed_out.is_err());

        assert!(!hub.is_parked(&token));
        let late = hub.complete(&token, TransmitOutcome::DELIVERED).await;
        assert!(matches!(late, Err(CallbackResolutionError::UnknownToken(_))));
    }

    #[tokio::test]
    async fn test_released_waiter_is_abandoned() {
        let hub = CompletionHub::new();
        let token = ResumeToken::generate();
        let parked = hub.park(token.clone()).unwrap();

        assert!(hub.release(&token));
        assert_eq!(parked.await, Err(TransmitError::Abandoned));
    }
}
