//! Transmission gateway.
//!
//! A transmission does not produce its result when it is dispatched. The
//! gateway parks a fresh resume-token, hands that token to the remote
//! system, and returns a pending marker. The real outcome arrives later,
//! out of band, when someone completes the token.

use crate::config::{Config, PARAM_TASK_TOKEN};
use crate::core::{Packet, ResumeToken, TransmitError, TransmitOutcome};
use crate::executor::{CompletionHub, ParkedCompletion};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Attempts delivery of a packet through its current provider.
///
/// This is the seam the delivery state machine drives; it resolves once the
/// outcome is known, however long that takes. Bounding the wait is the
/// caller's job.
#[async_trait]
pub trait Transmitter: Send + Sync {
    async fn transmit(&self, packet: &Packet) -> Result<TransmitOutcome, TransmitError>;
}

/// Hands a resume-token to the remote system that will confirm the transmission.
#[async_trait]
pub trait TokenSubmitter: Send + Sync {
    /// # Errors
    /// Any failure to deliver the token upstream; the gateway does not retry it.
    async fn submit(&self, token: &ResumeToken) -> Result<(), TransmitError>;
}

#[async_trait]
impl<T: TokenSubmitter + ?Sized> TokenSubmitter for Arc<T> {
    async fn submit(&self, token: &ResumeToken) -> Result<(), TransmitError> {
        (**self).submit(token).await
    }
}

/// Posts the token form-encoded to the callback service's `/submit` endpoint.
#[derive(Debug, Clone)]
pub struct HttpTokenSubmitter {
    client: reqwest::Client,
    url: String,
}

impl HttpTokenSubmitter {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .pool_max_idle_per_host(0)
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.submit_url())
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TokenSubmitter for HttpTokenSubmitter {
    async fn submit(&self, token: &ResumeToken) -> Result<(), TransmitError> {
        let response = self
            .client
            .post(&self.url)
            .form(&[(PARAM_TASK_TOKEN, token.as_str())])
            .send()
            .await
            .map_err(|e| TransmitError::Submission(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransmitError::Submission(format!(
                "callback service answered {status}"
            )));
        }
        Ok(())
    }
}

/// Marker returned by [`TransmissionGateway::begin_transmission`]: the result is
/// not available yet.
#[derive(Debug)]
pub struct TransmissionPending {
    pub token: ResumeToken,
    pub completion: ParkedCompletion,
}

impl TransmissionPending {
    /// Suspends until the token is completed (or released).
    pub async fn wait(self) -> Result<TransmitOutcome, TransmitError> {
        self.completion.await
    }
}

/// Dispatches transmissions using the async-completion pattern.
pub struct TransmissionGateway<S> {
    hub: CompletionHub,
    submitter: S,
}

impl<S: TokenSubmitter> TransmissionGateway<S> {
    pub fn new(hub: CompletionHub, submitter: S) -> Self {
        Self { hub, submitter }
    }

    pub fn hub(&self) -> &CompletionHub {
        &self.hub
    }

    /// Parks a fresh token and submits it upstream.
    ///
    /// # Errors
    /// [`TransmitError::Submission`] when the token cannot be parked or
    /// submitted. The parked entry is released before returning.
    pub async fn begin_transmission(
        &self,
        packet: &Packet,
    ) -> Result<TransmissionPending, TransmitError> {
        let token = ResumeToken::generate();
        let completion = self
            .hub
            .park(token.clone())
            .map_err(|e| TransmitError::Submission(e.to_string()))?;

        info!(
            packet.id = packet.id(),
            provider = packet.current_provider(),
            %token,
            "transmitting packet"
        );

        if let Err(e) = self.submitter.submit(&token).await {
            error!(packet.id = packet.id(), %token, error = %e, "failed to submit token to callback service");
            // Dropping the completion unparks the token.
            drop(completion);
            return Err(e);
        }

        debug!(packet.id = packet.id(), %token, "transmission pending");
        Ok(TransmissionPending { token, completion })
    }
}

#[async_trait]
impl<S: TokenSubmitter> Transmitter for TransmissionGateway<S> {
    async fn transmit(&self, packet: &Packet) -> Result<TransmitOutcome, TransmitError> {
        self.begin_transmission(packet).await?.wait().await
    }
}
