//! Delivery driver: runs submitted deliveries as supervised background work.
//!
//! [`DeliveryClient`] handles send requests over a channel; the
//! [`DeliveryDriver`] component runs one [`DeliveryStateMachine`] per request
//! on a `JoinSet` and replies with the final packet. Different packets run
//! concurrently and share no mutable state.

use super::delivery::DeliveryStateMachine;
use super::supervisor::Component;
use crate::core::{BoxError, DeliveryFailure, DeliveryRequest, Packet};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error(transparent)]
    Delivery(#[from] DeliveryFailure),

    /// The driver stopped before the delivery finished.
    #[error("delivery driver is not running")]
    DriverStopped,
}

struct Job {
    request: DeliveryRequest,
    reply: oneshot::Sender<Result<Packet, DeliveryFailure>>,
}

/// Cheap, cloneable handle for submitting deliveries.
#[derive(Clone)]
pub struct DeliveryClient {
    jobs: mpsc::Sender<Job>,
}

impl DeliveryClient {
    /// Submits a delivery and waits for its final packet.
    ///
    /// # Errors
    /// [`SubmitError::Delivery`] when the delivery itself failed, or
    /// [`SubmitError::DriverStopped`] when the driver is gone or stopped
    /// before finishing it.
    pub async fn submit(&self, request: DeliveryRequest) -> Result<Packet, SubmitError> {
        let (reply, response) = oneshot::channel();
        self.jobs
            .send(Job { request, reply })
            .await
            .map_err(|_| SubmitError::DriverStopped)?;

        let packet = response.await.map_err(|_| SubmitError::DriverStopped)??;
        Ok(packet)
    }
}

/// Supervised component executing deliveries.
pub struct DeliveryDriver {
    machine: DeliveryStateMachine,
    jobs: Mutex<Option<mpsc::Receiver<Job>>>,
}

impl DeliveryDriver {
    /// Creates the driver and the client that feeds it.
    ///
    /// The driver exits on its own once every client is dropped and the
    /// in-flight deliveries have finished.
    pub fn new(machine: DeliveryStateMachine) -> (Self, DeliveryClient) {
        Self::with_capacity(machine, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(machine: DeliveryStateMachine, capacity: usize) -> (Self, DeliveryClient) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let driver = Self {
            machine,
            jobs: Mutex::new(Some(rx)),
        };
        (driver, DeliveryClient { jobs: tx })
    }

    fn spawn_delivery(&self, in_flight: &mut JoinSet<()>, job: Job) {
        let machine = self.machine.clone();
        in_flight.spawn(async move {
            let packet_id = job.request.packet.id().to_string();
            let result = machine.run(job.request).await;
            if job.reply.send(result).is_err() {
                debug!(packet.id = %packet_id, "submitter went away before delivery finished");
            }
        });
    }
}

fn log_join(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "delivery task panicked");
        }
    }
}

#[async_trait]
impl Component for DeliveryDriver {
    fn name(&self) -> &str {
        "delivery-driver"
    }

    async fn run(&self, shutdown: CancellationToken) -> Result<(), BoxError> {
        let mut jobs = self
            .jobs
            .lock()
            .await
            .take()
            .ok_or("delivery driver can only be started once")?;
        let mut in_flight = JoinSet::new();

        info!("delivery driver started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    if !in_flight.is_empty() {
                        warn!(in_flight = in_flight.len(), "aborting in-flight deliveries");
                    }
                    in_flight.abort_all();
                    break;
                }
                Some(result) = in_flight.join_next(), if !in_flight.is_empty() => log_join(result),
                job = jobs.recv() => match job {
                    Some(job) => self.spawn_delivery(&mut in_flight, job),
                    None => {
                        debug!("all delivery clients dropped");
                        // Finish what is running, unless cancelled first.
                        loop {
                            tokio::select! {
                                biased;
                                _ = shutdown.cancelled() => {
                                    in_flight.abort_all();
                                    break;
                                }
                                next = in_flight.join_next() => match next {
                                    Some(result) => log_join(result),
                                    None => break,
                                },
                            }
                        }
                        break;
                    }
                },
            }
        }

        while let Some(result) = in_flight.join_next().await {
            log_join(result);
        }
        info!("delivery driver stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PacketStatus, RouteError, RouteResult, TransmitError, TransmitOutcome};
    use crate::executor::DeliveryOptions;
    use crate::services::{RouteSelector, Transmitter};
    use std::sync::Arc;
    use std::time::Duration;

    struct FirstProvider;

    #[async_trait]
    impl RouteSelector for FirstProvider {
        async fn select_route(&self, tried: &[String]) -> Result<RouteResult, RouteError> {
            if tried.is_empty() {
                Ok(RouteResult::Found("RouteA".into()))
            } else {
                Ok(RouteResult::Exhausted)
            }
        }
    }

    struct Immediate;

    #[async_trait]
    impl Transmitter for Immediate {
        async fn transmit(&self, _packet: &Packet) -> Result<TransmitOutcome, TransmitError> {
            Ok(TransmitOutcome::DELIVERED)
        }
    }

    struct Hanging;

    #[async_trait]
    impl Transmitter for Hanging {
        async fn transmit(&self, _packet: &Packet) -> Result<TransmitOutcome, TransmitError> {
            std::future::pending().await
        }
    }

    fn machine(transmitter: Arc<dyn Transmitter>) -> DeliveryStateMachine {
        DeliveryStateMachine::new(Arc::new(FirstProvider), transmitter, DeliveryOptions::default())
    }

    fn request(id: &str) -> DeliveryRequest {
        DeliveryRequest::new(Packet::new(id, "a", "b", "Hello"), 3, 4)
    }

    #[tokio::test]
    async fn test_submitted_deliveries_complete_concurrently() {
        let (driver, client) = DeliveryDriver::new(machine(Arc::new(Immediate)));
        let shutdown = CancellationToken::new();
        let task = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { driver.run(shutdown).await }
        });

        let (first, second) = tokio::join!(
            client.submit(request("p-1")),
            client.submit(request("p-2"))
        );

        let first = first.unwrap();
        let second = second.unwrap();
        assert_eq!(first.id(), "p-1");
        assert_eq!(second.id(), "p-2");
        assert_eq!(first.status(), PacketStatus::Delivered);
        assert_eq!(second.status(), PacketStatus::Delivered);

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancellation_aborts_in_flight_delivery() {
        let (driver, client) = DeliveryDriver::new(machine(Arc::new(Hanging)));
        let shutdown = CancellationToken::new();
        let task = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { driver.run(shutdown).await }
        });

        let pending = tokio::spawn({
            let client = client.clone();
            async move { client.submit(request("p-1")).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(pending.await.unwrap(), Err(SubmitError::DriverStopped));
        assert_eq!(
            client.submit(request("p-2")).await,
            Err(SubmitError::DriverStopped)
        );
    }

    #[tokio::test]
    async fn test_driver_exits_when_clients_dropped() {
        let (driver, client) = DeliveryDriver::new(machine(Arc::new(Immediate)));
        drop(client);

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            driver.run(CancellationToken::new()),
        )
        .await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}
