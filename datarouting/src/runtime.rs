//! Process wiring.
//!
//! [`Runtime::start`] builds every service from one [`Config`] and starts the
//! supervised components. The listener serves both the callback endpoint and
//! the delivery endpoint. Stop order: HTTP listener, callback scanner,
//! delivery driver.

use crate::config::Config;
use crate::core::BoxError;
use crate::executor::{
    CallbackScanner, CompletionHub, DeliveryClient, DeliveryDriver, DeliveryOptions,
    DeliveryStateMachine, ShutdownReport, Supervisor, SupervisorHandle,
};
use crate::services::{
    delivery_router, router, CallbackRegistry, HttpListener, HttpTokenSubmitter,
    SimulatedRouteService, TransmissionGateway,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// A running delivery process.
pub struct Runtime {
    config: Arc<Config>,
    hub: CompletionHub,
    registry: Arc<CallbackRegistry>,
    client: DeliveryClient,
    local_addr: SocketAddr,
    supervisor: SupervisorHandle,
}

impl Runtime {
    /// Binds the listener on `0.0.0.0:<config.port>` and starts all components.
    ///
    /// With `port = 0` the OS picks a free port; the gateway posts to whichever
    /// port was bound.
    ///
    /// # Errors
    /// Returns an error if the listener cannot bind.
    pub async fn start(config: Arc<Config>) -> Result<Self, BoxError> {
        Self::start_on(config.clone(), SocketAddr::from(([0, 0, 0, 0], config.port))).await
    }

    /// Like [`start`](Self::start), binding `addr` instead.
    pub async fn start_on(config: Arc<Config>, addr: SocketAddr) -> Result<Self, BoxError> {
        let hub = CompletionHub::new();
        let registry = Arc::new(CallbackRegistry::from_config(Arc::new(hub.clone()), &config));

        let socket = TcpListener::bind(addr).await?;
        let local_addr = socket.local_addr()?;

        let submitter = HttpTokenSubmitter::new(config.submit_url_on(local_addr.port()));
        let gateway = TransmissionGateway::new(hub.clone(), submitter);
        let machine = DeliveryStateMachine::new(
            Arc::new(SimulatedRouteService::from_config(&config)),
            Arc::new(gateway),
            DeliveryOptions::from_config(&config),
        );
        let (driver, client) = DeliveryDriver::new(machine);
        let scanner = CallbackScanner::from_config(registry.clone(), &config);
        let app = router(registry.clone()).merge(delivery_router(client.clone()));
        let listener = HttpListener::from_listener(socket, app)?;

        let supervisor = Supervisor::new()
            .with_component(listener)
            .with_component(scanner)
            .with_component(driver)
            .start();

        info!(addr = %local_addr, providers = ?config.providers, "datarouting runtime started");

        Ok(Self {
            config,
            hub,
            registry,
            client,
            local_addr,
            supervisor,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Client for submitting deliveries to this process.
    pub fn client(&self) -> DeliveryClient {
        self.client.clone()
    }

    pub fn hub(&self) -> &CompletionHub {
        &self.hub
    }

    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs until `signal` resolves or a component exits, then stops in order.
    pub async fn run_until<F>(self, signal: F) -> ShutdownReport
    where
        F: Future<Output = ()>,
    {
        self.supervisor.wait_until(signal).await
    }

    pub async fn shutdown(self) -> ShutdownReport {
        self.supervisor.shutdown().await
    }
}
