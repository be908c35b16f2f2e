//! Datarouting: durable-style packet delivery with fallback providers
//!
//! `datarouting` delivers a data packet by repeatedly asking a routing service
//! for a provider, transmitting through it, and falling back to the next
//! provider until the packet is delivered or no provider is left.
//!
//! # Features
//!
//! - **Two retry policies**: route lookups retry transient failures; transmissions never retry
//! - **Async completion**: a transmission parks on a one-time token and resumes when the token is completed
//! - **Unreliable callbacks**: a simulated callback service answers late, never, or exactly once
//! - **Supervised process**: listener, scanner and driver start together and stop in order
//!
//! # Quick Start
//!
//! ```ignore
//! use datarouting::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), BoxError> {
//!     let config = Arc::new(Config::from_env());
//!     let runtime = Runtime::start(config.clone()).await?;
//!
//!     let packet = Packet::new(Uuid::new_v4().to_string(), "+017771110000", "+016660002222", "Hello");
//!     let delivered = runtime.client().submit(DeliveryRequest::with_defaults(packet, &config)).await?;
//!     println!("{}", delivered.status());
//!
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`core`]: Packet model, errors, retry policy, resume tokens
//! - [`config`]: Immutable process configuration
//! - [`services`]: Route selector, transmission gateway, callback registry, HTTP surface
//! - [`executor`]: Retry helper, completion hub, delivery state machine, driver, scanner, supervisor
//! - [`runtime`]: Wires everything into a running process

pub mod config;
pub mod core;
pub mod executor;
pub mod runtime;
pub mod services;

pub use config::Config;

pub use core::{
    BoxError, CallbackResolutionError, DeliveryError, DeliveryFailure, DeliveryRequest, Packet,
    PacketStatus, ResumeToken, RetryPolicy, RetryableError, RouteError, RouteResult,
    TransmitError, TransmitOutcome,
};

pub use executor::{
    retry_with_policy, wait_for_shutdown_signal, ActivityCompleter, CallbackScanner,
    CompletionHub, Component, DeliveryClient, DeliveryDriver, DeliveryOptions,
    DeliveryStateMachine, ShutdownReport, SubmitError, Supervisor, SupervisorHandle,
};

pub use runtime::Runtime;

pub use services::{
    delivery_router, router, CallbackRegistry, HttpListener, HttpTokenSubmitter, RouteSelector,
    SimulatedRouteService, TransmissionGateway, Transmitter,
};

/// Prelude module for convenient glob imports
///
/// # Example
///
/// ```ignore
/// use datarouting::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::Config;

    pub use crate::core::{
        BoxError, DeliveryFailure, DeliveryRequest, Packet, PacketStatus, ResumeToken,
        RetryPolicy, TransmitOutcome,
    };

    pub use crate::executor::{
        wait_for_shutdown_signal, Component, DeliveryClient, SubmitError, Supervisor,
    };

    pub use crate::runtime::Runtime;

    pub use std::sync::Arc;
    pub use uuid::Uuid;
}
