//! Remote collaborators of the delivery loop.
//!
//! - [`route`]: provider selection with simulated lookup failures
//! - [`transmit`]: async-completion transmission gateway
//! - [`callback`]: simulated callback channel resolving tokens after a delay
//! - [`http`]: `POST /submit` and `POST /deliver` routers and their listener component

pub mod callback;
pub mod http;
pub mod route;
pub mod transmit;

pub use callback::{CallbackRegistry, PendingCallback, Registration, ScanReport};
pub use http::{delivery_router, router, HttpListener};
pub use route::{RouteSelector, SimulatedRouteService};
pub use transmit::{
    HttpTokenSubmitter, TokenSubmitter, TransmissionGateway, TransmissionPending, Transmitter,
};
