//! Core types for the datarouting delivery engine.
//!
//! # Domain Model
//! - [`Packet`]: The unit of data being routed, with its routing state
//! - [`PacketStatus`]: `STATUS_PENDING`, `STATUS_NO_ROUTE`, `STATUS_DELIVERED`
//! - [`DeliveryRequest`]: A packet plus its route and transmit attempt budgets
//! - [`RouteResult`]: Answer of a route lookup (found or exhausted)
//! - [`TransmitOutcome`]: Payload a resumed transmission receives
//! - [`ResumeToken`]: One-time token correlating a parked transmission with its callback
//!
//! # Error Handling
//! - [`RouteError`], [`TransmitError`], [`CallbackResolutionError`], [`DeliveryError`]
//! - [`DeliveryFailure`]: A failed delivery that still carries its packet
//!
//! # Retry Behavior
//! - [`RetryPolicy`]: Attempts and backoff for an activity
//! - [`RetryableError`]: Which errors deserve another attempt
//!
//! # Example
//!
//! ```
//! use datarouting::core::{DeliveryRequest, Packet, PacketStatus};
//!
//! let packet = Packet::new("00000000-0000-0000-0000-000000000000", "+017771110000", "+016660002222", "Hello");
//! assert_eq!(packet.status(), PacketStatus::NoRoute);
//!
//! let request = DeliveryRequest::new(packet, 3, 4);
//! assert_eq!(request.transmit_max_attempts, 4);
//! ```

mod activity;
mod error;
mod packet;
pub mod retry;
mod token;

pub use activity::{DeliveryRequest, RouteResult, TransmitOutcome};
pub use error::{
    BoxError, CallbackResolutionError, DeliveryError, DeliveryFailure, RouteError, TransmitError,
};
pub use packet::{Packet, PacketStatus};
pub use retry::{RetryPolicy, RetryableError};
pub use token::{InvalidToken, ResumeToken};
