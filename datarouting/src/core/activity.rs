use super::packet::Packet;
use crate::config::Config;
use serde::{Deserialize, Serialize};

/// Input to a delivery: the packet plus its two attempt budgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub packet: Packet,
    /// Attempts allowed for each route lookup before the delivery gives up.
    pub route_max_attempts: u32,
    /// Distinct providers to try before the delivery gives up.
    pub transmit_max_attempts: usize,
}

impl DeliveryRequest {
    pub fn new(packet: Packet, route_max_attempts: u32, transmit_max_attempts: usize) -> Self {
        Self {
            packet,
            route_max_attempts,
            transmit_max_attempts,
        }
    }

    /// Builds a request whose budgets come from `config`.
    pub fn with_defaults(packet: Packet, config: &Config) -> Self {
        Self::new(
            packet,
            config.route_max_attempts,
            config.transmit_max_attempts,
        )
    }
}

/// Answer of a route lookup.
///
/// `Exhausted` is a normal business outcome, not an error: every known
/// provider has already been tried for this packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteResult {
    Found(String),
    Exhausted,
}

/// Result payload a resumed transmission receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransmitOutcome {
    pub delivered: bool,
}

impl TransmitOutcome {
    pub const DELIVERED: Self = Self { delivered: true };
    pub const NOT_DELIVERED: Self = Self { delivered: false };
}
