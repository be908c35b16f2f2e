//! Delivery state machine.
//!
//! Drives one packet through `SelectingRoute → Transmitting → Evaluating`
//! until it is delivered, no route is left, or the provider budget is spent.
//!
//! Each step is an activity with its own retry policy:
//! - Route lookup: [`RetryPolicy::route_lookup`] (250ms constant, capped at 1s)
//! - Transmission: [`RetryPolicy::NONE`] bounded by a timeout. A failed
//!   provider is replaced, never retried.

use super::retry_helper::{retry_with_policy, Exhausted};
use crate::config::Config;
use crate::core::{
    DeliveryError, DeliveryFailure, DeliveryRequest, Packet, RetryPolicy, RouteResult,
    TransmitError, TransmitOutcome,
};
use crate::services::{RouteSelector, Transmitter};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Where a delivery currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPhase {
    SelectingRoute,
    Transmitting,
    Evaluating,
    Delivered,
    NoRoute,
    BudgetSpent,
}

impl fmt::Display for DeliveryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeliveryPhase::SelectingRoute => "selecting_route",
            DeliveryPhase::Transmitting => "transmitting",
            DeliveryPhase::Evaluating => "evaluating",
            DeliveryPhase::Delivered => "delivered",
            DeliveryPhase::NoRoute => "no_route",
            DeliveryPhase::BudgetSpent => "budget_spent",
        };
        f.write_str(name)
    }
}

/// Activity options of the delivery loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliveryOptions {
    /// Upper bound on a single transmission, including the wait for its callback.
    pub transmit_timeout: Duration,
    pub route_initial_interval: Duration,
    pub route_max_interval: Duration,
    pub route_backoff_multiplier: f64,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            transmit_timeout: crate::config::DEFAULT_TRANSMIT_TIMEOUT,
            route_initial_interval: RetryPolicy::ROUTE_INITIAL_DELAY,
            route_max_interval: RetryPolicy::ROUTE_MAX_DELAY,
            route_backoff_multiplier: 1.0,
        }
    }
}

impl DeliveryOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            transmit_timeout: config.transmit_timeout,
            ..Self::default()
        }
    }

    /// Route lookup policy allowing `max_attempts` attempts.
    pub fn route_policy(&self, max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            initial_delay: self.route_initial_interval,
            max_delay: self.route_max_interval,
            backoff_multiplier: self.route_backoff_multiplier,
            ..RetryPolicy::route_lookup(max_attempts)
        }
    }
}

/// Runs deliveries against a route selector and a transmitter.
///
/// Holds no per-delivery state, so one machine can run many packets
/// concurrently.
#[derive(Clone)]
pub struct DeliveryStateMachine {
    routes: Arc<dyn RouteSelector>,
    transmitter: Arc<dyn Transmitter>,
    options: DeliveryOptions,
}

impl DeliveryStateMachine {
    pub fn new(
        routes: Arc<dyn RouteSelector>,
        transmitter: Arc<dyn Transmitter>,
        options: DeliveryOptions,
    ) -> Self {
        Self {
            routes,
            transmitter,
            options,
        }
    }

    /// Delivers `request.packet`, returning it in its final state.
    ///
    /// # Errors
    /// [`DeliveryError::RouteLookupExhausted`] when a route lookup keeps
    /// failing. The returned [`DeliveryFailure`] carries the packet as it was
    /// when the lookup gave up.
    pub async fn run(&self, request: DeliveryRequest) -> Result<Packet, DeliveryFailure> {
        let DeliveryRequest {
            mut packet,
            route_max_attempts,
            transmit_max_attempts,
        } = request;
        let route_policy = self.options.route_policy(route_max_attempts);

        info!(
            packet.id = packet.id(),
            route_max_attempts, transmit_max_attempts, "starting delivery"
        );

        while !packet.is_delivered() && packet.attempts() < transmit_max_attempts {
            debug!(packet.id = packet.id(), phase = %DeliveryPhase::SelectingRoute);
            let selection = self.select_route(&packet, route_policy).await;
            let provider = match selection {
                Ok(RouteResult::Found(provider)) => provider,
                Ok(RouteResult::Exhausted) => {
                    packet.mark_no_route();
                    info!(packet.id = packet.id(), phase = %DeliveryPhase::NoRoute, failed = ?packet.failed_providers(), "no route left");
                    return Ok(packet);
                }
                Err(Exhausted { attempts, error }) => {
                    error!(packet.id = packet.id(), attempts, error = %error, "route lookup exhausted");
                    return Err(DeliveryFailure {
                        packet,
                        error: DeliveryError::RouteLookupExhausted {
                            attempts,
                            source: error,
                        },
                    });
                }
            };

            if !packet.set_current_provider(provider.as_str()) {
                // A selector handing back a failed provider has nothing new to offer.
                warn!(packet.id = packet.id(), %provider, "route service returned a provider that already failed");
                packet.mark_no_route();
                return Ok(packet);
            }

            debug!(packet.id = packet.id(), phase = %DeliveryPhase::Transmitting, %provider);
            let outcome = self.transmit(&packet).await;

            debug!(packet.id = packet.id(), phase = %DeliveryPhase::Evaluating, %provider);
            match outcome {
                Ok(TransmitOutcome { delivered: true }) => {
                    packet.mark_delivered();
                    info!(packet.id = packet.id(), phase = %DeliveryPhase::Delivered, %provider, "packet delivered");
                }
                Ok(TransmitOutcome { delivered: false }) => {
                    packet.record_failure();
                    warn!(packet.id = packet.id(), %provider, "provider did not deliver");
                }
                Err(e) => {
                    packet.record_failure();
                    error!(packet.id = packet.id(), %provider, error = %e, "transmission failed");
                }
            }
        }

        if !packet.is_delivered() {
            info!(
                packet.id = packet.id(),
                phase = %DeliveryPhase::BudgetSpent,
                attempts = packet.attempts(),
                "provider budget spent"
            );
        }
        Ok(packet)
    }

    async fn select_route(
        &self,
        packet: &Packet,
        policy: RetryPolicy,
    ) -> Result<RouteResult, Exhausted<crate::core::RouteError>> {
        let tried = packet.failed_providers();
        retry_with_policy(policy, |attempt| {
            debug!(packet.id = packet.id(), attempt, "looking up route");
            self.routes.select_route(tried)
        })
        .await
    }

    async fn transmit(&self, packet: &Packet) -> Result<TransmitOutcome, TransmitError> {
        let timeout = self.options.transmit_timeout;
        let result = retry_with_policy(RetryPolicy::NONE, |_attempt| async move {
            tokio::time::timeout(timeout, self.transmitter.transmit(packet))
                .await
                .unwrap_or(Err(TransmitError::Timeout(timeout)))
        })
        .await;
        result.map_err(|exhausted| exhausted.error)
    }
}
