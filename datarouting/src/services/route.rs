//! Route provider selection.
//!
//! The remote routing service answers "which provider should this packet try
//! next?". It is simulated: a configurable share of calls fail with a network
//! error before any selection happens, and the selection itself is a
//! deterministic scan of the known providers.

use crate::config::Config;
use crate::core::{RouteError, RouteResult};
use async_trait::async_trait;
use rand::Rng;
use tracing::debug;

/// Looks up the next provider for a packet.
#[async_trait]
pub trait RouteSelector: Send + Sync {
    /// Returns the first known provider not in `tried`, or
    /// [`RouteResult::Exhausted`] when every provider has been tried.
    ///
    /// # Errors
    /// [`RouteError::TransientLookup`] when the (simulated) network call fails;
    /// callers are expected to retry it.
    async fn select_route(&self, tried: &[String]) -> Result<RouteResult, RouteError>;
}

/// Routing service with a fixed provider list and random lookup failures.
#[derive(Debug, Clone)]
pub struct SimulatedRouteService {
    providers: Vec<String>,
    error_chance: u8,
}

impl SimulatedRouteService {
    pub fn new(providers: Vec<String>, error_chance: u8) -> Self {
        Self {
            providers,
            error_chance: error_chance.min(100),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.providers.clone(), config.route_error_chance)
    }

    pub fn providers(&self) -> &[String] {
        &self.providers
    }

    /// The selection step alone, without the simulated network failure.
    pub fn next_untried(&self, tried: &[String]) -> RouteResult {
        self.providers
            .iter()
            .find(|provider| !tried.contains(provider))
            .map(|provider| RouteResult::Found(provider.clone()))
            .unwrap_or(RouteResult::Exhausted)
    }

    fn roll_failure(&self) -> bool {
        rand::rng().random_range(0..100u8) < self.error_chance
    }
}

#[async_trait]
impl RouteSelector for SimulatedRouteService {
    async fn select_route(&self, tried: &[String]) -> Result<RouteResult, RouteError> {
        if self.roll_failure() {
            debug!(tried = ?tried, "route lookup failed");
            return Err(RouteError::TransientLookup);
        }

        let result = self.next_untried(tried);
        debug!(tried = ?tried, ?result, "route lookup");
        Ok(result)
    }
}
