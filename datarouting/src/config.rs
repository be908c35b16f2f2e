//! Process configuration.
//!
//! Built once at startup from environment variables and shared immutably
//! (behind an `Arc`) with every component that needs it. Every variable is
//! optional; a missing or unparseable value falls back to its default.

use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_PORT: u16 = 9091;
pub const DEFAULT_ROUTE_ERROR_CHANCE: u8 = 10;
pub const DEFAULT_CALLBACK_CHANCE: u8 = 90;
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_ROUTE_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_TRANSMIT_MAX_ATTEMPTS: usize = 4;
pub const DEFAULT_TRANSMIT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_PROVIDERS: [&str; 5] = ["RouteA", "RouteB", "RouteC", "RouteD", "RouteE"];

/// Path of the inbound callback endpoint.
pub const SUBMIT_PATH: &str = "/submit";
/// Path of the delivery endpoint a worker exposes to submitters.
pub const DELIVER_PATH: &str = "/deliver";
/// Form field carrying the resume-token.
pub const PARAM_TASK_TOKEN: &str = "task_token";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Port the inbound listener binds to.
    pub port: u16,
    /// Host the transmission gateway posts tokens to.
    pub callback_host: String,
    /// Percent chance (0..=99) that a route lookup fails.
    pub route_error_chance: u8,
    /// Percent chance (0..=100) that a registered callback is ever honored.
    pub callback_chance: u8,
    /// Upper bound (exclusive) of the callback delay.
    pub callback_timeout: Duration,
    /// Known providers, in selection order.
    pub providers: Vec<String>,
    pub route_max_attempts: u32,
    pub transmit_max_attempts: usize,
    /// How long a transmission may stay parked before it counts as failed.
    pub transmit_timeout: Duration,
    /// Period of the callback scanner.
    pub scan_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            callback_host: "localhost".to_string(),
            route_error_chance: DEFAULT_ROUTE_ERROR_CHANCE,
            callback_chance: DEFAULT_CALLBACK_CHANCE,
            callback_timeout: Duration::from_secs(DEFAULT_CALLBACK_TIMEOUT_SECS),
            providers: DEFAULT_PROVIDERS.iter().map(|p| p.to_string()).collect(),
            route_max_attempts: DEFAULT_ROUTE_MAX_ATTEMPTS,
            transmit_max_attempts: DEFAULT_TRANSMIT_MAX_ATTEMPTS,
            transmit_timeout: DEFAULT_TRANSMIT_TIMEOUT,
            scan_interval: DEFAULT_SCAN_INTERVAL,
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let providers = lookup("route_providers")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty())
            .unwrap_or(defaults.providers);

        Self {
            port: parse_or(&lookup, "demo_port", defaults.port),
            callback_host: lookup("callback_host")
                .filter(|h| !h.trim().is_empty())
                .unwrap_or(defaults.callback_host),
            route_error_chance: parse_percent(
                &lookup,
                "error_chance",
                defaults.route_error_chance,
                99,
            ),
            callback_chance: parse_percent(
                &lookup,
                "callback_chance",
                defaults.callback_chance,
                100,
            ),
            callback_timeout: Duration::from_secs(
                parse_or(&lookup, "callback_timeout_secs", DEFAULT_CALLBACK_TIMEOUT_SECS).max(1),
            ),
            providers,
            route_max_attempts: parse_or(&lookup, "route_max_attempts", defaults.route_max_attempts)
                .max(1),
            transmit_max_attempts: parse_or(
                &lookup,
                "transmit_max_attempts",
                defaults.transmit_max_attempts,
            ),
            transmit_timeout: Duration::from_secs(parse_or(
                &lookup,
                "transmit_timeout_secs",
                DEFAULT_TRANSMIT_TIMEOUT.as_secs(),
            )),
            scan_interval: Duration::from_millis(
                parse_or(
                    &lookup,
                    "scan_interval_ms",
                    DEFAULT_SCAN_INTERVAL.as_millis() as u64,
                )
                .max(1),
            ),
        }
    }

    /// URL the transmission gateway posts resume-tokens to.
    pub fn submit_url(&self) -> String {
        self.submit_url_on(self.port)
    }

    /// Same as [`submit_url`](Self::submit_url) for a listener bound to `port`.
    pub fn submit_url_on(&self, port: u16) -> String {
        format!("http://{}:{}{}", self.callback_host, port, SUBMIT_PATH)
    }

    /// URL a submitter posts deliveries to; the worker runs on `callback_host`.
    pub fn deliver_url(&self) -> String {
        format!("http://{}:{}{}", self.callback_host, self.port, DELIVER_PATH)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Debug,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, ?default, "ignoring unparseable config value");
                default
            }
        },
    }
}

/// Parses a percentage, clamping out-of-range values into `0..=max`.
fn parse_percent<F>(lookup: &F, key: &str, default: u8, max: u8) -> u8
where
    F: Fn(&str) -> Option<String>,
{
    let raw: i64 = parse_or(lookup, key, i64::from(default));
    raw.clamp(0, i64::from(max)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config, Config::default());
        assert_eq!(config.port, 9091);
        assert_eq!(config.route_error_chance, 10);
        assert_eq!(config.callback_chance, 90);
        assert_eq!(config.callback_timeout, Duration::from_secs(15));
        assert_eq!(config.route_max_attempts, 3);
        assert_eq!(config.transmit_max_attempts, 4);
        assert_eq!(config.providers.len(), 5);
        assert_eq!(config.submit_url(), "http://localhost:9091/submit");
        assert_eq!(config.submit_url_on(40123), "http://localhost:40123/submit");
        assert_eq!(config.deliver_url(), "http://localhost:9091/deliver");
    }

    #[test]
    fn test_overrides_and_clamping() {
        let config = config_from(&[
            ("demo_port", "8080"),
            ("error_chance", "150"),
            ("callback_chance", "250"),
            ("route_providers", "Alpha, Beta,,Gamma"),
            ("transmit_max_attempts", "2"),
        ]);

        assert_eq!(config.port, 8080);
        assert_eq!(config.route_error_chance, 99);
        assert_eq!(config.callback_chance, 100);
        assert_eq!(config.providers, vec!["Alpha", "Beta", "Gamma"]);
        assert_eq!(config.transmit_max_attempts, 2);
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = config_from(&[
            ("demo_port", "not-a-port"),
            ("error_chance", "-5"),
            ("route_providers", " , "),
        ]);

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.route_error_chance, 0);
        assert_eq!(config.providers, Config::default().providers);
    }
}
