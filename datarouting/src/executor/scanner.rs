//! Background scanner that resolves due callbacks.
//!
//! Every `scan_interval` it asks the [`CallbackRegistry`] to resolve what is
//! due. A scan that has started always runs to completion; cancellation is
//! only observed between scans.

use super::supervisor::Component;
use crate::config::Config;
use crate::core::BoxError;
use crate::services::CallbackRegistry;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Periodic resolver of due callbacks.
///
/// # Example
/// ```ignore
/// let scanner = CallbackScanner::new(registry)
///     .with_scan_interval(Duration::from_millis(100));
///
/// let handle = Supervisor::new().with_component(scanner).start();
/// ```
pub struct CallbackScanner {
    registry: Arc<CallbackRegistry>,
    scan_interval: Duration,
}

impl CallbackScanner {
    /// Creates a scanner with the default 1 second interval.
    pub fn new(registry: Arc<CallbackRegistry>) -> Self {
        Self {
            registry,
            scan_interval: crate::config::DEFAULT_SCAN_INTERVAL,
        }
    }

    pub fn from_config(registry: Arc<CallbackRegistry>, config: &Config) -> Self {
        Self::new(registry).with_scan_interval(config.scan_interval)
    }

    /// Sets the scan period. Shorter periods fire callbacks closer to their due time.
    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn scan_interval(&self) -> Duration {
        self.scan_interval
    }
}

#[async_trait]
impl Component for CallbackScanner {
    fn name(&self) -> &str {
        "callback-scanner"
    }

    async fn run(&self, shutdown: CancellationToken) -> Result<(), BoxError> {
        info!(scan_interval = ?self.scan_interval, "callback scanner started");

        let mut ticker = tokio::time::interval(self.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.registry.resolve_due(Utc::now()).await;
                    if !report.is_empty() {
                        debug!(resolved = report.resolved, failed = report.failed, "callback scan finished");
                    }
                }
            }
        }

        info!("callback scanner stopped cleanly");
        Ok(())
    }
}
