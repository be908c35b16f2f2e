//! Process supervisor.
//!
//! Owns the long-running components of the process (HTTP listener, callback
//! scanner, delivery driver) and stops them in a fixed order.
//!
//! # Lifecycle
//! 1. Build: `Supervisor::new().with_component(a).with_component(b)`
//! 2. Start: `.start()` spawns every component and returns a [`SupervisorHandle`]
//! 3. Stop: `handle.shutdown().await`, or `handle.wait().await` to stop once
//!    any component exits on its own
//!
//! Each component gets a child of the supervisor's root [`CancellationToken`].
//! Shutdown cancels components one at a time, in registration order, waiting
//! up to `stop_timeout` for each before aborting it.

use crate::core::BoxError;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A long-running unit owned by the [`Supervisor`].
///
/// `run` must return promptly once `shutdown` is cancelled. Returning early
/// (with or without an error) makes [`SupervisorHandle::wait`] stop the rest
/// of the process.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn run(&self, shutdown: CancellationToken) -> Result<(), BoxError>;
}

/// How a component ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentExit {
    /// `run` returned `Ok`.
    Stopped,
    /// `run` returned an error.
    Failed(String),
    /// The task panicked.
    Panicked(String),
    /// The component ignored cancellation for longer than the stop timeout.
    Aborted,
}

impl ComponentExit {
    pub fn is_clean(&self) -> bool {
        matches!(self, ComponentExit::Stopped)
    }
}

impl fmt::Display for ComponentExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentExit::Stopped => f.write_str("stopped"),
            ComponentExit::Failed(e) => write!(f, "failed: {e}"),
            ComponentExit::Panicked(e) => write!(f, "panicked: {e}"),
            ComponentExit::Aborted => f.write_str("aborted after stop timeout"),
        }
    }
}

/// Exit of every component, in the order they were stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub exits: Vec<(String, ComponentExit)>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.exits.iter().all(|(_, exit)| exit.is_clean())
    }

    pub fn exit_of(&self, name: &str) -> Option<&ComponentExit> {
        self.exits
            .iter()
            .find(|(component, _)| component == name)
            .map(|(_, exit)| exit)
    }

    pub fn order(&self) -> Vec<&str> {
        self.exits.iter().map(|(name, _)| name.as_str()).collect()
    }
}

pub struct Supervisor {
    components: Vec<Arc<dyn Component>>,
    stop_timeout: Duration,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new() -> Self {
        Self {
            components: Vec::new(),
            stop_timeout: Self::DEFAULT_STOP_TIMEOUT,
        }
    }

    /// Adds a component. Components stop in the order they were added.
    pub fn with_component(mut self, component: impl Component) -> Self {
        self.components.push(Arc::new(component));
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Spawns every component on the current runtime.
    pub fn start(self) -> SupervisorHandle {
        let root = CancellationToken::new();
        let (exited_tx, exited_rx) = mpsc::unbounded_channel();

        let running = self
            .components
            .into_iter()
            .map(|component| {
                let name = component.name().to_string();
                let token = root.child_token();
                let exited = exited_tx.clone();
                let task_token = token.clone();
                let task_name = name.clone();

                let handle = tokio::spawn(async move {
                    let result = component.run(task_token).await;
                    let _ = exited.send(task_name);
                    result
                });

                info!(component = %name, "component started");
                Running {
                    name,
                    token,
                    handle,
                }
            })
            .collect();

        SupervisorHandle {
            root,
            running,
            stop_timeout: self.stop_timeout,
            exited: exited_rx,
        }
    }
}

struct Running {
    name: String,
    token: CancellationToken,
    handle: JoinHandle<Result<(), BoxError>>,
}

/// Handle to a started [`Supervisor`].
///
/// Dropping it without calling `shutdown` or `wait` leaves the components running.
pub struct SupervisorHandle {
    root: CancellationToken,
    running: Vec<Running>,
    stop_timeout: Duration,
    exited: mpsc::UnboundedReceiver<String>,
}

impl SupervisorHandle {
    /// Root token. Cancelling it cancels every component at once; prefer
    /// [`shutdown`](Self::shutdown) for an ordered stop.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.root
    }

    /// Resolves when any component exits on its own or the root token is
    /// cancelled, then stops everything that is left.
    pub async fn wait(self) -> ShutdownReport {
        self.wait_until(std::future::pending()).await
    }

    /// Like [`wait`](Self::wait), but also stops everything once `signal` resolves.
    ///
    /// ```ignore
    /// let report = handle.wait_until(async {
    ///     let _ = wait_for_shutdown_signal().await;
    /// }).await;
    /// ```
    pub async fn wait_until<F>(mut self, signal: F) -> ShutdownReport
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = signal => info!("shutdown requested"),
            _ = self.root.cancelled() => info!("supervisor cancelled"),
            exited = self.exited.recv() => match exited {
                Some(name) => warn!(component = %name, "component exited on its own"),
                None => info!("no components left running"),
            },
        }
        self.shutdown().await
    }

    /// Stops every component in registration order.
    pub async fn shutdown(self) -> ShutdownReport {
        info!("supervisor shutting down");
        let mut report = ShutdownReport::default();

        for Running {
            name,
            token,
            mut handle,
        } in self.running
        {
            token.cancel();
            let exit = match tokio::time::timeout(self.stop_timeout, &mut handle).await {
                Ok(Ok(Ok(()))) => ComponentExit::Stopped,
                Ok(Ok(Err(e))) => ComponentExit::Failed(e.to_string()),
                Ok(Err(join_error)) => ComponentExit::Panicked(join_error.to_string()),
                Err(_) => {
                    handle.abort();
                    ComponentExit::Aborted
                }
            };

            if exit.is_clean() {
                info!(component = %name, "component stopped");
            } else {
                error!(component = %name, %exit, "component did not stop cleanly");
            }
            report.exits.push((name, exit));
        }

        self.root.cancel();
        info!(clean = report.is_clean(), "supervisor stopped");
        report
    }
}

/// Waits for a termination signal.
///
/// Unix: `SIGINT`, `SIGTERM` or `SIGQUIT`. Elsewhere: Ctrl-C.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Waits for a termination signal.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
