// Module organization, one hidden decision per module:
// - retry_helper: how attempts are counted and spaced
// - signal: how a parked transmission is found and resumed by token
// - delivery: the route/transmit/evaluate loop for a single packet
// - driver: how deliveries are queued and run concurrently
// - scanner: when due callbacks get resolved
// - supervisor: start order, stop order and signal handling
mod delivery;
mod driver;
mod retry_helper;
mod scanner;
mod signal;
mod supervisor;

pub use delivery::{DeliveryOptions, DeliveryPhase, DeliveryStateMachine};
pub use driver::{DeliveryClient, DeliveryDriver, SubmitError, DEFAULT_QUEUE_CAPACITY};
pub use retry_helper::{retry_with_policy, Exhausted};
pub use scanner::CallbackScanner;
pub use signal::{ActivityCompleter, CompletionHub, ParkedCompletion};
pub use supervisor::{
    wait_for_shutdown_signal, Component, ComponentExit, ShutdownReport, Supervisor,
    SupervisorHandle,
};
