//! Simulated asynchronous callback channel.
//!
//! Tokens posted to `/submit` land here. Each one is either dropped (the
//! callback never comes) or scheduled to be resolved as delivered after a
//! random delay. The [`CallbackScanner`](crate::executor::CallbackScanner)
//! calls [`CallbackRegistry::resolve_due`] periodically.

use crate::config::Config;
use crate::core::{ResumeToken, TransmitOutcome};
use crate::executor::ActivityCompleter;
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// What happened to a token handed to [`CallbackRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The callback chance missed; this token will never be resolved.
    Dropped,
    /// The token resolves at `due`.
    Scheduled { due: DateTime<Utc> },
    /// The token was already scheduled; the earlier schedule stands.
    Duplicate,
}

/// A token waiting for its callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCallback {
    pub token: ResumeToken,
    pub due: DateTime<Utc>,
}

/// Result of one [`CallbackRegistry::resolve_due`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub resolved: usize,
    pub failed: usize,
}

impl ScanReport {
    pub fn is_empty(&self) -> bool {
        self.resolved == 0 && self.failed == 0
    }
}

#[derive(Default)]
struct Schedule {
    due_by_token: HashMap<ResumeToken, DateTime<Utc>>,
    // Min-heap by due time; the sequence number keeps equal due times apart.
    index: BinaryHeap<Reverse<(DateTime<Utc>, u64, ResumeToken)>>,
    next_seq: u64,
}

impl Schedule {
    fn insert(&mut self, token: ResumeToken, due: DateTime<Utc>) -> bool {
        if self.due_by_token.contains_key(&token) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.due_by_token.insert(token.clone(), due);
        self.index.push(Reverse((due, seq, token)));
        true
    }

    fn take_due(&mut self, now: DateTime<Utc>) -> Vec<PendingCallback> {
        let mut due = Vec::new();
        while let Some(Reverse((at, _, _))) = self.index.peek() {
            if *at > now {
                break;
            }
            if let Some(Reverse((at, _, token))) = self.index.pop() {
                self.due_by_token.remove(&token);
                due.push(PendingCallback { token, due: at });
            }
        }
        due
    }
}

/// Token-keyed store of pending callbacks.
pub struct CallbackRegistry {
    completer: Arc<dyn ActivityCompleter>,
    callback_chance: u8,
    callback_timeout: Duration,
    schedule: Mutex<Schedule>,
}

impl CallbackRegistry {
    pub fn new(
        completer: Arc<dyn ActivityCompleter>,
        callback_chance: u8,
        callback_timeout: Duration,
    ) -> Self {
        Self {
            completer,
            callback_chance: callback_chance.min(100),
            callback_timeout,
            schedule: Mutex::new(Schedule::default()),
        }
    }

    pub fn from_config(completer: Arc<dyn ActivityCompleter>, config: &Config) -> Self {
        Self::new(completer, config.callback_chance, config.callback_timeout)
    }

    /// Registers `token` relative to the current time.
    pub async fn register(&self, token: ResumeToken) -> Registration {
        self.register_at(token, Utc::now()).await
    }

    /// Rolls the callback chance and, on a hit, schedules `token` at `now`
    /// plus a random whole number of seconds below the callback timeout.
    pub async fn register_at(&self, token: ResumeToken, now: DateTime<Utc>) -> Registration {
        let Some(delay) = self.roll_delay() else {
            info!(%token, "dropping callback");
            return Registration::Dropped;
        };

        let due = now + delay;
        self.schedule_at(token, due).await
    }

    /// Schedules `token` at `due` without rolling the callback chance.
    pub async fn schedule_at(&self, token: ResumeToken, due: DateTime<Utc>) -> Registration {
        let inserted = self.schedule.lock().await.insert(token.clone(), due);
        if inserted {
            info!(%token, %due, "scheduled callback");
            Registration::Scheduled { due }
        } else {
            debug!(%token, "callback already scheduled");
            Registration::Duplicate
        }
    }

    /// Resolves, as delivered, every callback due at or before `now`.
    ///
    /// Completion happens after the lock is released. A completion that fails
    /// is logged and dropped; it is not retried.
    pub async fn resolve_due(&self, now: DateTime<Utc>) -> ScanReport {
        let due = self.schedule.lock().await.take_due(now);

        let mut report = ScanReport::default();
        for callback in due {
            match self
                .completer
                .complete(&callback.token, TransmitOutcome::DELIVERED)
                .await
            {
                Ok(()) => {
                    info!(token = %callback.token, "resolved callback");
                    report.resolved += 1;
                }
                Err(e) => {
                    warn!(token = %callback.token, error = %e, "failed to resolve callback");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Number of callbacks still waiting.
    pub async fn pending_count(&self) -> usize {
        self.schedule.lock().await.due_by_token.len()
    }

    /// Due time of `token`, if it is scheduled.
    pub async fn due_of(&self, token: &ResumeToken) -> Option<DateTime<Utc>> {
        self.schedule.lock().await.due_by_token.get(token).copied()
    }

    fn roll_delay(&self) -> Option<TimeDelta> {
        let mut rng = rand::rng();
        if rng.random_range(0..100u8) >= self.callback_chance {
            return None;
        }
        let secs = rng.random_range(0..self.callback_timeout.as_secs().max(1));
        Some(TimeDelta::seconds(secs as i64))
    }
}
