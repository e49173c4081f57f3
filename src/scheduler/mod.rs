//! Per-watch polling timers
//!
//! Every scheduled watch gets its own tokio task driving a
//! [`tokio::time::interval`]. Each firing hands the watch's task record to a
//! single [`TickHandler`]. The loop awaits the handler before waiting for the
//! next tick, so firings for one key never overlap, and missed ticks are
//! skipped rather than bunched up.
//!
//! # Example
//!
//! ```no_run
//! use mirror_watch::scheduler::{ScheduledWatch, Scheduler, TickHandler};
//! use mirror_watch::types::{ResourceWatch, Variant};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct Print;
//!
//! #[async_trait::async_trait]
//! impl TickHandler for Print {
//!     async fn on_tick(&self, task: &ScheduledWatch) {
//!         println!("poll {}", task.key);
//!     }
//! }
//!
//! # async fn example() -> mirror_watch::Result<()> {
//! let scheduler = Scheduler::new(Arc::new(Print));
//! let watch = ResourceWatch::new("MAA", Variant::Universal);
//! scheduler
//!     .register(ScheduledWatch::new("10001", watch), Duration::from_secs(600))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use crate::types::{ResourceWatch, WatchKey};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Task record dispatched on every firing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduledWatch {
    /// Timer identity
    pub key: WatchKey,
    /// Snapshot of the watch taken at registration
    pub watch: ResourceWatch,
}

impl ScheduledWatch {
    /// Build the record for a consumer's watch
    pub fn new(consumer_id: impl Into<String>, watch: ResourceWatch) -> Self {
        let key = WatchKey::new(consumer_id, watch.rid.clone(), watch.variant);
        Self { key, watch }
    }
}

/// Receiver of timer firings
#[async_trait]
pub trait TickHandler: Send + Sync {
    /// Called once per firing; the next firing for the same key waits for it
    async fn on_tick(&self, task: &ScheduledWatch);
}

struct TimerEntry {
    interval: Duration,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Registry of live per-watch timers
pub struct Scheduler {
    handler: Arc<dyn TickHandler>,
    timers: Mutex<HashMap<WatchKey, TimerEntry>>,
    shutdown: CancellationToken,
}

impl Scheduler {
    /// Create an empty scheduler dispatching to `handler`
    pub fn new(handler: Arc<dyn TickHandler>) -> Self {
        Self {
            handler,
            timers: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Install a timer for the task's key, replacing any existing one
    ///
    /// The first firing happens one `interval` after registration. A replaced
    /// timer is cancelled; a check it already started runs to completion.
    /// Intervals too large to schedule are rejected and no timer is touched.
    pub async fn register(&self, task: ScheduledWatch, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::Validation("interval must be positive".into()));
        }
        let Some(first) = tokio::time::Instant::now().checked_add(interval) else {
            return Err(Error::Validation(format!(
                "interval of {}s is too large to schedule",
                interval.as_secs()
            )));
        };

        let mut timers = self.timers.lock().await;
        if self.shutdown.is_cancelled() {
            return Err(Error::ShuttingDown);
        }

        if let Some(previous) = timers.remove(&task.key) {
            previous.cancel.cancel();
            tracing::debug!(key = %task.key, "Replaced existing timer");
        }

        let key = task.key.clone();
        let cancel = self.shutdown.child_token();
        let handle = tokio::spawn(run_timer(
            task,
            first,
            interval,
            self.handler.clone(),
            cancel.clone(),
        ));

        tracing::info!(key = %key, interval_secs = interval.as_secs(), "Timer registered");
        timers.insert(
            key,
            TimerEntry {
                interval,
                cancel,
                handle,
            },
        );
        Ok(())
    }

    /// Cancel the timer for `key`; `false` when none was registered
    pub async fn unregister(&self, key: &WatchKey) -> bool {
        match self.timers.lock().await.remove(key) {
            Some(entry) => {
                entry.cancel.cancel();
                tracing::info!(key = %key, "Timer unregistered");
                true
            }
            None => false,
        }
    }

    /// Whether a timer is live for `key`
    pub async fn is_scheduled(&self, key: &WatchKey) -> bool {
        self.timers.lock().await.contains_key(key)
    }

    /// Interval of the live timer for `key`
    pub async fn interval_of(&self, key: &WatchKey) -> Option<Duration> {
        self.timers.lock().await.get(key).map(|e| e.interval)
    }

    /// Number of live timers
    pub async fn len(&self) -> usize {
        self.timers.lock().await.len()
    }

    /// True when no timer is live
    pub async fn is_empty(&self) -> bool {
        self.timers.lock().await.is_empty()
    }

    /// Keys of every live timer
    pub async fn keys(&self) -> Vec<WatchKey> {
        self.timers.lock().await.keys().cloned().collect()
    }

    /// Cancel every timer and wait for the timer tasks to exit
    ///
    /// Further registrations fail with [`Error::ShuttingDown`].
    pub async fn shutdown(&self) {
        let entries: Vec<TimerEntry> = {
            let mut timers = self.timers.lock().await;
            self.shutdown.cancel();
            timers.drain().map(|(_, entry)| entry).collect()
        };

        let count = entries.len();
        for entry in entries {
            entry.cancel.cancel();
            if let Err(e) = entry.handle.await {
                tracing::warn!(error = %e, "Timer task ended abnormally");
            }
        }
        tracing::info!(timers = count, "Scheduler stopped");
    }
}

async fn run_timer(
    task: ScheduledWatch,
    first: tokio::time::Instant,
    period: Duration,
    handler: Arc<dyn TickHandler>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(first, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(key = %task.key, "Timer stopped");
                return;
            }
            _ = ticker.tick() => {
                handler.on_tick(&task).await;
            }
        }
    }
}

#[cfg(test)]
mod tests;
