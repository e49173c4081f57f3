//! Startup and shutdown coordination.

use crate::error::Result;
use crate::scheduler::ScheduledWatch;
use crate::types::Event;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::UpdateMonitor;

impl UpdateMonitor {
    /// Register one timer per persisted watch
    ///
    /// This is the only recovery path after a restart: timers are rebuilt
    /// from the subscription document, each firing first one interval from
    /// now. Watches whose timer cannot be registered are logged and skipped.
    /// Returns the number of timers started.
    pub async fn start(&self) -> Result<usize> {
        self.ensure_accepting()?;

        let _ops = self.ops_lock.lock().await;
        let watches = self.registry.all().await;
        let mut started = 0;

        for (consumer_id, watch) in watches {
            if let Err(e) = watch.validate() {
                tracing::warn!(
                    consumer_id = %consumer_id,
                    rid = %watch.rid,
                    error = %e,
                    "Skipping persisted watch with invalid settings"
                );
                continue;
            }
            let interval = Duration::from_secs(watch.interval);
            let task = ScheduledWatch::new(consumer_id, watch);
            let key = task.key.clone();
            match self.scheduler.register(task, interval).await {
                Ok(()) => started += 1,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping watch that cannot be scheduled");
                }
            }
        }

        tracing::info!(
            timers = started,
            consumers = self.registry.consumers().await.len(),
            "Update monitor started"
        );
        Ok(started)
    }

    /// Gracefully shut down the monitor
    ///
    /// 1. Stops accepting new operations
    /// 2. Cancels every timer; checks already running are awaited
    /// 3. Persists both documents
    /// 4. Emits [`Event::Shutdown`]
    ///
    /// Persistence failures are logged and the sequence continues.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new operations
        self.accepting.store(false, Ordering::SeqCst);

        // 2. Stop timers; in-flight checks finish before their task exits
        self.scheduler.shutdown().await;

        // 3. Persist final state
        if let Err(e) = self.registry.persist().await {
            tracing::error!(error = %e, "Failed to persist subscriptions during shutdown");
        }
        if let Err(e) = self.state.persist().await {
            tracing::error!(error = %e, "Failed to persist version state during shutdown");
        }

        // 4. Emit shutdown event
        let _ = self.event_tx.send(Event::Shutdown);

        tracing::info!("Shutdown complete");
        Ok(())
    }
}
