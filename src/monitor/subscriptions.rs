//! Subscription management: subscribe, unsubscribe, reconfigure, list and
//! the distribution credential.

use crate::error::{Error, Result};
use crate::scheduler::ScheduledWatch;
use crate::types::{Event, ResourceWatch, Variant, WatchKey, WatchUpdate, validate_interval};
use std::time::Duration;

use super::UpdateMonitor;

/// Render a consumer's watches the way the chat listing shows them
///
/// ```
/// use mirror_watch::monitor::describe_watches;
/// use mirror_watch::types::{ResourceWatch, Variant};
///
/// let mut watch = ResourceWatch::new("MAA", Variant::Universal);
/// watch.auto = true;
/// assert_eq!(
///     describe_watches(&[watch]),
///     "Subscriptions:\n  MAA (通用, stable, every 600s, auto)"
/// );
/// assert_eq!(describe_watches(&[]), "No subscriptions");
/// ```
pub fn describe_watches(watches: &[ResourceWatch]) -> String {
    if watches.is_empty() {
        return "No subscriptions".to_string();
    }
    let mut lines = vec!["Subscriptions:".to_string()];
    for w in watches {
        let auto = if w.auto { ", auto" } else { "" };
        lines.push(format!(
            "  {} ({}, {}, every {}s{})",
            w.rid,
            w.variant.display_label(),
            w.channel,
            w.interval,
            auto
        ));
    }
    lines.join("\n")
}

impl UpdateMonitor {
    /// Start watching a resource for a consumer
    ///
    /// The watch is persisted before its timer is registered. Returns the
    /// stored watch.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for an empty rid or an interval under a minute,
    /// [`Error::AlreadySubscribed`] when the consumer already watches this
    /// rid and variant, or the persistence error if the flush failed.
    pub async fn subscribe(&self, consumer_id: &str, watch: ResourceWatch) -> Result<ResourceWatch> {
        self.ensure_accepting()?;
        watch.validate()?;

        let _ops = self.ops_lock.lock().await;
        if !self.registry.add_watch(consumer_id, watch.clone()).await? {
            return Err(Error::AlreadySubscribed {
                consumer_id: consumer_id.to_string(),
                resource_id: watch.rid.clone(),
                variant: watch.variant,
            });
        }

        let task = ScheduledWatch::new(consumer_id, watch.clone());
        let key = task.key.clone();
        self.scheduler
            .register(task, Duration::from_secs(watch.interval))
            .await?;

        tracing::info!(
            consumer_id = %consumer_id,
            rid = %watch.rid,
            variant = %watch.variant,
            channel = %watch.channel,
            interval = watch.interval,
            auto = watch.auto,
            "Subscribed"
        );
        let _ = self.event_tx.send(Event::Subscribed {
            key,
            interval: watch.interval,
        });
        Ok(watch)
    }

    /// Stop watching a resource variant
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the consumer has no such watch.
    pub async fn unsubscribe(&self, consumer_id: &str, rid: &str, variant: Variant) -> Result<()> {
        self.ensure_accepting()?;

        let _ops = self.ops_lock.lock().await;
        if !self.registry.remove_watch(consumer_id, rid, variant).await? {
            return Err(Error::NotFound(format!(
                "{rid} ({}) is not subscribed for {consumer_id}",
                variant.display_label()
            )));
        }

        let key = WatchKey::new(consumer_id, rid, variant);
        if !self.scheduler.unregister(&key).await {
            tracing::warn!(key = %key, "Removed watch had no live timer");
        }
        self.checker.forget(&key).await;

        tracing::info!(consumer_id = %consumer_id, rid = %rid, variant = %variant, "Unsubscribed");
        let _ = self.event_tx.send(Event::Unsubscribed { key });
        Ok(())
    }

    /// Change interval, auto flag or channel of an existing watch
    ///
    /// The timer is re-registered with the updated snapshot, so the next
    /// firing is one (new) interval away.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for an empty update or a too-short interval,
    /// [`Error::NotFound`] when the watch does not exist.
    pub async fn reconfigure(
        &self,
        consumer_id: &str,
        rid: &str,
        variant: Variant,
        update: WatchUpdate,
    ) -> Result<ResourceWatch> {
        self.ensure_accepting()?;
        if update.is_empty() {
            return Err(Error::Validation(
                "nothing to change: set interval, auto or channel".into(),
            ));
        }
        if let Some(interval) = update.interval {
            validate_interval(interval)?;
        }

        let _ops = self.ops_lock.lock().await;
        let Some(watch) = self
            .registry
            .update_watch(consumer_id, rid, variant, &update)
            .await?
        else {
            return Err(Error::NotFound(format!(
                "{rid} ({}) is not subscribed for {consumer_id}",
                variant.display_label()
            )));
        };

        let task = ScheduledWatch::new(consumer_id, watch.clone());
        let key = task.key.clone();
        self.scheduler
            .register(task, Duration::from_secs(watch.interval))
            .await?;

        tracing::info!(
            consumer_id = %consumer_id,
            rid = %rid,
            variant = %variant,
            update = ?update,
            "Watch reconfigured"
        );
        let _ = self.event_tx.send(Event::Reconfigured {
            key,
            interval: watch.interval,
        });
        Ok(watch)
    }

    /// Watches of a consumer in subscription order
    pub async fn list(&self, consumer_id: &str) -> Vec<ResourceWatch> {
        self.registry.list(consumer_id).await
    }

    /// Replace the distribution credential (cdk); empty clears it
    pub async fn set_credential(&self, cdk: &str) -> Result<()> {
        self.registry.set_credential(cdk.trim()).await?;
        tracing::info!(configured = !cdk.trim().is_empty(), "Distribution credential updated");
        Ok(())
    }

    /// Whether a distribution credential is configured
    pub async fn has_credential(&self) -> bool {
        self.registry.credential().await.is_some()
    }
}
