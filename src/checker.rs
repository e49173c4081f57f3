//! Update checker
//!
//! One check fetches the latest release for a watch, compares it with the
//! recorded version, and on change records it, announces it to the
//! consumer, and optionally hands it to the distribution pipeline.
//!
//! Ordering within a check is fixed: the state write completes before the
//! notification is sent, and the notification before distribution starts.
//! A check whose state write fails stops before notifying, so the next poll
//! sees the same change again.

use crate::changelog::format_release_note;
use crate::config::RetryConfig;
use crate::distribution::{DistributionPipeline, DistributionRequest};
use crate::registry::SubscriptionRegistry;
use crate::remote::Notifier;
use crate::retry::with_retry;
use crate::scheduler::{ScheduledWatch, TickHandler};
use crate::source::{MetadataSource, ReleaseMetadata, ResourceQuery};
use crate::state::VersionStore;
use crate::types::{CheckOutcome, DistributionResult, Event, ResourceWatch, WatchKey};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};

/// Render the update announcement for a release
///
/// ```
/// use mirror_watch::checker::update_message;
/// use mirror_watch::source::ReleaseMetadata;
///
/// let release = ReleaseMetadata {
///     version_name: "v2.0".into(),
///     release_note: "### Fixes\n- one".into(),
///     ..Default::default()
/// };
/// assert_eq!(
///     update_message("MAA", &release),
///     "📦 MAA update v2.0\n━━━━━━━━━━━━━━\nFixes\n  • one"
/// );
/// ```
pub fn update_message(rid: &str, release: &ReleaseMetadata) -> String {
    format!(
        "📦 {} update {}\n━━━━━━━━━━━━━━\n{}",
        rid,
        release.version_name,
        format_release_note(&release.release_note)
    )
}

/// Collaborators of the checker
pub struct UpdateChecker {
    source: Arc<dyn MetadataSource>,
    notifier: Arc<dyn Notifier>,
    state: Arc<VersionStore>,
    registry: Arc<SubscriptionRegistry>,
    distribution: Arc<DistributionPipeline>,
    retry: RetryConfig,
    event_tx: broadcast::Sender<Event>,
    check_locks: Mutex<HashMap<WatchKey, Arc<Mutex<()>>>>,
}

impl UpdateChecker {
    /// Wire a checker
    pub fn new(
        source: Arc<dyn MetadataSource>,
        notifier: Arc<dyn Notifier>,
        state: Arc<VersionStore>,
        registry: Arc<SubscriptionRegistry>,
        distribution: Arc<DistributionPipeline>,
        retry: RetryConfig,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            source,
            notifier,
            state,
            registry,
            distribution,
            retry,
            event_tx,
            check_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Check one watch for a new version
    ///
    /// With `force`, the current release is announced without consulting or
    /// updating the recorded version and without distributing. Never fails:
    /// problems are logged and reflected in the outcome.
    pub async fn check(&self, consumer_id: &str, watch: &ResourceWatch, force: bool) -> CheckOutcome {
        let key = WatchKey::for_watch(consumer_id, watch);
        let lock = self.check_lock(&key).await;
        let _guard = lock.lock().await;

        let Some(release) = self.fetch(consumer_id, watch).await else {
            return CheckOutcome::NoMetadata;
        };
        let version = release.version_name.clone();

        if force {
            self.send(consumer_id, &update_message(&watch.rid, &release))
                .await;
            return CheckOutcome::Shown { version };
        }

        let state_key = watch.state_key();
        let previous = self.state.get(&state_key).await;
        if previous.as_deref() == Some(version.as_str()) {
            tracing::debug!(key = %key, version = %version, "No new version");
            return CheckOutcome::Unchanged { version };
        }

        if let Err(e) = self.state.set(&state_key, &version).await {
            tracing::error!(
                key = %key,
                version = %version,
                error = %e,
                "Could not record new version, will retry on next poll"
            );
            return CheckOutcome::NotRecorded { version };
        }

        tracing::info!(
            key = %key,
            version = %version,
            previous = ?previous,
            "New version detected"
        );
        let _ = self.event_tx.send(Event::UpdateDetected {
            key: key.clone(),
            version: version.clone(),
            previous,
            detected_at: chrono::Utc::now().timestamp(),
        });
        self.send(consumer_id, &update_message(&watch.rid, &release))
            .await;

        let distribution = if watch.auto {
            self.auto_distribute(consumer_id, watch, &release).await
        } else {
            None
        };

        CheckOutcome::Updated {
            version,
            distribution,
        }
    }

    /// Fetch with retry; `None` for failures and empty versions
    async fn fetch(&self, consumer_id: &str, watch: &ResourceWatch) -> Option<ReleaseMetadata> {
        let query = ResourceQuery::for_watch(watch);
        let result = with_retry(&self.retry, || self.source.fetch_latest(&query, None)).await;

        match result {
            Ok(Some(release)) if !release.version_name.trim().is_empty() => Some(release),
            Ok(_) => {
                tracing::warn!(
                    consumer_id = %consumer_id,
                    rid = %watch.rid,
                    "Metadata source returned no version"
                );
                None
            }
            Err(e) => {
                tracing::warn!(
                    consumer_id = %consumer_id,
                    rid = %watch.rid,
                    error = %e,
                    "Failed to fetch release metadata"
                );
                None
            }
        }
    }

    async fn auto_distribute(
        &self,
        consumer_id: &str,
        watch: &ResourceWatch,
        release: &ReleaseMetadata,
    ) -> Option<DistributionResult> {
        let Some(credential) = self.registry.credential().await else {
            tracing::debug!(rid = %watch.rid, "Auto distribution skipped, no credential");
            return None;
        };

        let request = DistributionRequest {
            consumer_id: consumer_id.to_string(),
            rid: watch.rid.clone(),
            variant: watch.variant,
            channel: watch.channel,
        };
        let result = self
            .distribution
            .distribute(&request, &credential, release)
            .await;

        let report = if result.ok {
            result.message.clone()
        } else {
            format!("⚠ auto distribution: {}", result.message)
        };
        self.send(consumer_id, &report).await;

        let _ = self.event_tx.send(Event::DistributionFinished {
            consumer_id: consumer_id.to_string(),
            rid: watch.rid.clone(),
            result: result.clone(),
        });
        Some(result)
    }

    /// Deliver a message; failures are logged and reported as events only
    pub(crate) async fn send(&self, consumer_id: &str, text: &str) {
        if let Err(e) = self.notifier.notify(consumer_id, text).await {
            tracing::warn!(consumer_id = %consumer_id, error = %e, "Failed to deliver notification");
            let _ = self.event_tx.send(Event::NotificationFailed {
                consumer_id: consumer_id.to_string(),
                error: e.to_string(),
            });
        }
    }

    async fn check_lock(&self, key: &WatchKey) -> Arc<Mutex<()>> {
        self.check_locks
            .lock()
            .await
            .entry(key.clone())
            .or_default()
            .clone()
    }

    /// Drop the lock entry of a watch that is no longer scheduled
    ///
    /// An entry still held by an in-flight check stays, so a check started
    /// after a quick re-subscribe queues behind it.
    pub(crate) async fn forget(&self, key: &WatchKey) {
        let mut locks = self.check_locks.lock().await;
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }
}

#[async_trait]
impl TickHandler for UpdateChecker {
    async fn on_tick(&self, task: &ScheduledWatch) {
        let outcome = self
            .check(&task.key.consumer_id, &task.watch, false)
            .await;
        tracing::debug!(key = %task.key, outcome = ?outcome, "Scheduled check finished");
    }
}
