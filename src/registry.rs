//! Subscription registry
//!
//! Owns the `config.json` document: which consumer watches which resources,
//! and the distribution credential. Mutations are flushed before returning
//! and rolled back in memory when the flush fails.

use crate::error::Result;
use crate::types::{ResourceWatch, Subscription, Variant, WatchUpdate};
use crate::utils::{load_json_or_default, write_json_atomic};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Persisted subscription document
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// One entry per consumer
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,

    /// Distribution credential; empty means unset
    #[serde(default)]
    pub cdk: String,
}

impl GlobalConfig {
    fn subscription(&self, consumer_id: &str) -> Option<&Subscription> {
        self.subscriptions
            .iter()
            .find(|s| s.consumer_id == consumer_id)
    }

    fn subscription_mut(&mut self, consumer_id: &str) -> Option<&mut Subscription> {
        self.subscriptions
            .iter_mut()
            .find(|s| s.consumer_id == consumer_id)
    }

    /// Merge duplicate consumers and drop duplicate watches, first wins
    fn normalize(&mut self) -> usize {
        let mut dropped = 0;
        let mut merged: Vec<Subscription> = Vec::with_capacity(self.subscriptions.len());

        for sub in self.subscriptions.drain(..) {
            let target = match merged.iter().position(|s| s.consumer_id == sub.consumer_id) {
                Some(index) => {
                    dropped += 1;
                    &mut merged[index]
                }
                None => {
                    merged.push(Subscription::new(sub.consumer_id.clone()));
                    let last = merged.len() - 1;
                    &mut merged[last]
                }
            };

            for watch in sub.resources {
                if target.find(&watch.rid, watch.variant).is_some() {
                    dropped += 1;
                } else {
                    target.resources.push(watch);
                }
            }
        }

        self.subscriptions = merged;
        dropped
    }
}

/// Thread-safe owner of the subscription document
#[derive(Debug)]
pub struct SubscriptionRegistry {
    path: PathBuf,
    doc: RwLock<GlobalConfig>,
}

impl SubscriptionRegistry {
    /// Load the document at `path`
    ///
    /// A missing or corrupt document yields an empty registry. Duplicate
    /// entries are collapsed so the one-watch-per-key invariant holds.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut doc: GlobalConfig = load_json_or_default(&path).await;

        let dropped = doc.normalize();
        if dropped > 0 {
            tracing::warn!(
                path = %path.display(),
                dropped = dropped,
                "Dropped duplicate subscription entries"
            );
        }

        let watches: usize = doc.subscriptions.iter().map(|s| s.resources.len()).sum();
        tracing::info!(
            path = %path.display(),
            consumers = doc.subscriptions.len(),
            watches = watches,
            "Loaded subscriptions"
        );

        Self {
            path,
            doc: RwLock::new(doc),
        }
    }

    /// Location of the backing document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Subscription of a consumer, created and persisted if absent
    pub async fn get_or_create(&self, consumer_id: &str) -> Result<Subscription> {
        let mut doc = self.doc.write().await;
        if let Some(sub) = doc.subscription(consumer_id) {
            return Ok(sub.clone());
        }

        let backup = doc.clone();
        doc.subscriptions.push(Subscription::new(consumer_id));
        self.flush_or_restore(&mut doc, backup).await?;

        tracing::debug!(consumer_id = %consumer_id, "Created subscription");
        Ok(Subscription::new(consumer_id))
    }

    /// Add a watch for a consumer
    ///
    /// Returns `Ok(false)` without touching anything when the consumer
    /// already watches the same `(rid, type)`.
    pub async fn add_watch(&self, consumer_id: &str, watch: ResourceWatch) -> Result<bool> {
        let mut doc = self.doc.write().await;
        if doc
            .subscription(consumer_id)
            .is_some_and(|s| s.find(&watch.rid, watch.variant).is_some())
        {
            return Ok(false);
        }

        let backup = doc.clone();
        match doc.subscription_mut(consumer_id) {
            Some(sub) => sub.resources.push(watch),
            None => {
                let mut sub = Subscription::new(consumer_id);
                sub.resources.push(watch);
                doc.subscriptions.push(sub);
            }
        }
        self.flush_or_restore(&mut doc, backup).await?;
        Ok(true)
    }

    /// Remove a watch; `Ok(false)` when it did not exist
    pub async fn remove_watch(&self, consumer_id: &str, rid: &str, variant: Variant) -> Result<bool> {
        let mut doc = self.doc.write().await;
        let backup = doc.clone();

        let removed = match doc.subscription_mut(consumer_id) {
            Some(sub) => {
                let before = sub.resources.len();
                sub.resources.retain(|w| !w.matches(rid, variant));
                sub.resources.len() != before
            }
            None => false,
        };
        if !removed {
            return Ok(false);
        }

        self.flush_or_restore(&mut doc, backup).await?;
        Ok(true)
    }

    /// Apply a partial update to a watch
    ///
    /// Returns the updated watch, or `None` when the consumer does not watch
    /// `(rid, variant)`.
    pub async fn update_watch(
        &self,
        consumer_id: &str,
        rid: &str,
        variant: Variant,
        update: &WatchUpdate,
    ) -> Result<Option<ResourceWatch>> {
        let mut doc = self.doc.write().await;
        let backup = doc.clone();

        let updated = doc.subscription_mut(consumer_id).and_then(|sub| {
            sub.resources
                .iter_mut()
                .find(|w| w.matches(rid, variant))
                .map(|watch| {
                    update.apply_to(watch);
                    watch.clone()
                })
        });
        let Some(updated) = updated else {
            return Ok(None);
        };

        self.flush_or_restore(&mut doc, backup).await?;
        Ok(Some(updated))
    }

    /// Watches of one consumer in subscription order
    pub async fn list(&self, consumer_id: &str) -> Vec<ResourceWatch> {
        self.doc
            .read()
            .await
            .subscription(consumer_id)
            .map(|s| s.resources.clone())
            .unwrap_or_default()
    }

    /// Every `(consumer, watch)` pair, used to rebuild the schedule
    pub async fn all(&self) -> Vec<(String, ResourceWatch)> {
        self.doc
            .read()
            .await
            .subscriptions
            .iter()
            .flat_map(|s| {
                s.resources
                    .iter()
                    .map(move |w| (s.consumer_id.clone(), w.clone()))
            })
            .collect()
    }

    /// Ids of every known consumer
    pub async fn consumers(&self) -> HashSet<String> {
        self.doc
            .read()
            .await
            .subscriptions
            .iter()
            .map(|s| s.consumer_id.clone())
            .collect()
    }

    /// Configured distribution credential, if any
    pub async fn credential(&self) -> Option<String> {
        let doc = self.doc.read().await;
        let cdk = doc.cdk.trim();
        (!cdk.is_empty()).then(|| cdk.to_string())
    }

    /// Replace the distribution credential; an empty string clears it
    pub async fn set_credential(&self, cdk: &str) -> Result<()> {
        let mut doc = self.doc.write().await;
        let backup = doc.clone();
        doc.cdk = cdk.trim().to_string();
        self.flush_or_restore(&mut doc, backup).await
    }

    /// Rewrite the full document from memory
    pub async fn persist(&self) -> Result<()> {
        let doc = self.doc.read().await;
        write_json_atomic(&self.path, &*doc).await
    }

    async fn flush_or_restore(&self, doc: &mut GlobalConfig, backup: GlobalConfig) -> Result<()> {
        if let Err(e) = write_json_atomic(&self.path, &*doc).await {
            tracing::error!(
                path = %self.path.display(),
                error = %e,
                "Failed to persist subscriptions, change rolled back"
            );
            *doc = backup;
            return Err(e);
        }
        Ok(())
    }
}
