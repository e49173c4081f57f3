//! Version state store
//!
//! Remembers the last observed version per `rid|type|channel` key in a flat
//! JSON document. Every write rewrites the whole document atomically before
//! the call returns.

use crate::error::Result;
use crate::types::StateKey;
use crate::utils::{load_json_or_default, write_json_atomic};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Persistent map of state key to last observed version
#[derive(Debug)]
pub struct VersionStore {
    path: PathBuf,
    versions: RwLock<HashMap<String, String>>,
}

impl VersionStore {
    /// Load the document at `path`
    ///
    /// A missing or corrupt document yields an empty store.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let versions: HashMap<String, String> = load_json_or_default(&path).await;
        tracing::info!(
            path = %path.display(),
            entries = versions.len(),
            "Loaded version state"
        );
        Self {
            path,
            versions: RwLock::new(versions),
        }
    }

    /// Location of the backing document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last recorded version for a key
    pub async fn get(&self, key: &StateKey) -> Option<String> {
        self.versions.read().await.get(key.as_str()).cloned()
    }

    /// Record a version and flush the document
    ///
    /// If the flush fails the previous in-memory value is restored and the
    /// error is returned.
    pub async fn set(&self, key: &StateKey, version: &str) -> Result<()> {
        let mut versions = self.versions.write().await;
        let previous = versions.insert(key.as_str().to_string(), version.to_string());

        if let Err(e) = write_json_atomic(&self.path, &*versions).await {
            match previous {
                Some(previous) => versions.insert(key.as_str().to_string(), previous),
                None => versions.remove(key.as_str()),
            };
            tracing::error!(
                key = %key,
                path = %self.path.display(),
                error = %e,
                "Failed to persist version state"
            );
            return Err(e);
        }

        tracing::debug!(key = %key, version = %version, "Version state updated");
        Ok(())
    }

    /// Rewrite the full document from memory
    pub async fn persist(&self) -> Result<()> {
        let versions = self.versions.read().await;
        write_json_atomic(&self.path, &*versions).await
    }

    /// Copy of every recorded entry
    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.versions.read().await.clone()
    }
}
