//! Traits and types for the consumer-facing endpoint

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A folder in a consumer's shared file store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFolder {
    /// Store-assigned folder id
    pub folder_id: String,
    /// Display name
    pub folder_name: String,
}

/// A file in a consumer's shared file store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Store-assigned file id
    #[serde(default)]
    pub file_id: String,
    /// File name as shown to the consumer
    pub file_name: String,
    /// Size in bytes, when reported
    #[serde(default, alias = "size", skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

/// Trait for a consumer's shared file store
///
/// `folder: None` addresses the store root.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Folders directly under the root
    async fn list_root_folders(&self, consumer_id: &str) -> crate::Result<Vec<RemoteFolder>>;

    /// Files in a folder (or the root)
    async fn list_files(
        &self,
        consumer_id: &str,
        folder: Option<&str>,
    ) -> crate::Result<Vec<RemoteFile>>;

    /// Create a folder under the root
    ///
    /// Stores are not required to return the new id; callers re-list.
    async fn create_folder(&self, consumer_id: &str, name: &str) -> crate::Result<()>;

    /// Upload a local file under `remote_name`
    async fn upload_file(
        &self,
        consumer_id: &str,
        local: &Path,
        remote_name: &str,
        folder: Option<&str>,
    ) -> crate::Result<()>;
}

/// Trait for delivering text to a consumer
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a text message; failures are logged by the caller, never retried
    async fn notify(&self, consumer_id: &str, text: &str) -> crate::Result<()>;
}
