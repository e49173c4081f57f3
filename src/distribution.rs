//! Distribution pipeline
//!
//! Downloads a release artifact and uploads it into the consumer's file
//! store under a canonical name, skipping the upload when a file with that
//! name is already there.
//!
//! ## Steps
//!
//! 1. Download to a staging file private to this call
//!    (`{consumer}-{rid}-{label}-{channel}.{pid}.{n}.{ext}`), removed once
//!    the upload step is over
//! 2. Compute the canonical name `{rid}-{label}-{version}.{ext}`
//! 3. Resolve the `{rid}下载` folder, creating it if needed; fall back to the
//!    store root with a warning when that fails
//! 4. Skip if the destination already lists the canonical name
//! 5. Upload
//!
//! Steps 3 to 5 run under a lock keyed by `(consumer, canonical name)`, so two
//! concurrent calls for the same artifact upload at most once.

use crate::config::DistributionConfig;
use crate::remote::FileStore;
use crate::source::{ArtifactDownloader, ReleaseMetadata, ResourceQuery};
use crate::types::{Channel, DistributionResult, Variant};
use crate::utils::{extension_from_url, sanitize_file_component, unique_sibling};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Pause between folder listings while waiting for a new folder to appear
const FOLDER_RELIST_DELAY: Duration = Duration::from_millis(500);

/// What to distribute and to whom
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistributionRequest {
    /// Consumer whose file store receives the artifact
    pub consumer_id: String,
    /// Resource id
    pub rid: String,
    /// Build flavour
    pub variant: Variant,
    /// Release channel
    pub channel: Channel,
}

type UploadKey = (String, String);

/// Download-and-upload pipeline with duplicate suppression
pub struct DistributionPipeline {
    downloader: Arc<dyn ArtifactDownloader>,
    store: Arc<dyn FileStore>,
    config: DistributionConfig,
    upload_locks: Mutex<HashMap<UploadKey, Arc<Mutex<()>>>>,
}

impl DistributionPipeline {
    /// Create a pipeline over the given collaborators
    pub fn new(
        downloader: Arc<dyn ArtifactDownloader>,
        store: Arc<dyn FileStore>,
        config: DistributionConfig,
    ) -> Self {
        Self {
            downloader,
            store,
            config,
            upload_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Run the pipeline
    ///
    /// Never returns an error: every failure is folded into a
    /// [`DistributionResult`] with `ok == false`.
    pub async fn distribute(
        &self,
        request: &DistributionRequest,
        credential: &str,
        metadata: &ReleaseMetadata,
    ) -> DistributionResult {
        let label = request.variant.file_label();
        let staging_ext = self.extension_for(metadata);
        let staging_path = self.staging_path(request, &staging_ext);

        let query = ResourceQuery::new(request.rid.clone(), request.variant, request.channel);
        let artifact = match self.downloader.download(&query, credential, &staging_path).await {
            Ok(artifact) => artifact,
            Err(e) => {
                tracing::warn!(
                    consumer_id = %request.consumer_id,
                    rid = %request.rid,
                    error = %e,
                    "Artifact download failed"
                );
                return DistributionResult::failed(format!("download failed: {}", e));
            }
        };

        let version = if artifact.metadata.version_name.is_empty() {
            metadata.version_name.as_str()
        } else {
            artifact.metadata.version_name.as_str()
        };
        let ext = artifact
            .metadata
            .download_url
            .as_deref()
            .and_then(extension_from_url)
            .unwrap_or(staging_ext);
        let file_name =
            sanitize_file_component(&format!("{}-{}-{}.{}", request.rid, label, version, ext));

        let lock = self.upload_lock(&request.consumer_id, &file_name).await;
        let result = {
            let _guard = lock.lock().await;
            self.place(request, &artifact.path, &file_name).await
        };
        drop(lock);
        self.release_upload_lock(&request.consumer_id, &file_name).await;

        if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
            tracing::debug!(path = %artifact.path.display(), error = %e, "Staged artifact not removed");
        }

        tracing::info!(
            consumer_id = %request.consumer_id,
            rid = %request.rid,
            file = %file_name,
            ok = result.ok,
            uploaded = result.uploaded,
            "Distribution finished"
        );
        result
    }

    /// Steps 3 to 5; caller holds the upload lock
    async fn place(
        &self,
        request: &DistributionRequest,
        local: &std::path::Path,
        file_name: &str,
    ) -> DistributionResult {
        let consumer = request.consumer_id.as_str();
        let folder_name = format!("{}{}", request.rid, self.config.folder_suffix);

        let (folder, warning) = match self.resolve_folder(consumer, &folder_name).await {
            Ok(id) => (Some(id), None),
            Err(reason) => {
                tracing::warn!(
                    consumer_id = %consumer,
                    folder = %folder_name,
                    reason = %reason,
                    "Falling back to file store root"
                );
                (None, Some(format!("{reason}, uploading to root")))
            }
        };
        let with_warning = |message: String| match &warning {
            Some(w) => format!("{w}\n{message}"),
            None => message,
        };

        let existing = match self.store.list_files(consumer, folder.as_deref()).await {
            Ok(files) => files,
            Err(e) => {
                return DistributionResult {
                    ok: false,
                    message: with_warning(format!(
                        "could not check existing files, upload skipped: {e}"
                    )),
                    file_name: Some(file_name.to_string()),
                    uploaded: false,
                    warning,
                };
            }
        };

        if existing.iter().any(|f| f.file_name == file_name) {
            tracing::info!(consumer_id = %consumer, file = %file_name, "Already in file store, skipping");
            return DistributionResult {
                ok: true,
                message: with_warning(format!("already exists, skipped: {file_name}")),
                file_name: Some(file_name.to_string()),
                uploaded: false,
                warning,
            };
        }

        match self
            .store
            .upload_file(consumer, local, file_name, folder.as_deref())
            .await
        {
            Ok(()) => DistributionResult {
                ok: true,
                message: with_warning(format!("uploaded: {file_name}")),
                file_name: Some(file_name.to_string()),
                uploaded: true,
                warning,
            },
            Err(e) => DistributionResult {
                ok: false,
                message: with_warning(format!("upload failed: {e}")),
                file_name: Some(file_name.to_string()),
                uploaded: false,
                warning,
            },
        }
    }

    /// Folder id for `name`, created if missing
    ///
    /// Creation is attempted once; the folder is then looked up at most
    /// `folder_resolve_attempts` times. `Err` carries the fallback reason.
    async fn resolve_folder(&self, consumer: &str, name: &str) -> Result<String, String> {
        let find = |folders: Vec<crate::remote::RemoteFolder>| {
            folders
                .into_iter()
                .find(|f| f.folder_name == name)
                .map(|f| f.folder_id)
        };

        let folders = self
            .store
            .list_root_folders(consumer)
            .await
            .map_err(|e| format!("listing folders failed: {e}"))?;
        if let Some(id) = find(folders) {
            return Ok(id);
        }

        self.store
            .create_folder(consumer, name)
            .await
            .map_err(|e| format!("creating folder {name} failed: {e}"))?;

        let attempts = self.config.folder_resolve_attempts.max(1);
        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(FOLDER_RELIST_DELAY).await;
            }
            match self.store.list_root_folders(consumer).await {
                Ok(folders) => {
                    if let Some(id) = find(folders) {
                        return Ok(id);
                    }
                }
                Err(e) => {
                    tracing::debug!(attempt = attempt, error = %e, "Folder re-list failed");
                }
            }
        }

        Err(format!("folder {name} not visible after creation"))
    }

    fn extension_for(&self, metadata: &ReleaseMetadata) -> String {
        metadata
            .download_url
            .as_deref()
            .and_then(extension_from_url)
            .unwrap_or_else(|| self.config.default_extension.clone())
    }

    /// Fresh staging file for one call; concurrent calls never share one
    fn staging_path(&self, request: &DistributionRequest, ext: &str) -> PathBuf {
        let stem = format!(
            "{}-{}-{}-{}",
            request.consumer_id,
            request.rid,
            request.variant.file_label(),
            request.channel.as_str()
        );
        let base = self.config.staging_dir.join(sanitize_file_component(&stem));
        unique_sibling(&base, &sanitize_file_component(ext))
    }

    async fn upload_lock(&self, consumer: &str, file_name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.upload_locks.lock().await;
        locks
            .entry((consumer.to_string(), file_name.to_string()))
            .or_default()
            .clone()
    }

    async fn release_upload_lock(&self, consumer: &str, file_name: &str) {
        let mut locks = self.upload_locks.lock().await;
        let key = (consumer.to_string(), file_name.to_string());
        if locks.get(&key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&key);
        }
    }
}
