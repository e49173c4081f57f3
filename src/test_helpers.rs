//! In-memory fakes of the collaborator traits, shared by unit tests.

use crate::error::{Error, RemoteError, Result, SourceError};
use crate::remote::{FileStore, Notifier, RemoteFile, RemoteFolder};
use crate::source::{ArtifactDownloader, DownloadedArtifact, MetadataSource, ReleaseMetadata, ResourceQuery};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub(crate) fn metadata(version: &str, note: &str) -> ReleaseMetadata {
    ReleaseMetadata {
        version_name: version.to_string(),
        release_note: note.to_string(),
        ..Default::default()
    }
}

fn rejected(action: &str) -> Error {
    Error::Remote(RemoteError::Rejected {
        action: action.to_string(),
        retcode: 1,
        message: "fake failure".to_string(),
    })
}

/// Metadata source and downloader backed by a mutable release
#[derive(Default)]
pub(crate) struct FakeSource {
    release: Mutex<Option<ReleaseMetadata>>,
    pub fail_fetch: AtomicBool,
    pub fail_download: AtomicBool,
    pub fetches: AtomicUsize,
    pub downloads: AtomicUsize,
}

impl FakeSource {
    pub fn with_release(release: ReleaseMetadata) -> Self {
        let source = Self::default();
        source.set_release(Some(release));
        source
    }

    pub fn set_release(&self, release: Option<ReleaseMetadata>) {
        *self.release.lock().unwrap() = release;
    }

    pub fn set_version(&self, version: &str) {
        let mut release = self.release.lock().unwrap();
        let mut next = release.clone().unwrap_or_default();
        next.version_name = version.to_string();
        *release = Some(next);
    }
}

#[async_trait]
impl MetadataSource for FakeSource {
    async fn fetch_latest(
        &self,
        _query: &ResourceQuery,
        _credential: Option<&str>,
    ) -> Result<Option<ReleaseMetadata>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Error::Source(SourceError::Api {
                code: 7001,
                message: "KEY_EXPIRED".to_string(),
            }));
        }
        Ok(self.release.lock().unwrap().clone())
    }
}

#[async_trait]
impl ArtifactDownloader for FakeSource {
    async fn download(
        &self,
        query: &ResourceQuery,
        _credential: &str,
        dest: &Path,
    ) -> Result<DownloadedArtifact> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.fail_download.load(Ordering::SeqCst) {
            return Err(Error::Source(SourceError::MissingDownloadUrl {
                resource_id: query.rid.clone(),
            }));
        }

        let mut metadata = self.release.lock().unwrap().clone().unwrap_or_default();
        if metadata.download_url.is_none() {
            metadata.download_url = Some(format!("https://cdn.example.com/{}.zip", query.rid));
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, metadata.version_name.as_bytes()).await?;

        Ok(DownloadedArtifact {
            path: dest.to_path_buf(),
            metadata,
            reused: false,
        })
    }
}

/// Group file store kept in memory
#[derive(Default)]
pub(crate) struct FakeStore {
    folders: Mutex<Vec<RemoteFolder>>,
    files: Mutex<HashMap<Option<String>, Vec<RemoteFile>>>,
    uploads: Mutex<Vec<(String, String, Option<String>)>>,
    contents: Mutex<HashMap<String, String>>,
    pub fail_list_folders: AtomicBool,
    pub fail_create: AtomicBool,
    /// Creation succeeds but the folder never shows up in listings
    pub hide_created: AtomicBool,
    pub fail_list_files: AtomicBool,
    pub fail_upload: AtomicBool,
    pub creates: AtomicUsize,
}

impl FakeStore {
    pub fn add_folder(&self, id: &str, name: &str) {
        self.folders.lock().unwrap().push(RemoteFolder {
            folder_id: id.to_string(),
            folder_name: name.to_string(),
        });
    }

    pub fn add_file(&self, folder: Option<&str>, name: &str) {
        self.files
            .lock()
            .unwrap()
            .entry(folder.map(str::to_string))
            .or_default()
            .push(RemoteFile {
                file_id: format!("id-{name}"),
                file_name: name.to_string(),
                file_size: None,
            });
    }

    /// `(consumer, remote name, folder)` of every upload, in order
    pub fn uploads(&self) -> Vec<(String, String, Option<String>)> {
        self.uploads.lock().unwrap().clone()
    }

    /// Local file content read when `remote_name` was uploaded
    pub fn uploaded_content(&self, remote_name: &str) -> Option<String> {
        self.contents.lock().unwrap().get(remote_name).cloned()
    }
}

#[async_trait]
impl FileStore for FakeStore {
    async fn list_root_folders(&self, _consumer_id: &str) -> Result<Vec<RemoteFolder>> {
        if self.fail_list_folders.load(Ordering::SeqCst) {
            return Err(rejected("get_group_root_files"));
        }
        Ok(self.folders.lock().unwrap().clone())
    }

    async fn list_files(&self, _consumer_id: &str, folder: Option<&str>) -> Result<Vec<RemoteFile>> {
        if self.fail_list_files.load(Ordering::SeqCst) {
            return Err(rejected("get_group_files_by_folder"));
        }
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(&folder.map(str::to_string))
            .cloned()
            .unwrap_or_default())
    }

    async fn create_folder(&self, _consumer_id: &str, name: &str) -> Result<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(rejected("create_group_file_folder"));
        }
        if !self.hide_created.load(Ordering::SeqCst) {
            let id = format!("/folder-{}", self.folders.lock().unwrap().len());
            self.add_folder(&id, name);
        }
        Ok(())
    }

    async fn upload_file(
        &self,
        consumer_id: &str,
        local: &Path,
        remote_name: &str,
        folder: Option<&str>,
    ) -> Result<()> {
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(rejected("upload_group_file"));
        }
        // Uploads take a moment so racing callers overlap.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        if let Ok(content) = tokio::fs::read_to_string(local).await {
            self.contents
                .lock()
                .unwrap()
                .insert(remote_name.to_string(), content);
        }
        self.add_file(folder, remote_name);
        self.uploads.lock().unwrap().push((
            consumer_id.to_string(),
            remote_name.to_string(),
            folder.map(str::to_string),
        ));
        Ok(())
    }
}

/// Notification sink that records every message
#[derive(Default)]
pub(crate) struct FakeNotifier {
    messages: Mutex<Vec<(String, String)>>,
    pub fail: AtomicBool,
}

impl FakeNotifier {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.messages().into_iter().map(|(_, text)| text).collect()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn notify(&self, consumer_id: &str, text: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(rejected("send_group_msg"));
        }
        self.messages
            .lock()
            .unwrap()
            .push((consumer_id.to_string(), text.to_string()));
        Ok(())
    }
}
