//! Traits and types for the version-metadata source

use crate::types::{Channel, ResourceWatch, Variant};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What to ask the metadata source about
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceQuery {
    /// Resource id
    pub rid: String,
    /// Build flavour
    pub variant: Variant,
    /// Release channel
    pub channel: Channel,
    /// Version the caller already has, sent as a hint
    pub current_version: Option<String>,
}

impl ResourceQuery {
    /// Query for a resource variant on a channel
    pub fn new(rid: impl Into<String>, variant: Variant, channel: Channel) -> Self {
        Self {
            rid: rid.into(),
            variant,
            channel,
            current_version: None,
        }
    }

    /// Query matching a watch
    pub fn for_watch(watch: &ResourceWatch) -> Self {
        Self::new(watch.rid.clone(), watch.variant, watch.channel)
    }
}

/// Latest release as reported by the metadata source
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseMetadata {
    /// Version string; empty means the source reported nothing usable
    #[serde(default)]
    pub version_name: String,

    /// Markdown release note
    #[serde(default)]
    pub release_note: String,

    /// Artifact URL, only present when a valid credential was supplied
    #[serde(default, rename = "url", skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,

    /// Advertised sha256 of the artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    /// Advertised artifact size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,

    /// Channel the release was published on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

/// A downloaded artifact on local disk
#[derive(Clone, Debug)]
pub struct DownloadedArtifact {
    /// Final (renamed) local path
    pub path: PathBuf,
    /// Metadata resolved with the credential for this download
    pub metadata: ReleaseMetadata,
    /// True when an existing file with a matching checksum was reused
    pub reused: bool,
}

/// Trait for the version-metadata source
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetch the latest release for a query
    ///
    /// `Ok(None)` means the source answered but had no release data.
    ///
    /// # Errors
    ///
    /// Transport failures and business rejections (e.g. an expired
    /// credential) are returned as errors.
    async fn fetch_latest(
        &self,
        query: &ResourceQuery,
        credential: Option<&str>,
    ) -> crate::Result<Option<ReleaseMetadata>>;
}

/// Trait for fetching artifacts to local disk
#[async_trait]
pub trait ArtifactDownloader: Send + Sync {
    /// Download the latest artifact for `query` to `dest`
    ///
    /// Implementations must never leave a partial file at `dest`.
    async fn download(
        &self,
        query: &ResourceQuery,
        credential: &str,
        dest: &Path,
    ) -> crate::Result<DownloadedArtifact>;
}
