//! Version-metadata source and artifact download
//!
//! The update checker and the distribution pipeline only depend on the
//! [`MetadataSource`] and [`ArtifactDownloader`] traits.
//! [`MirrorChyanClient`] implements both against the MirrorChyan HTTP API.

mod mirrorchyan;
mod traits;

pub use mirrorchyan::MirrorChyanClient;
pub use traits::{ArtifactDownloader, DownloadedArtifact, MetadataSource, ReleaseMetadata, ResourceQuery};
