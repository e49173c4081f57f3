//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`subscriptions`] - Watch management per consumer
//! - [`actions`] - Manual checks, downloads and the credential
//! - [`system`] - Health and events

use crate::types::{Channel, Variant};
use serde::{Deserialize, Serialize};

mod actions;
mod subscriptions;
mod system;

pub use actions::*;
pub use subscriptions::*;
pub use system::*;

/// Body of POST /consumers/:consumer/check
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CheckRequest {
    /// Only check watches of this resource
    #[serde(default)]
    pub rid: Option<String>,
    /// Announce the current release even if it is not new
    #[serde(default)]
    pub force: bool,
}

/// Body of POST /consumers/:consumer/download
#[derive(Debug, Deserialize, Serialize)]
pub struct DownloadRequest {
    /// Resource id
    pub rid: String,
    /// Build flavour (default: cross-platform)
    #[serde(rename = "type", default)]
    pub variant: Variant,
    /// Release channel (default: stable)
    #[serde(default)]
    pub channel: Channel,
}

/// Body of PUT /credential
#[derive(Debug, Deserialize, Serialize)]
pub struct CredentialRequest {
    /// New cdk; empty clears it
    pub cdk: String,
}
