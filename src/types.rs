//! Core types: resource watches, subscriptions, keys and events

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Minimum allowed polling interval for a watch, in seconds
pub const MIN_INTERVAL_SECS: u64 = 60;

/// Maximum allowed polling interval for a watch (30 days), in seconds
pub const MAX_INTERVAL_SECS: u64 = 30 * 24 * 60 * 60;

/// Default polling interval for a watch, in seconds
pub const DEFAULT_INTERVAL_SECS: u64 = 600;

/// Build flavour of a resource
///
/// Serialized as the integer the upstream API and the persisted documents
/// use (`0` = universal, `1` = cross-platform).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Variant {
    /// Platform-independent package
    Universal,
    /// Platform-specific package (resolved as win-x64)
    #[default]
    CrossPlatform,
}

impl Variant {
    /// Integer wire value
    pub fn as_u8(&self) -> u8 {
        match self {
            Variant::Universal => 0,
            Variant::CrossPlatform => 1,
        }
    }

    /// Human-readable label used in replies
    pub fn display_label(&self) -> &'static str {
        match self {
            Variant::Universal => "通用",
            Variant::CrossPlatform => "跨平台",
        }
    }

    /// Label embedded in artifact file names
    pub fn file_label(&self) -> &'static str {
        match self {
            Variant::Universal => "通用",
            Variant::CrossPlatform => "win-x64",
        }
    }

    /// `(os, arch)` query parameters for the metadata source, if any
    pub fn platform(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Variant::Universal => None,
            Variant::CrossPlatform => Some(("win", "x64")),
        }
    }
}

impl TryFrom<u8> for Variant {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Variant::Universal),
            1 => Ok(Variant::CrossPlatform),
            other => Err(format!(
                "type must be 0 (universal) or 1 (cross-platform), got {other}"
            )),
        }
    }
}

impl From<Variant> for u8 {
    fn from(variant: Variant) -> Self {
        variant.as_u8()
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

impl FromStr for Variant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "universal" => Ok(Variant::Universal),
            "1" | "cross-platform" | "crossplatform" => Ok(Variant::CrossPlatform),
            _ => Err(Error::Validation(format!(
                "type must be 0 (universal) or 1 (cross-platform), got '{s}'"
            ))),
        }
    }
}

/// Release channel of a resource
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Stable releases (default)
    #[default]
    Stable,
    /// Beta releases
    Beta,
    /// Alpha releases
    Alpha,
}

impl Channel {
    /// Wire value used by the metadata source and in state keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Stable => "stable",
            Channel::Beta => "beta",
            Channel::Alpha => "alpha",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "stable" => Ok(Channel::Stable),
            "beta" => Ok(Channel::Beta),
            "alpha" => Ok(Channel::Alpha),
            _ => Err(Error::Validation(format!(
                "channel must be stable, beta or alpha, got '{s}'"
            ))),
        }
    }
}

/// A single resource watched by a consumer
///
/// Field names match the persisted `config.json` document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceWatch {
    /// Resource id on the metadata source
    pub rid: String,

    /// Build flavour
    #[serde(rename = "type", default)]
    pub variant: Variant,

    /// Release channel
    #[serde(default)]
    pub channel: Channel,

    /// Polling interval in seconds, between [`MIN_INTERVAL_SECS`] and [`MAX_INTERVAL_SECS`]
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Download and upload new versions automatically
    #[serde(default)]
    pub auto: bool,
}

impl ResourceWatch {
    /// Create a watch with default channel, interval and no auto-distribution
    pub fn new(rid: impl Into<String>, variant: Variant) -> Self {
        Self {
            rid: rid.into(),
            variant,
            channel: Channel::default(),
            interval: DEFAULT_INTERVAL_SECS,
            auto: false,
        }
    }

    /// Whether this watch has the given identity
    pub fn matches(&self, rid: &str, variant: Variant) -> bool {
        self.rid == rid && self.variant == variant
    }

    /// Reject watches that cannot be scheduled
    pub fn validate(&self) -> crate::Result<()> {
        if self.rid.trim().is_empty() {
            return Err(Error::Validation("resource id cannot be empty".into()));
        }
        // `|` separates the parts of the state key
        if self.rid.contains('|') {
            return Err(Error::Validation(format!(
                "resource id cannot contain '|': {}",
                self.rid
            )));
        }
        validate_interval(self.interval)
    }

    /// Composite version-state key for this watch
    pub fn state_key(&self) -> StateKey {
        StateKey::new(&self.rid, self.variant, self.channel)
    }
}

/// Reject polling intervals outside [`MIN_INTERVAL_SECS`]..=[`MAX_INTERVAL_SECS`]
pub fn validate_interval(interval: u64) -> crate::Result<()> {
    if interval < MIN_INTERVAL_SECS {
        return Err(Error::Validation(format!(
            "interval must be at least {MIN_INTERVAL_SECS} seconds, got {interval}"
        )));
    }
    if interval > MAX_INTERVAL_SECS {
        return Err(Error::Validation(format!(
            "interval must be at most {MAX_INTERVAL_SECS} seconds, got {interval}"
        )));
    }
    Ok(())
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

/// All watches of one consumer (chat group)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Consumer id (group id)
    #[serde(rename = "group_id", alias = "consumer_id")]
    pub consumer_id: String,

    /// Watches in subscription order
    #[serde(default)]
    pub resources: Vec<ResourceWatch>,
}

impl Subscription {
    /// Create an empty subscription for a consumer
    pub fn new(consumer_id: impl Into<String>) -> Self {
        Self {
            consumer_id: consumer_id.into(),
            resources: Vec::new(),
        }
    }

    /// Find a watch by identity
    pub fn find(&self, rid: &str, variant: Variant) -> Option<&ResourceWatch> {
        self.resources.iter().find(|r| r.matches(rid, variant))
    }
}

/// Partial update applied to an existing watch
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchUpdate {
    /// New polling interval in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,

    /// New auto-distribution flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto: Option<bool>,

    /// New release channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
}

impl WatchUpdate {
    /// True when no field would change
    pub fn is_empty(&self) -> bool {
        self.interval.is_none() && self.auto.is_none() && self.channel.is_none()
    }

    /// Apply the set fields to a watch
    pub fn apply_to(&self, watch: &mut ResourceWatch) {
        if let Some(interval) = self.interval {
            watch.interval = interval;
        }
        if let Some(auto) = self.auto {
            watch.auto = auto;
        }
        if let Some(channel) = self.channel {
            watch.channel = channel;
        }
    }
}

/// Identity of a scheduled watch: one timer per key
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatchKey {
    /// Consumer id
    pub consumer_id: String,
    /// Resource id
    pub rid: String,
    /// Resource variant
    pub variant: Variant,
}

impl WatchKey {
    /// Build a key from its parts
    pub fn new(consumer_id: impl Into<String>, rid: impl Into<String>, variant: Variant) -> Self {
        Self {
            consumer_id: consumer_id.into(),
            rid: rid.into(),
            variant,
        }
    }

    /// Key of a consumer's watch
    pub fn for_watch(consumer_id: &str, watch: &ResourceWatch) -> Self {
        Self::new(consumer_id, watch.rid.clone(), watch.variant)
    }
}

impl fmt::Display for WatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.consumer_id, self.rid, self.variant)
    }
}

/// Composite key of the version state document: `rid|type|channel`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StateKey(String);

impl StateKey {
    /// Build the key for a resource variant on a channel
    pub fn new(rid: &str, variant: Variant, channel: Channel) -> Self {
        Self(format!("{}|{}|{}", rid, variant.as_u8(), channel.as_str()))
    }

    /// The key as stored in the document
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a distribution attempt
///
/// Success-shaped results include the duplicate skip; `uploaded` tells the
/// two apart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionResult {
    /// Whether the artifact is present in the destination afterwards
    pub ok: bool,
    /// Human-readable summary for the consumer
    pub message: String,
    /// Canonical remote file name, once known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Whether this call performed the upload
    pub uploaded: bool,
    /// Non-fatal problem (e.g. fell back to the store root)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl DistributionResult {
    pub(crate) fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            file_name: None,
            uploaded: false,
            warning: None,
        }
    }
}

/// Outcome of one update check
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckOutcome {
    /// Metadata could not be fetched or carried no version
    NoMetadata,
    /// Remote version equals the stored one
    Unchanged {
        /// Current version
        version: String,
    },
    /// A new version was recorded and announced
    Updated {
        /// New version
        version: String,
        /// Result of the automatic distribution, when it ran
        distribution: Option<DistributionResult>,
    },
    /// A new version was seen but could not be recorded; nothing was announced
    NotRecorded {
        /// New version
        version: String,
    },
    /// Forced check: version announced without touching state
    Shown {
        /// Current version
        version: String,
    },
}

/// Event emitted by the monitor
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A watch was added
    Subscribed {
        /// Watch identity
        key: WatchKey,
        /// Polling interval in seconds
        interval: u64,
    },

    /// A watch was removed
    Unsubscribed {
        /// Watch identity
        key: WatchKey,
    },

    /// A watch was changed
    Reconfigured {
        /// Watch identity
        key: WatchKey,
        /// Polling interval in seconds after the change
        interval: u64,
    },

    /// A new version was detected and recorded
    UpdateDetected {
        /// Watch identity
        key: WatchKey,
        /// New version
        version: String,
        /// Previously recorded version, if any
        #[serde(skip_serializing_if = "Option::is_none")]
        previous: Option<String>,
        /// Unix timestamp of the detection
        detected_at: i64,
    },

    /// A distribution attempt finished
    DistributionFinished {
        /// Consumer id
        consumer_id: String,
        /// Resource id
        rid: String,
        /// Result of the attempt
        result: DistributionResult,
    },

    /// Notification delivery failed
    NotificationFailed {
        /// Consumer id
        consumer_id: String,
        /// Error message
        error: String,
    },

    /// Graceful shutdown initiated
    Shutdown,
}

impl Event {
    /// Stable snake_case name of the event, matching its `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Subscribed { .. } => "subscribed",
            Event::Unsubscribed { .. } => "unsubscribed",
            Event::Reconfigured { .. } => "reconfigured",
            Event::UpdateDetected { .. } => "update_detected",
            Event::DistributionFinished { .. } => "distribution_finished",
            Event::NotificationFailed { .. } => "notification_failed",
            Event::Shutdown => "shutdown",
        }
    }
}
