//! Configuration types for mirror-watch

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, path::PathBuf, time::Duration};

/// Main configuration for [`UpdateMonitor`](crate::UpdateMonitor)
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where the subscription and version-state documents live
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Version-metadata source and artifact download endpoint
    #[serde(default)]
    pub source: SourceConfig,

    /// OneBot endpoint used for notifications and group files
    #[serde(default)]
    pub onebot: OneBotConfig,

    /// Download and upload behaviour
    #[serde(default)]
    pub distribution: DistributionConfig,

    /// Retry policy for metadata fetches
    #[serde(default)]
    pub retry: RetryConfig,

    /// REST control surface
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.distribution.folder_resolve_attempts == 0 {
            return Err(Error::Config {
                message: "folder_resolve_attempts must be at least 1".into(),
                key: Some("distribution.folder_resolve_attempts".into()),
            });
        }
        if url::Url::parse(&self.source.base_url).is_err() {
            return Err(Error::Config {
                message: format!("invalid source base_url '{}'", self.source.base_url),
                key: Some("source.base_url".into()),
            });
        }
        if url::Url::parse(&self.onebot.base_url).is_err() {
            return Err(Error::Config {
                message: format!("invalid onebot base_url '{}'", self.onebot.base_url),
                key: Some("onebot.base_url".into()),
            });
        }
        Ok(())
    }

    /// Full path of the subscription document
    pub fn subscriptions_path(&self) -> PathBuf {
        self.persistence
            .data_dir
            .join(&self.persistence.subscriptions_file)
    }

    /// Full path of the version-state document
    pub fn state_path(&self) -> PathBuf {
        self.persistence.data_dir.join(&self.persistence.state_file)
    }
}

/// Document locations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Data directory (default: "./data")
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Subscription document file name (default: "config.json")
    #[serde(default = "default_subscriptions_file")]
    pub subscriptions_file: String,

    /// Version-state document file name (default: "state.json")
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            subscriptions_file: default_subscriptions_file(),
            state_file: default_state_file(),
        }
    }
}

/// Metadata source settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
    /// API base URL (default: "https://mirrorchyan.com")
    #[serde(default = "default_source_base_url")]
    pub base_url: String,

    /// User agent reported to the API
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout for metadata requests (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Timeout for a whole artifact download (default: 30 minutes)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub download_timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_source_base_url(),
            user_agent: default_user_agent(),
            timeout: default_request_timeout(),
            download_timeout: default_download_timeout(),
        }
    }
}

/// OneBot HTTP endpoint settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OneBotConfig {
    /// Endpoint base URL (default: "http://127.0.0.1:3000")
    #[serde(default = "default_onebot_base_url")]
    pub base_url: String,

    /// Bearer token, if the endpoint requires one
    #[serde(default)]
    pub access_token: Option<String>,

    /// Timeout for ordinary actions (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Timeout for file uploads (default: 10 minutes)
    #[serde(default = "default_upload_timeout", with = "duration_serde")]
    pub upload_timeout: Duration,
}

impl Default for OneBotConfig {
    fn default() -> Self {
        Self {
            base_url: default_onebot_base_url(),
            access_token: None,
            timeout: default_request_timeout(),
            upload_timeout: default_upload_timeout(),
        }
    }
}

/// Distribution pipeline settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Local staging directory for downloaded artifacts (default: "./data/staging")
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Suffix appended to the resource id to name its remote folder (default: "下载")
    #[serde(default = "default_folder_suffix")]
    pub folder_suffix: String,

    /// Rounds of list/create when resolving the remote folder (default: 3)
    #[serde(default = "default_folder_resolve_attempts")]
    pub folder_resolve_attempts: u32,

    /// Extension used when the download URL has none (default: "zip")
    #[serde(default = "default_extension")]
    pub default_extension: String,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            folder_suffix: default_folder_suffix(),
            folder_resolve_attempts: default_folder_resolve_attempts(),
            default_extension: default_extension(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Require this value in the X-Api-Key header
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_key: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_subscriptions_file() -> String {
    "config.json".into()
}

fn default_state_file() -> String {
    "state.json".into()
}

fn default_source_base_url() -> String {
    "https://mirrorchyan.com".into()
}

fn default_user_agent() -> String {
    concat!("mirror-watch/", env!("CARGO_PKG_VERSION")).into()
}

fn default_onebot_base_url() -> String {
    "http://127.0.0.1:3000".into()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_upload_timeout() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./data/staging")
}

fn default_folder_suffix() -> String {
    "下载".into()
}

fn default_folder_resolve_attempts() -> u32 {
    3
}

fn default_extension() -> String {
    "zip".into()
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
