//! Error types for mirror-watch
//!
//! This module provides the error handling for the library, including:
//! - The crate-wide [`Error`] type and its [`Result`] alias
//! - Adapter-specific errors for the metadata source and the remote file store
//! - HTTP status code mapping for the REST control surface
//! - Structured error responses with machine-readable error codes

use crate::types::Variant;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for mirror-watch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for mirror-watch
///
/// Each variant carries enough context to produce a useful reply to the
/// consumer that triggered the operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "persistence.data_dir")
        key: Option<String>,
    },

    /// User-supplied input was rejected (bad interval, channel, variant, empty update)
    #[error("invalid input: {0}")]
    Validation(String),

    /// The consumer already watches this resource variant
    #[error("{resource_id} ({variant}) is already subscribed for {consumer_id}")]
    AlreadySubscribed {
        /// Consumer (group) that owns the subscription
        consumer_id: String,
        /// Resource id
        resource_id: String,
        /// Resource variant
        variant: Variant,
    },

    /// Subscription, consumer or resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Distribution was requested but no credential (cdk) is configured
    #[error("no distribution credential configured")]
    MissingCredential,

    /// Metadata source or artifact download error
    #[error("metadata source error: {0}")]
    Source(#[from] SourceError),

    /// Remote file store or notification endpoint error
    #[error("remote endpoint error: {0}")]
    Remote(#[from] RemoteError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation exceeded its time limit
    #[error("timed out after {seconds}s: {operation}")]
    Timeout {
        /// What was being waited on
        operation: String,
        /// Time limit in seconds
        seconds: u64,
    },

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Shutdown in progress
    #[error("shutdown in progress")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Classify a failed HTTP exchange; client-side timeouts become [`Error::Timeout`]
    pub(crate) fn from_request(
        error: reqwest::Error,
        operation: impl Into<String>,
        limit: std::time::Duration,
    ) -> Self {
        if error.is_timeout() {
            Error::Timeout {
                operation: operation.into(),
                seconds: limit.as_secs(),
            }
        } else {
            Error::Network(error)
        }
    }
}

/// Errors reported by the version-metadata source and the artifact download
#[derive(Debug, Error)]
pub enum SourceError {
    /// The API answered with a non-zero business code
    #[error("API returned code {code}: {message}")]
    Api {
        /// Business error code (e.g. 7001 for an expired cdk)
        code: i64,
        /// Message returned by the API
        message: String,
    },

    /// Unexpected HTTP status
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Metadata did not contain a download URL (usually a missing or invalid cdk)
    #[error("no download URL returned for {resource_id}")]
    MissingDownloadUrl {
        /// Resource id
        resource_id: String,
    },

    /// Downloaded file does not match the advertised checksum
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Advertised sha256
        expected: String,
        /// Computed sha256
        actual: String,
    },
}

/// Errors reported by the OneBot-style remote endpoint
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The endpoint processed the action but refused it
    #[error("{action} rejected (retcode {retcode}): {message}")]
    Rejected {
        /// Action name (e.g. "create_group_file_folder")
        action: String,
        /// Return code reported by the endpoint
        retcode: i64,
        /// Message reported by the endpoint
        message: String,
    },

    /// Unexpected HTTP status
    #[error("{action} failed with HTTP {status}")]
    HttpStatus {
        /// Action name
        action: String,
        /// HTTP status code
        status: u16,
    },
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "already_subscribed",
///     "message": "MaaResource (1) is already subscribed for 123456",
///     "details": { "consumer_id": "123456", "rid": "MaaResource", "type": 1 }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } | Error::Validation(_) => 400,
            Error::MissingCredential => 412,
            Error::NotFound(_) => 404,
            Error::AlreadySubscribed { .. } => 409,

            Error::Source(_) | Error::Remote(_) | Error::Network(_) => 502,
            Error::Timeout { .. } => 504,

            Error::ShuttingDown => 503,

            Error::Io(_) | Error::Serialization(_) | Error::ApiServerError(_) | Error::Other(_) => {
                500
            }
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Validation(_) => "validation_error",
            Error::AlreadySubscribed { .. } => "already_subscribed",
            Error::NotFound(_) => "not_found",
            Error::MissingCredential => "missing_credential",
            Error::Source(e) => match e {
                SourceError::Api { .. } => "source_api_error",
                SourceError::HttpStatus { .. } => "source_http_error",
                SourceError::MissingDownloadUrl { .. } => "missing_download_url",
                SourceError::ChecksumMismatch { .. } => "checksum_mismatch",
            },
            Error::Remote(e) => match e {
                RemoteError::Rejected { .. } => "remote_rejected",
                RemoteError::HttpStatus { .. } => "remote_http_error",
            },
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Timeout { .. } => "timeout",
            Error::ApiServerError(_) => "api_server_error",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::AlreadySubscribed {
                consumer_id,
                resource_id,
                variant,
            } => Some(serde_json::json!({
                "consumer_id": consumer_id,
                "rid": resource_id,
                "type": variant.as_u8(),
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({ "key": key })),
            Error::Source(SourceError::Api { code, .. }) => {
                Some(serde_json::json!({ "source_code": code }))
            }
            Error::Remote(RemoteError::Rejected {
                action, retcode, ..
            }) => Some(serde_json::json!({
                "action": action,
                "retcode": retcode,
            })),
            _ => None,
        };

        Self {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
