//! # mirror-watch
//!
//! Release monitor for MirrorChyan resources. Each consumer (a chat group)
//! subscribes to resources; every watch is polled on its own interval, new
//! versions are announced with a condensed changelog, and, when enabled, the
//! artifact is downloaded and uploaded into the consumer's group file store
//! without creating duplicates.
//!
//! The core depends only on the collaborator traits in [`source`] and
//! [`remote`]; HTTP adapters for the MirrorChyan API and a OneBot v11
//! endpoint are included.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mirror_watch::{Config, ResourceWatch, UpdateMonitor, Variant, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("mirror-watch.json")?;
//!     let monitor = UpdateMonitor::new(config).await?;
//!
//!     // Rebuild timers for every persisted watch
//!     monitor.start().await?;
//!     monitor
//!         .subscribe("123456", ResourceWatch::new("MaaResource", Variant::CrossPlatform))
//!         .await?;
//!
//!     let mut events = monitor.subscribe_events();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     run_with_shutdown(monitor).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST control surface
pub mod api;
/// Release note condensing
pub mod changelog;
/// Update detection for a single watch
pub mod checker;
/// Configuration types
pub mod config;
/// Artifact download and deduplicated upload
pub mod distribution;
/// Error types
pub mod error;
/// Orchestrator exposing the command operations
pub mod monitor;
/// Subscription document
pub mod registry;
/// Remote file store and notification sink
pub mod remote;
/// Retry logic with exponential backoff
pub mod retry;
/// Per-watch polling timers
pub mod scheduler;
/// Version-metadata source and artifact download
pub mod source;
/// Version state document
pub mod state;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::Config;
pub use error::{ApiError, Error, ErrorDetail, RemoteError, Result, SourceError, ToHttpStatus};
pub use monitor::{Services, UpdateMonitor};
pub use types::{
    Channel, CheckOutcome, DistributionResult, Event, ResourceWatch, Subscription, Variant,
    WatchKey, WatchUpdate,
};

/// Run the monitor until SIGINT or SIGTERM, then shut it down
///
/// On non-unix targets only Ctrl+C is awaited.
///
/// # Example
///
/// ```no_run
/// use mirror_watch::{Config, UpdateMonitor, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let monitor = UpdateMonitor::new(Config::default()).await?;
///     monitor.start().await?;
///     run_with_shutdown(monitor).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(monitor: UpdateMonitor) -> Result<()> {
    wait_for_signal().await;
    monitor.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments; fall back to ctrl_c.
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                _ = sigint.recv() => tracing::info!("Received SIGINT"),
            }
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "SIGINT handler unavailable, waiting for SIGTERM");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM");
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl+C");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
    }
}
