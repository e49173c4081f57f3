//! Orchestrator wiring the stores, the checker, the pipeline and the
//! scheduler together.
//!
//! The `UpdateMonitor` methods are organized by domain:
//! - [`subscriptions`] - Subscribe, unsubscribe, reconfigure, list, credential
//! - [`checks`] - Manual checks and on-demand distribution
//! - [`lifecycle`] - Startup timer rebuild and graceful shutdown

mod checks;
mod lifecycle;
mod subscriptions;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use subscriptions::describe_watches;

use crate::checker::UpdateChecker;
use crate::config::Config;
use crate::distribution::DistributionPipeline;
use crate::error::Result;
use crate::registry::SubscriptionRegistry;
use crate::remote::{FileStore, Notifier, OneBotClient};
use crate::scheduler::Scheduler;
use crate::source::{ArtifactDownloader, MetadataSource, MirrorChyanClient};
use crate::state::VersionStore;
use crate::types::Event;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// External collaborators of the monitor
///
/// [`UpdateMonitor::new`] builds these from configuration; tests and other
/// transports pass their own through [`UpdateMonitor::with_services`].
#[derive(Clone)]
pub struct Services {
    /// Where release metadata comes from
    pub source: Arc<dyn MetadataSource>,
    /// How artifacts are fetched
    pub downloader: Arc<dyn ArtifactDownloader>,
    /// Consumer file stores
    pub store: Arc<dyn FileStore>,
    /// Consumer notifications
    pub notifier: Arc<dyn Notifier>,
}

impl Services {
    /// HTTP adapters for MirrorChyan and a OneBot endpoint
    pub fn from_config(config: &Config) -> Result<Self> {
        let mirror = Arc::new(MirrorChyanClient::new(&config.source)?);
        let onebot = Arc::new(OneBotClient::new(&config.onebot)?);
        Ok(Self {
            source: mirror.clone(),
            downloader: mirror,
            store: onebot.clone(),
            notifier: onebot,
        })
    }
}

/// Main monitor instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct UpdateMonitor {
    /// Configuration
    pub(crate) config: Arc<Config>,
    /// Subscription document
    pub(crate) registry: Arc<SubscriptionRegistry>,
    /// Version state document
    pub(crate) state: Arc<VersionStore>,
    /// Metadata source used for on-demand distribution
    pub(crate) source: Arc<dyn MetadataSource>,
    /// Update checker, also the scheduler's tick handler
    pub(crate) checker: Arc<UpdateChecker>,
    /// Download-and-upload pipeline
    pub(crate) distribution: Arc<DistributionPipeline>,
    /// Per-watch timers
    pub(crate) scheduler: Arc<Scheduler>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Serializes registry mutations with their timer changes
    pub(crate) ops_lock: Arc<tokio::sync::Mutex<()>>,
    /// Cleared once shutdown starts
    pub(crate) accepting: Arc<AtomicBool>,
}

impl UpdateMonitor {
    /// Create a monitor talking to MirrorChyan and a OneBot endpoint
    ///
    /// Loads both documents from `persistence.data_dir`. Timers are not
    /// started until [`start`](Self::start) is called.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let services = Services::from_config(&config)?;
        Self::with_services(config, services).await
    }

    /// Create a monitor over caller-supplied collaborators
    pub async fn with_services(config: Config, services: Services) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(SubscriptionRegistry::load(config.subscriptions_path()).await);
        let state = Arc::new(VersionStore::load(config.state_path()).await);

        // Buffer of 1000 events, each subscriber receives all of them
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let distribution = Arc::new(DistributionPipeline::new(
            services.downloader,
            services.store,
            config.distribution.clone(),
        ));
        let checker = Arc::new(UpdateChecker::new(
            services.source.clone(),
            services.notifier,
            state.clone(),
            registry.clone(),
            distribution.clone(),
            config.retry.clone(),
            event_tx.clone(),
        ));
        let scheduler = Arc::new(Scheduler::new(checker.clone()));

        Ok(Self {
            config: Arc::new(config),
            registry,
            state,
            source: services.source,
            checker,
            distribution,
            scheduler,
            event_tx,
            ops_lock: Arc::new(tokio::sync::Mutex::new(())),
            accepting: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Subscribe to monitor events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of live timers
    pub async fn scheduled_count(&self) -> usize {
        self.scheduler.len().await
    }

    pub(crate) fn ensure_accepting(&self) -> Result<()> {
        if self.accepting.load(std::sync::atomic::Ordering::SeqCst) {
            Ok(())
        } else {
            Err(crate::error::Error::ShuttingDown)
        }
    }
}
