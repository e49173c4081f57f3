//! Shared test helpers for creating UpdateMonitor instances in tests.

use crate::config::Config;
use crate::monitor::{Services, UpdateMonitor};
use crate::test_helpers::{FakeNotifier, FakeSource, FakeStore, metadata};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Monitor over in-memory fakes, plus handles to the fakes
pub(crate) struct TestMonitor {
    pub monitor: UpdateMonitor,
    pub source: Arc<FakeSource>,
    pub store: Arc<FakeStore>,
    pub notifier: Arc<FakeNotifier>,
    pub config: Config,
    /// Keeps the data directory alive
    pub dir: TempDir,
}

/// Config rooted in `dir` with fast retries
pub(crate) fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.persistence.data_dir = dir.path().join("data");
    config.distribution.staging_dir = dir.path().join("staging");
    config.retry.initial_delay = Duration::from_millis(1);
    config.retry.max_delay = Duration::from_millis(5);
    config.retry.jitter = false;
    config
}

/// Build a monitor whose source currently serves `version`
pub(crate) async fn create_test_monitor(version: &str) -> TestMonitor {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    monitor_in(dir, config, version).await
}

/// Build a monitor over an existing directory and config
pub(crate) async fn monitor_in(dir: TempDir, config: Config, version: &str) -> TestMonitor {
    let source = Arc::new(FakeSource::with_release(metadata(
        version,
        "### Fixes\n- one",
    )));
    let store = Arc::new(FakeStore::default());
    let notifier = Arc::new(FakeNotifier::default());

    let services = Services {
        source: source.clone(),
        downloader: source.clone(),
        store: store.clone(),
        notifier: notifier.clone(),
    };
    let monitor = UpdateMonitor::with_services(config.clone(), services)
        .await
        .unwrap();

    TestMonitor {
        monitor,
        source,
        store,
        notifier,
        config,
        dir,
    }
}
