// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::types::Variant;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::time::sleep;

/// Counts firings and tracks how many run at once
#[derive(Default)]
struct CountingHandler {
    ticks: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    finished: AtomicBool,
    work: Duration,
}

impl CountingHandler {
    fn with_work(work: Duration) -> Self {
        Self {
            work,
            ..Default::default()
        }
    }

    fn ticks(&self) -> usize {
        self.ticks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TickHandler for CountingHandler {
    async fn on_tick(&self, _task: &ScheduledWatch) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.work.is_zero() {
            sleep(self.work).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.finished.store(true, Ordering::SeqCst);
    }
}

fn task(consumer: &str, rid: &str) -> ScheduledWatch {
    ScheduledWatch::new(consumer, ResourceWatch::new(rid, Variant::CrossPlatform))
}

#[tokio::test]
async fn test_timer_fires_repeatedly() {
    let handler = Arc::new(CountingHandler::default());
    let scheduler = Scheduler::new(handler.clone());

    scheduler
        .register(task("1", "R"), Duration::from_millis(20))
        .await
        .unwrap();
    sleep(Duration::from_millis(150)).await;

    assert!(handler.ticks() >= 3, "got {} ticks", handler.ticks());
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_first_firing_waits_one_interval() {
    let handler = Arc::new(CountingHandler::default());
    let scheduler = Scheduler::new(handler.clone());

    scheduler
        .register(task("1", "R"), Duration::from_millis(300))
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;

    assert_eq!(handler.ticks(), 0);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_reregister_keeps_single_timer_with_latest_interval() {
    let handler = Arc::new(CountingHandler::default());
    let scheduler = Scheduler::new(handler.clone());
    let t = task("1", "R");

    scheduler
        .register(t.clone(), Duration::from_millis(10))
        .await
        .unwrap();
    scheduler
        .register(t.clone(), Duration::from_secs(3600))
        .await
        .unwrap();

    assert_eq!(scheduler.len().await, 1);
    assert_eq!(
        scheduler.interval_of(&t.key).await,
        Some(Duration::from_secs(3600))
    );

    let before = handler.ticks();
    sleep(Duration::from_millis(80)).await;
    assert_eq!(handler.ticks(), before, "old fast timer must be gone");
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_unregister() {
    let handler = Arc::new(CountingHandler::default());
    let scheduler = Scheduler::new(handler.clone());
    let t = task("1", "R");

    scheduler
        .register(t.clone(), Duration::from_millis(15))
        .await
        .unwrap();
    assert!(scheduler.is_scheduled(&t.key).await);

    assert!(scheduler.unregister(&t.key).await);
    assert!(!scheduler.unregister(&t.key).await);
    assert!(!scheduler.is_scheduled(&t.key).await);

    let before = handler.ticks();
    sleep(Duration::from_millis(60)).await;
    assert_eq!(handler.ticks(), before);
}

#[tokio::test]
async fn test_keys_are_independent() {
    let handler = Arc::new(CountingHandler::default());
    let scheduler = Scheduler::new(handler.clone());

    scheduler
        .register(task("1", "A"), Duration::from_secs(60))
        .await
        .unwrap();
    scheduler
        .register(task("2", "A"), Duration::from_secs(60))
        .await
        .unwrap();
    scheduler
        .register(
            ScheduledWatch::new("1", ResourceWatch::new("A", Variant::Universal)),
            Duration::from_secs(60),
        )
        .await
        .unwrap();

    assert_eq!(scheduler.len().await, 3);
    let mut keys: Vec<String> = scheduler.keys().await.iter().map(|k| k.to_string()).collect();
    keys.sort();
    assert_eq!(keys, vec!["1/A/0", "1/A/1", "2/A/1"]);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn test_firings_for_one_key_never_overlap() {
    let handler = Arc::new(CountingHandler::with_work(Duration::from_millis(40)));
    let scheduler = Scheduler::new(handler.clone());

    scheduler
        .register(task("1", "R"), Duration::from_millis(5))
        .await
        .unwrap();
    sleep(Duration::from_millis(200)).await;
    scheduler.shutdown().await;

    assert!(handler.ticks() >= 2);
    assert_eq!(handler.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_in_flight_check_finishes_after_unregister() {
    let handler = Arc::new(CountingHandler::with_work(Duration::from_millis(100)));
    let scheduler = Scheduler::new(handler.clone());
    let t = task("1", "R");

    scheduler
        .register(t.clone(), Duration::from_millis(10))
        .await
        .unwrap();
    sleep(Duration::from_millis(40)).await;
    assert_eq!(handler.in_flight.load(Ordering::SeqCst), 1);

    scheduler.unregister(&t.key).await;
    sleep(Duration::from_millis(150)).await;

    assert!(handler.finished.load(Ordering::SeqCst));
    assert_eq!(handler.ticks(), 1);
}

#[tokio::test]
async fn test_shutdown_rejects_new_timers() {
    let handler = Arc::new(CountingHandler::default());
    let scheduler = Scheduler::new(handler);

    scheduler
        .register(task("1", "R"), Duration::from_secs(60))
        .await
        .unwrap();
    scheduler.shutdown().await;

    assert!(scheduler.is_empty().await);
    assert!(matches!(
        scheduler
            .register(task("1", "R"), Duration::from_secs(60))
            .await,
        Err(Error::ShuttingDown)
    ));
}

#[tokio::test]
async fn test_zero_interval_is_rejected() {
    let scheduler = Scheduler::new(Arc::new(CountingHandler::default()));
    assert!(matches!(
        scheduler.register(task("1", "R"), Duration::ZERO).await,
        Err(Error::Validation(_))
    ));
}

#[tokio::test]
async fn test_unschedulable_interval_is_rejected_without_timer() {
    let scheduler = Scheduler::new(Arc::new(CountingHandler::default()));
    let key = task("1", "R").key;

    let result = scheduler
        .register(task("1", "R"), Duration::from_secs(u64::MAX))
        .await;

    assert!(matches!(result, Err(Error::Validation(_))));
    assert!(!scheduler.is_scheduled(&key).await);
    assert!(scheduler.is_empty().await);
}
