use super::*;
use crate::error::Error;
use crate::monitor::test_helpers::{create_test_monitor, monitor_in, test_config};
use crate::types::{Channel, CheckOutcome, Event, ResourceWatch, StateKey, Variant, WatchKey, WatchUpdate};
use std::sync::atomic::Ordering;
use std::time::Duration;


fn watch(rid: &str, variant: Variant) -> ResourceWatch {
    ResourceWatch::new(rid, variant)
}
