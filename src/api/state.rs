//! Application state for the API server

use crate::{Config, UpdateMonitor};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
#[derive(Clone)]
pub struct AppState {
    /// The monitor whose operations the routes expose
    pub monitor: Arc<UpdateMonitor>,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(monitor: Arc<UpdateMonitor>, config: Arc<Config>) -> Self {
        Self { monitor, config }
    }
}
