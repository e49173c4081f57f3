//! REST control surface
//!
//! An axum router exposing the monitor's command operations over HTTP, for
//! front ends that cannot link the library directly.

use crate::{Config, Result, UpdateMonitor};
use axum::{
    Router, middleware,
    routing::{get, patch, post, put},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod error_response;
pub mod routes;
pub mod state;

pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Subscriptions
/// - `GET /consumers/:consumer/subscriptions` - List a consumer's watches
/// - `POST /consumers/:consumer/subscriptions` - Subscribe (body: watch)
/// - `PATCH /consumers/:consumer/subscriptions/:rid/:variant` - Change a watch
/// - `DELETE /consumers/:consumer/subscriptions/:rid/:variant` - Unsubscribe
///
/// ## Actions
/// - `POST /consumers/:consumer/check` - Check now (body: `{ rid?, force }`)
/// - `POST /consumers/:consumer/download` - Distribute the latest release
/// - `PUT /credential` - Replace the distribution credential
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /events` - Server-sent events stream
pub fn create_router(monitor: Arc<UpdateMonitor>, config: Arc<Config>) -> Router {
    let state = AppState::new(monitor, config.clone());

    let router = Router::new()
        // Subscriptions
        .route(
            "/consumers/:consumer/subscriptions",
            get(routes::list_subscriptions).post(routes::add_subscription),
        )
        .route(
            "/consumers/:consumer/subscriptions/:rid/:variant",
            patch(routes::update_subscription).delete(routes::delete_subscription),
        )
        // Actions
        .route("/consumers/:consumer/check", post(routes::check_now))
        .route("/consumers/:consumer/download", post(routes::download_now))
        .route("/credential", put(routes::set_credential))
        // System
        .route("/health", get(routes::health_check))
        .route("/events", get(routes::event_stream))
        .with_state(state);

    // The last layer applied is the outermost, so tracing wraps auth and
    // rejected requests are still logged.
    let router = if config.api.api_key.is_some() {
        router.layer(middleware::from_fn_with_state(
            config.api.api_key.clone(),
            auth::require_api_key,
        ))
    } else {
        router
    };

    router.layer(TraceLayer::new_for_http())
}

/// Start the API server on the configured bind address
///
/// Runs until the listener fails or the task is dropped.
///
/// # Example
///
/// ```no_run
/// use mirror_watch::{Config, UpdateMonitor};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let monitor = Arc::new(UpdateMonitor::new((*config).clone()).await?);
/// monitor.start().await?;
///
/// mirror_watch::api::start_api_server(monitor, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(monitor: Arc<UpdateMonitor>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.api.bind_address;
    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(monitor, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %listener.local_addr().map_err(crate::error::Error::Io)?,
        "API server listening"
    );

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
