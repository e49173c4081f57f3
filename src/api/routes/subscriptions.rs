//! Subscription handlers.

use crate::api::AppState;
use crate::error::Error;
use crate::types::{ResourceWatch, Variant, WatchUpdate};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// GET /consumers/:consumer/subscriptions - List watches
pub async fn list_subscriptions(
    State(state): State<AppState>,
    Path(consumer): Path<String>,
) -> impl IntoResponse {
    Json(state.monitor.list(&consumer).await)
}

/// POST /consumers/:consumer/subscriptions - Subscribe
pub async fn add_subscription(
    State(state): State<AppState>,
    Path(consumer): Path<String>,
    Json(watch): Json<ResourceWatch>,
) -> Response {
    match state.monitor.subscribe(&consumer, watch).await {
        Ok(stored) => (StatusCode::CREATED, Json(stored)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// PATCH /consumers/:consumer/subscriptions/:rid/:variant - Change a watch
pub async fn update_subscription(
    State(state): State<AppState>,
    Path((consumer, rid, variant)): Path<(String, String, String)>,
    Json(update): Json<WatchUpdate>,
) -> Response {
    let variant = match variant.parse::<Variant>() {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };
    match state
        .monitor
        .reconfigure(&consumer, &rid, variant, update)
        .await
    {
        Ok(watch) => Json(watch).into_response(),
        Err(e) => e.into_response(),
    }
}

/// DELETE /consumers/:consumer/subscriptions/:rid/:variant - Unsubscribe
pub async fn delete_subscription(
    State(state): State<AppState>,
    Path((consumer, rid, variant)): Path<(String, String, String)>,
) -> Response {
    let result = match variant.parse::<Variant>() {
        Ok(variant) => state.monitor.unsubscribe(&consumer, &rid, variant).await,
        Err(e) => Err::<(), Error>(e),
    };
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}
