//! Manual check, download and credential handlers.

use super::{CheckRequest, CredentialRequest, DownloadRequest};
use crate::api::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// POST /consumers/:consumer/check - Check watches now
///
/// Responds with one outcome per checked watch.
pub async fn check_now(
    State(state): State<AppState>,
    Path(consumer): Path<String>,
    Json(request): Json<CheckRequest>,
) -> Response {
    match state
        .monitor
        .check_now(&consumer, request.rid.as_deref(), request.force)
        .await
    {
        Ok(outcomes) => Json(json!({ "outcomes": outcomes })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /consumers/:consumer/download - Distribute the latest release
///
/// Download and upload failures are part of the 200 body (`ok: false`).
pub async fn download_now(
    State(state): State<AppState>,
    Path(consumer): Path<String>,
    Json(request): Json<DownloadRequest>,
) -> Response {
    match state
        .monitor
        .download_now(&consumer, &request.rid, request.variant, request.channel)
        .await
    {
        Ok(result) => Json(result).into_response(),
        Err(e) => e.into_response(),
    }
}

/// PUT /credential - Replace the distribution credential
pub async fn set_credential(
    State(state): State<AppState>,
    Json(request): Json<CredentialRequest>,
) -> Response {
    match state.monitor.set_credential(&request.cdk).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}
