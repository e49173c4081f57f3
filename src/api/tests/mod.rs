use super::*;
use crate::monitor::test_helpers::{TestMonitor, create_test_monitor};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

fn router_for(t: &TestMonitor) -> Router {
    create_router(Arc::new(t.monitor.clone()), Arc::new(t.config.clone()))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health_check() {
    let t = create_test_monitor("v1").await;
    let app = router_for(&t);

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["timers"], 0);
}

#[tokio::test]
async fn test_subscription_lifecycle() {
    let t = create_test_monitor("v1").await;
    let app = router_for(&t);

    let (status, body) = send(
        &app,
        "POST",
        "/consumers/100/subscriptions",
        Some(json!({ "rid": "MAA", "type": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["interval"], 600);
    assert_eq!(body["channel"], "stable");

    let (status, body) = send(
        &app,
        "POST",
        "/consumers/100/subscriptions",
        Some(json!({ "rid": "MAA", "type": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "already_subscribed");

    let (status, body) = send(
        &app,
        "PATCH",
        "/consumers/100/subscriptions/MAA/0",
        Some(json!({ "interval": 900, "channel": "beta" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["interval"], 900);
    assert_eq!(body["channel"], "beta");

    let (status, body) = send(&app, "GET", "/consumers/100/subscriptions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "DELETE", "/consumers/100/subscriptions/MAA/0", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, "DELETE", "/consumers/100/subscriptions/MAA/0", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
    t.monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_input_is_bad_request() {
    let t = create_test_monitor("v1").await;
    let app = router_for(&t);

    let (status, body) = send(
        &app,
        "POST",
        "/consumers/100/subscriptions",
        Some(json!({ "rid": "MAA", "interval": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");

    let (status, _) = send(
        &app,
        "PATCH",
        "/consumers/100/subscriptions/MAA/9",
        Some(json!({ "auto": true })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_check_returns_outcomes() {
    let t = create_test_monitor("v2").await;
    let app = router_for(&t);
    send(
        &app,
        "POST",
        "/consumers/100/subscriptions",
        Some(json!({ "rid": "MAA" })),
    )
    .await;

    let (status, body) = send(
        &app,
        "POST",
        "/consumers/100/check",
        Some(json!({ "rid": "MAA" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcomes"][0]["outcome"], "updated");
    assert_eq!(body["outcomes"][0]["version"], "v2");

    let (status, _) = send(
        &app,
        "POST",
        "/consumers/100/check",
        Some(json!({ "rid": "M9A", "force": true })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    t.monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_download_requires_credential_then_uploads() {
    let t = create_test_monitor("v3").await;
    let app = router_for(&t);

    let (status, body) = send(
        &app,
        "POST",
        "/consumers/100/download",
        Some(json!({ "rid": "MAA", "type": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(body["error"]["code"], "missing_credential");

    let (status, _) = send(&app, "PUT", "/credential", Some(json!({ "cdk": "abc" }))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(
        &app,
        "POST",
        "/consumers/100/download",
        Some(json!({ "rid": "MAA", "type": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["file_name"], "MAA-win-x64-v3.zip");
    assert_eq!(t.store.uploads().len(), 1);
}

#[tokio::test]
async fn test_api_key_applies_to_every_route() {
    let mut t = create_test_monitor("v1").await;
    t.config.api.api_key = Some("k".to_string());
    let app = router_for(&t);

    let (status, _) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/health")
        .header("X-Api-Key", "k")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_events_stream_is_sse() {
    let t = create_test_monitor("v1").await;
    let app = router_for(&t);

    let request = Request::builder().uri("/events").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
}

#[tokio::test]
async fn test_api_server_binds() {
    let mut t = create_test_monitor("v1").await;
    t.config.api.bind_address = "127.0.0.1:0".parse().unwrap();

    let handle = tokio::spawn(start_api_server(
        Arc::new(t.monitor.clone()),
        Arc::new(t.config.clone()),
    ));
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(!handle.is_finished());
    handle.abort();
}
