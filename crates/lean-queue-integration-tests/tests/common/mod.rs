//! Common test utilities for lean-queue integration tests
//!
//! This module provides:
//! - A fully wired router over the in-memory store with a controllable clock
//! - Request builders and JSON response helpers
//! - Shortcuts for the publish / reserve / remove round trips

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use lean_queue_api::{create_router, AppState, ServiceConfig, ServiceMetrics, StoreHealthChecker};
use lean_queue_core::{
    InMemoryMessageStore, ManualClock, MessageStore, QueueService, Timestamp,
};
use std::sync::Arc;
use tower::ServiceExt;

/// Start of every test clock
pub const EPOCH: &str = "2024-06-01 12:00:00.000000";

/// Router plus the handles a test needs to steer it
pub struct TestApp {
    pub router: Router,
    pub clock: ManualClock,
    pub queue: QueueService,
    pub store: Arc<InMemoryMessageStore>,
    pub metrics: Arc<ServiceMetrics>,
}

pub fn test_app() -> TestApp {
    test_app_with_config(ServiceConfig::default())
}

pub fn test_app_with_config(config: ServiceConfig) -> TestApp {
    let store = Arc::new(InMemoryMessageStore::new());
    let dyn_store: Arc<dyn MessageStore> = store.clone();
    let clock = ManualClock::new(Timestamp::parse(EPOCH).expect("valid epoch"));
    let queue = QueueService::new(dyn_store.clone())
        .with_clock(Arc::new(clock.clone()))
        .with_defaults(config.queue.reservation_defaults());
    let metrics = ServiceMetrics::new().expect("metrics registry");
    let state = AppState::new(
        config,
        queue.clone(),
        Arc::new(StoreHealthChecker::new(dyn_store)),
        metrics.clone(),
    );

    TestApp {
        router: create_router(state),
        clock,
        queue,
        store,
        metrics,
    }
}

/// Send a request and decode the body as JSON (`Null` when empty)
pub async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app
        .router
        .clone()
        .oneshot(request)
        .await
        .expect("router is infallible");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

/// Publish through the HTTP surface and return the new message ID
pub async fn publish(app: &TestApp, queue_name: &str, message: &str) -> String {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/message",
            serde_json::json!({ "queue_name": queue_name, "message": message }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "publish failed: {}", body);
    body["message_id"]
        .as_str()
        .expect("message_id in publish response")
        .to_string()
}

/// Reserve through the HTTP surface and return the leased messages
pub async fn reserve(app: &TestApp, query: &str) -> Vec<serde_json::Value> {
    let (status, body) = send(app, get_request(&format!("/message/next?{}", query))).await;
    assert_eq!(status, StatusCode::OK, "reserve failed: {}", body);
    body.as_array().expect("array response").clone()
}

/// Remove through the HTTP surface and return the response body
pub async fn remove(app: &TestApp, message_id: &str) -> serde_json::Value {
    let (status, body) = send(
        app,
        json_request(
            "DELETE",
            "/message",
            serde_json::json!({ "message_id": message_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "remove failed: {}", body);
    body
}
