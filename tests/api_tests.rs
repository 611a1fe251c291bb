//! Hub API integration tests

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use handoff::artifact::SqliteArtifactBackend;
use handoff::bus::InMemoryBus;
use handoff::server::{self, AppState};
use handoff::{Bus, StreamEntry};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tower::ServiceExt;

async fn setup_app(max_artifact_bytes: usize) -> (Router, Arc<InMemoryBus>) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    // Run migrations manually
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artifacts (
            bucket TEXT NOT NULL,
            object_key TEXT NOT NULL,
            bytes BLOB NOT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (bucket, object_key)
        )
        "#,
    )
    .execute(&pool)
    .await
    .expect("Failed to create artifacts table");

    let bus = Arc::new(InMemoryBus::default());
    let state = AppState::new(
        bus.clone(),
        Arc::new(SqliteArtifactBackend::new(pool)),
        max_artifact_bytes,
    );

    (server::router(state), bus)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _bus) = setup_app(1024).await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_publish_then_read() {
    let (app, bus) = setup_app(1024).await;

    let response = app
        .clone()
        .oneshot(post_json("/bus/topics/agent:researcher:inbox", json!({"n": 1})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"id": 1}));

    app.clone()
        .oneshot(post_json("/bus/topics/agent:researcher:inbox", json!({"n": 2})))
        .await
        .unwrap();
    assert_eq!(bus.len("agent:researcher:inbox").await, 2);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/bus/streams/agent:researcher:inbox?since=1&max_count=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let entries: Vec<StreamEntry> = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, 2);
    assert_eq!(entries[0].body, json!({"n": 2}));
}

#[tokio::test]
async fn test_read_unknown_stream_is_empty() {
    let (app, _bus) = setup_app(1024).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/bus/streams/nothing-here")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!([]));
}

#[tokio::test]
async fn test_expire_hides_stream() {
    let (app, bus) = setup_app(1024).await;
    bus.publish("responses:c1", json!("late")).await.unwrap();

    let response = app
        .oneshot(post_json("/bus/streams/responses:c1/expire", json!({"ttl_ms": 0})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert!(bus.read("responses:c1", 10, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_artifact_put_and_get() {
    let (app, _bus) = setup_app(1024).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/artifacts/payloads/abc")
                .body(Body::from(vec![1u8, 2, 3]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/artifacts/payloads/abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.to_vec(), vec![1u8, 2, 3]);
}

#[tokio::test]
async fn test_missing_artifact_is_404() {
    let (app, _bus) = setup_app(1024).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/artifacts/payloads/missing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_oversized_artifact_is_rejected() {
    let (app, _bus) = setup_app(16).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/artifacts/payloads/big")
                .body(Body::from(vec![0u8; 64]))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
