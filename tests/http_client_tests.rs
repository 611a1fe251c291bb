//! HTTP bus and artifact clients, against mocks and against a live hub

use handoff::artifact::{HttpArtifactBackend, InMemoryArtifactBackend};
use handoff::bus::{HttpBus, InMemoryBus};
use handoff::error::{ArtifactError, BusError};
use handoff::server::{self, AppState};
use handoff::{
    AgentContext, AgentInbox, ArtifactBackend, ArtifactStore, Bus, DelegationResult, Payload,
    SubstrateConfig, TaskDelegator,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup_server() -> SocketAddr {
    let state = AppState::new(
        Arc::new(InMemoryBus::default()),
        Arc::new(InMemoryArtifactBackend::new()),
        8 * 1024 * 1024,
    );
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

    addr
}

#[tokio::test]
async fn test_publish_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bus/topics/agent:researcher:inbox"))
        .and(body_json(json!({"hello": "world"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 3})))
        .mount(&mock_server)
        .await;

    let bus = HttpBus::new(mock_server.uri());
    let id = bus
        .publish("agent:researcher:inbox", json!({"hello": "world"}))
        .await
        .unwrap();

    assert_eq!(id, 3);
}

#[tokio::test]
async fn test_publish_error_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bus/topics/agent:researcher:inbox"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&mock_server)
        .await;

    let bus = HttpBus::new(mock_server.uri());
    let err = bus
        .publish("agent:researcher:inbox", json!({}))
        .await
        .unwrap_err();

    match err {
        BusError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "Internal Server Error");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_read_sends_cursor() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/bus/streams/responses"))
        .and(query_param("since", "4"))
        .and(query_param("max_count", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 5, "body": {"n": 5}, "published_at": "2026-01-10T00:00:00Z"}
        ])))
        .mount(&mock_server)
        .await;

    let bus = HttpBus::new(mock_server.uri());
    let entries = bus.read("responses", 2, Some(4)).await.unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, 5);
    assert_eq!(entries[0].body, json!({"n": 5}));
}

#[tokio::test]
async fn test_expire_sends_ttl() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bus/streams/responses/expire"))
        .and(body_json(json!({"ttl_ms": 1500})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let bus = HttpBus::new(mock_server.uri());
    bus.expire("responses", Duration::from_millis(1500))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_artifact_get_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/artifacts/payloads/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let backend = HttpArtifactBackend::new(mock_server.uri());
    let err = backend.get("payloads", "gone").await.unwrap_err();

    assert!(matches!(err, ArtifactError::NotFound { .. }));
}

#[tokio::test]
async fn test_artifact_put_failure_is_backend_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/artifacts/payloads/k"))
        .respond_with(ResponseTemplate::new(507).set_body_string("disk full"))
        .mount(&mock_server)
        .await;

    let backend = HttpArtifactBackend::new(mock_server.uri());
    let err = backend
        .put("payloads", "k", b"bytes".to_vec())
        .await
        .unwrap_err();

    assert!(matches!(err, ArtifactError::Backend(ref msg) if msg.contains("disk full")));
}

#[tokio::test]
async fn test_unreachable_hub_is_transport_failure() {
    // Nothing listens on the discard port
    let bus: Arc<dyn Bus> = Arc::new(HttpBus::new("http://127.0.0.1:9"));
    let artifacts = ArtifactStore::new(Arc::new(InMemoryArtifactBackend::new()));
    let delegator = TaskDelegator::new(
        AgentContext::new("job-1", "planner"),
        bus,
        artifacts,
        SubstrateConfig::default(),
    );

    let result = delegator
        .delegate(delegator.request("researcher", "summarize", Payload::new()))
        .await;

    assert_eq!(
        result.error_kind(),
        Some(handoff::ErrorKind::TransportError)
    );
}

#[tokio::test]
async fn test_delegation_through_live_hub() {
    let addr = setup_server().await;
    let hub = format!("http://{}", addr);
    let config = SubstrateConfig {
        inline_threshold_bytes: 64,
        ..SubstrateConfig::default()
    };

    let artifacts = ArtifactStore::new(Arc::new(HttpArtifactBackend::new(&hub)));
    let mut inbox = AgentInbox::new(
        AgentContext::new("job-1", "researcher"),
        Arc::new(HttpBus::new(&hub)),
        artifacts.clone(),
        config.clone(),
    );
    let responder = tokio::spawn(async move {
        let task = inbox.next_task(Duration::from_secs(5)).await.unwrap().unwrap();
        let text = task.payload["text"].as_str().unwrap_or_default().to_uppercase();
        inbox.respond(&task, Ok(json!({ "text": text }))).await.unwrap();
    });

    let delegator = TaskDelegator::new(
        AgentContext::new("job-1", "planner"),
        Arc::new(HttpBus::new(&hub)),
        artifacts,
        config,
    );
    let text = "hello ".repeat(100);
    let mut request = delegator.request(
        "researcher",
        "shout",
        json!({ "text": text }).as_object().cloned().unwrap(),
    );
    request.timeout = Duration::from_secs(5);

    let result = delegator.delegate(request).await;
    assert_eq!(
        result,
        DelegationResult::success(json!({ "text": text.to_uppercase() }))
    );

    responder.await.unwrap();
}
