//! Hub HTTP surface
//!
//! Exposes an in-process bus and an artifact backend so agents in other
//! processes can use them through `HttpBus` and `HttpArtifactBackend`.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::artifact::ArtifactBackend;
use crate::bus::http::{ExpireRequest, PublishResponse};
use crate::bus::{Bus, InMemoryBus, StreamEntry};
use crate::error::Result;

/// Largest page a single read may return
pub const MAX_READ_COUNT: usize = 1000;

const DEFAULT_READ_COUNT: usize = 64;

/// Application state shared across handlers
pub struct AppState {
    pub bus: Arc<InMemoryBus>,
    pub artifacts: Arc<dyn ArtifactBackend>,
    pub max_artifact_bytes: usize,
}

impl AppState {
    pub fn new(
        bus: Arc<InMemoryBus>,
        artifacts: Arc<dyn ArtifactBackend>,
        max_artifact_bytes: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            bus,
            artifacts,
            max_artifact_bytes,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ReadQuery {
    pub since: Option<u64>,
    pub max_count: Option<usize>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.max_artifact_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/bus/topics/:topic", post(publish))
        .route("/bus/streams/:stream", get(read_stream))
        .route("/bus/streams/:stream/expire", post(expire_stream))
        .route("/artifacts/:bucket/:key", put(put_artifact).get(get_artifact))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn publish(
    State(state): State<Arc<AppState>>,
    Path(topic): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<PublishResponse>> {
    let id = state.bus.publish(&topic, body).await?;
    tracing::debug!("Published entry {} on {}", id, topic);
    Ok(Json(PublishResponse { id }))
}

async fn read_stream(
    State(state): State<Arc<AppState>>,
    Path(stream): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<Vec<StreamEntry>>> {
    let max_count = query
        .max_count
        .unwrap_or(DEFAULT_READ_COUNT)
        .min(MAX_READ_COUNT);
    let entries = state.bus.read(&stream, max_count, query.since).await?;
    Ok(Json(entries))
}

async fn expire_stream(
    State(state): State<Arc<AppState>>,
    Path(stream): Path<String>,
    Json(request): Json<ExpireRequest>,
) -> Result<StatusCode> {
    state
        .bus
        .expire(&stream, Duration::from_millis(request.ttl_ms))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn put_artifact(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    body: Bytes,
) -> Result<StatusCode> {
    let len = body.len();
    state.artifacts.put(&bucket, &key, body.to_vec()).await?;
    tracing::debug!("Stored artifact {}/{} ({} bytes)", bucket, key, len);
    Ok(StatusCode::NO_CONTENT)
}

async fn get_artifact(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Vec<u8>> {
    Ok(state.artifacts.get(&bucket, &key).await?)
}
