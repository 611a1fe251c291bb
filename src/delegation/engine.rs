//! Single-task delegation over the bus
//!
//! A delegation is an RPC emulated on pub/sub: the task is published on the
//! target's inbox topic and the answer is awaited on a response stream named
//! after (job, target, correlation id). The wait is the only suspension point
//! and is bounded by the request timeout, measured from just before publish.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::artifact::ArtifactStore;
use crate::bus::{Bus, EntryId};
use crate::config::SubstrateConfig;
use crate::context::{inbox_topic, response_stream, AgentContext};
use crate::error::{BusError, ErrorKind, HandoffError};
use crate::models::{DelegationRequest, DelegationResult, Payload, ResponseEnvelope, TaskMessage};

/// Events emitted by the task delegator
#[derive(Debug, Clone)]
pub enum DelegationEvent {
    /// The request was malformed and never published
    Rejected {
        correlation_id: String,
        reason: String,
    },
    /// The task message was published on the target's inbox
    Dispatched {
        correlation_id: String,
        target_agent: String,
        entry_id: EntryId,
        offloaded: bool,
    },
    /// A matching response (success or remote failure) was read
    Completed {
        correlation_id: String,
        target_agent: String,
        error_kind: Option<ErrorKind>,
        elapsed: Duration,
    },
    /// The deadline passed with no matching response
    TimedOut {
        correlation_id: String,
        target_agent: String,
        elapsed: Duration,
    },
}

/// Performs one delegation at a time per call; safe to share across tasks
pub struct TaskDelegator {
    context: AgentContext,
    bus: Arc<dyn Bus>,
    artifacts: ArtifactStore,
    config: SubstrateConfig,
    event_tx: broadcast::Sender<DelegationEvent>,
}

impl TaskDelegator {
    pub fn new(
        context: AgentContext,
        bus: Arc<dyn Bus>,
        artifacts: ArtifactStore,
        config: SubstrateConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            context,
            bus,
            artifacts,
            config,
            event_tx,
        }
    }

    pub fn context(&self) -> &AgentContext {
        &self.context
    }

    pub fn config(&self) -> &SubstrateConfig {
        &self.config
    }

    /// Subscribe to delegation events
    pub fn subscribe(&self) -> broadcast::Receiver<DelegationEvent> {
        self.event_tx.subscribe()
    }

    /// Build a request from this agent's context using the configured default timeout
    pub fn request(
        &self,
        target_agent: impl Into<String>,
        description: impl Into<String>,
        payload: Payload,
    ) -> DelegationRequest {
        DelegationRequest::new(
            &self.context,
            target_agent,
            description,
            payload,
            self.config.default_timeout,
        )
    }

    /// Delegate one task and wait for its result.
    ///
    /// Never returns an error: every outcome, including collaborator
    /// failures, is a `DelegationResult`. At most one message is published.
    /// Dropping the returned future stops the wait; the published task is
    /// not withdrawn.
    pub async fn delegate(&self, request: DelegationRequest) -> DelegationResult {
        if let Err(e) = request.validate() {
            tracing::warn!("Rejected delegation {}: {}", request.correlation_id, e);
            self.emit(DelegationEvent::Rejected {
                correlation_id: request.correlation_id.clone(),
                reason: e.to_string(),
            });
            return DelegationResult::from_error(&e);
        }

        let stream = response_stream(
            &request.job_id,
            &request.target_agent,
            &request.correlation_id,
        );

        let payload = match self
            .artifacts
            .encode_payload(
                &request.payload,
                &self.config.artifact_bucket,
                self.config.inline_threshold_bytes,
            )
            .await
        {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Failed to prepare payload for {}: {}", request.correlation_id, e);
                return DelegationResult::from_error(&e);
            }
        };
        let offloaded = payload.is_artifact();

        let message = TaskMessage {
            correlation_id: request.correlation_id.clone(),
            job_id: request.job_id.clone(),
            from_agent: self.context.agent_id.clone(),
            description: request.description.clone(),
            payload,
            response_stream: stream.clone(),
            timeout_ms: request.timeout.as_millis() as u64,
            sent_at: Utc::now(),
        };
        let body = match serde_json::to_value(&message) {
            Ok(body) => body,
            Err(e) => return DelegationResult::from_error(&HandoffError::from(e)),
        };

        let started = Instant::now();
        let deadline = started + request.timeout;

        let entry_id = match self
            .bus
            .publish(&inbox_topic(&request.target_agent), body)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(
                    "Failed to publish delegation {} to {}: {}",
                    request.correlation_id,
                    request.target_agent,
                    e
                );
                return DelegationResult::from_error(&HandoffError::from(e));
            }
        };

        tracing::info!(
            "Delegated {} to {} (entry {}, offloaded: {})",
            request.correlation_id,
            request.target_agent,
            entry_id,
            offloaded
        );
        self.emit(DelegationEvent::Dispatched {
            correlation_id: request.correlation_id.clone(),
            target_agent: request.target_agent.clone(),
            entry_id,
            offloaded,
        });

        let waited =
            tokio::time::timeout_at(deadline, self.await_envelope(&request.correlation_id, &stream))
                .await;

        if let Err(e) = self
            .bus
            .expire(&stream, self.config.response_stream_ttl)
            .await
        {
            tracing::warn!("Failed to set retention on {}: {}", stream, e);
        }

        let elapsed = started.elapsed();
        match waited {
            Err(_) => {
                tracing::info!(
                    "Delegation {} to {} timed out after {:?}",
                    request.correlation_id,
                    request.target_agent,
                    elapsed
                );
                self.emit(DelegationEvent::TimedOut {
                    correlation_id: request.correlation_id,
                    target_agent: request.target_agent,
                    elapsed,
                });
                DelegationResult::TimedOut
            }
            Ok(Err(e)) => {
                tracing::error!("Failed reading {}: {}", stream, e);
                DelegationResult::from_error(&HandoffError::from(e))
            }
            Ok(Ok(envelope)) => {
                let result = self.resolve_envelope(envelope).await;
                self.emit(DelegationEvent::Completed {
                    correlation_id: request.correlation_id,
                    target_agent: request.target_agent,
                    error_kind: result.error_kind(),
                    elapsed,
                });
                result
            }
        }
    }

    /// Read `stream` until an envelope for `correlation_id` shows up.
    /// Entries for other correlation ids and malformed entries are skipped.
    async fn await_envelope(
        &self,
        correlation_id: &str,
        stream: &str,
    ) -> Result<ResponseEnvelope, BusError> {
        let batch_size = self.config.read_batch_size.max(1);
        let mut cursor: Option<EntryId> = None;

        loop {
            let entries = self.bus.read(stream, batch_size, cursor).await?;
            let full_batch = entries.len() >= batch_size;

            for entry in entries {
                cursor = Some(entry.id);
                match serde_json::from_value::<ResponseEnvelope>(entry.body) {
                    Ok(envelope) if envelope.correlation_id == correlation_id => {
                        return Ok(envelope);
                    }
                    Ok(envelope) => {
                        tracing::debug!(
                            "Ignoring response for {} on {}",
                            envelope.correlation_id,
                            stream
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Skipping malformed entry {} on {}: {}",
                            entry.id,
                            stream,
                            e
                        );
                    }
                }
            }

            if !full_batch {
                self.bus
                    .wait_for_entries(stream, cursor, self.config.poll_interval)
                    .await;
            }
        }
    }

    async fn resolve_envelope(&self, envelope: ResponseEnvelope) -> DelegationResult {
        if let Some(message) = envelope.error {
            tracing::info!(
                "Delegation {} failed remotely at {}: {}",
                envelope.correlation_id,
                envelope.agent_id,
                message
            );
            return DelegationResult::failure(ErrorKind::RemoteError, message);
        }

        let Some(body) = envelope.result else {
            return DelegationResult::failure(
                ErrorKind::RemoteError,
                format!(
                    "response from {} carried neither result nor error",
                    envelope.agent_id
                ),
            );
        };

        match self.artifacts.decode_payload(body).await {
            Ok(payload) => DelegationResult::success(payload),
            Err(e) => {
                tracing::error!(
                    "Failed to load result of {}: {}",
                    envelope.correlation_id,
                    e
                );
                DelegationResult::from_error(&e)
            }
        }
    }

    fn emit(&self, event: DelegationEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::InMemoryArtifactBackend;
    use crate::bus::InMemoryBus;
    use crate::models::PayloadBody;
    use serde_json::json;

    fn setup(config: SubstrateConfig) -> (TaskDelegator, Arc<InMemoryBus>, ArtifactStore) {
        let bus = Arc::new(InMemoryBus::from_config(&config));
        let artifacts = ArtifactStore::new(Arc::new(InMemoryArtifactBackend::new()));
        let delegator = TaskDelegator::new(
            AgentContext::new("job-1", "planner"),
            bus.clone(),
            artifacts.clone(),
            config,
        );
        (delegator, bus, artifacts)
    }

    fn payload() -> Payload {
        json!({"text": "hello"}).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_request_uses_context_and_default_timeout() {
        let (delegator, _, _) = setup(SubstrateConfig::default());
        let req = delegator.request("researcher", "summarize", payload());
        assert_eq!(req.job_id, "job-1");
        assert_eq!(req.timeout, SubstrateConfig::default().default_timeout);
    }

    #[tokio::test]
    async fn test_invalid_request_is_not_published() {
        let (delegator, bus, _) = setup(SubstrateConfig::default());
        let mut rx = delegator.subscribe();

        let req = delegator.request("", "summarize", payload());
        let result = delegator.delegate(req).await;

        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidArgument));
        assert_eq!(bus.stream_count().await, 0);
        assert!(matches!(
            rx.try_recv().unwrap(),
            DelegationEvent::Rejected { .. }
        ));
    }

    #[tokio::test]
    async fn test_publishes_task_message_on_inbox() {
        let (delegator, bus, _) = setup(SubstrateConfig::default());
        let mut req = delegator
            .request("researcher", "summarize", payload())
            .with_correlation_id("c1");
        req.timeout = Duration::from_millis(20);

        let result = delegator.delegate(req).await;
        assert!(result.is_timed_out());

        let entries = bus.read("agent:researcher:inbox", 10, None).await.unwrap();
        assert_eq!(entries.len(), 1);
        let message: TaskMessage = serde_json::from_value(entries[0].body.clone()).unwrap();
        assert_eq!(message.correlation_id, "c1");
        assert_eq!(message.from_agent, "planner");
        assert_eq!(message.response_stream, "job:job-1:agent:researcher:response:c1");
        assert_eq!(
            message.payload,
            PayloadBody::Inline {
                value: json!({"text": "hello"})
            }
        );
    }

    #[tokio::test]
    async fn test_large_payload_is_offloaded() {
        let config = SubstrateConfig {
            inline_threshold_bytes: 8,
            ..SubstrateConfig::default()
        };
        let (delegator, bus, artifacts) = setup(config);
        let mut req = delegator.request("researcher", "summarize", payload());
        req.timeout = Duration::from_millis(20);

        delegator.delegate(req).await;

        let entries = bus.read("agent:researcher:inbox", 10, None).await.unwrap();
        let message: TaskMessage = serde_json::from_value(entries[0].body.clone()).unwrap();
        assert!(message.payload.is_artifact());
        assert_eq!(
            artifacts.decode_payload(message.payload).await.unwrap(),
            json!({"text": "hello"})
        );
    }

    #[tokio::test]
    async fn test_matching_response_is_returned() {
        let (delegator, bus, _) = setup(SubstrateConfig::default());
        let mut req = delegator
            .request("researcher", "summarize", payload())
            .with_correlation_id("c1");
        req.timeout = Duration::from_secs(2);

        let stream = response_stream("job-1", "researcher", "c1");
        let envelope = ResponseEnvelope::ok(
            "c1",
            "researcher",
            PayloadBody::Inline {
                value: json!({"summary": "hi"}),
            },
        );
        bus.publish(&stream, serde_json::to_value(&envelope).unwrap())
            .await
            .unwrap();

        let result = delegator.delegate(req).await;
        assert_eq!(result, DelegationResult::success(json!({"summary": "hi"})));
    }

    #[tokio::test]
    async fn test_foreign_and_malformed_entries_are_skipped() {
        let (delegator, bus, _) = setup(SubstrateConfig::default());
        let mut req = delegator
            .request("researcher", "summarize", payload())
            .with_correlation_id("mine");
        req.timeout = Duration::from_secs(2);

        let stream = response_stream("job-1", "researcher", "mine");
        bus.publish(&stream, json!("garbage")).await.unwrap();
        let other = ResponseEnvelope::err("someone-else", "researcher", "nope");
        bus.publish(&stream, serde_json::to_value(&other).unwrap())
            .await
            .unwrap();
        let mine = ResponseEnvelope::ok(
            "mine",
            "researcher",
            PayloadBody::Inline { value: json!(42) },
        );
        bus.publish(&stream, serde_json::to_value(&mine).unwrap())
            .await
            .unwrap();

        assert_eq!(
            delegator.delegate(req).await,
            DelegationResult::success(json!(42))
        );
    }

    #[tokio::test]
    async fn test_remote_error_is_failure() {
        let (delegator, bus, _) = setup(SubstrateConfig::default());
        let mut req = delegator
            .request("researcher", "summarize", payload())
            .with_correlation_id("c1");
        req.timeout = Duration::from_secs(2);

        let envelope = ResponseEnvelope::err("c1", "researcher", "no sources");
        bus.publish(
            &response_stream("job-1", "researcher", "c1"),
            serde_json::to_value(&envelope).unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(
            delegator.delegate(req).await,
            DelegationResult::failure(ErrorKind::RemoteError, "no sources")
        );
    }

    #[tokio::test]
    async fn test_missing_result_artifact_is_not_found() {
        let (delegator, bus, _) = setup(SubstrateConfig::default());
        let mut req = delegator
            .request("researcher", "summarize", payload())
            .with_correlation_id("c1");
        req.timeout = Duration::from_secs(2);

        let envelope = ResponseEnvelope::ok(
            "c1",
            "researcher",
            PayloadBody::Artifact {
                reference: crate::models::ArtifactReference {
                    bucket: "b".into(),
                    key: "evicted".into(),
                    content_length: 1,
                    content_hash: "00".into(),
                },
            },
        );
        bus.publish(
            &response_stream("job-1", "researcher", "c1"),
            serde_json::to_value(&envelope).unwrap(),
        )
        .await
        .unwrap();

        let result = delegator.delegate(req).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_timeout_emits_event_and_expires_stream() {
        let config = SubstrateConfig {
            response_stream_ttl: Duration::ZERO,
            ..SubstrateConfig::default()
        };
        let (delegator, bus, _) = setup(config);
        let mut rx = delegator.subscribe();
        let mut req = delegator
            .request("researcher", "summarize", payload())
            .with_correlation_id("c1");
        req.timeout = Duration::from_millis(30);

        assert!(delegator.delegate(req).await.is_timed_out());

        assert!(matches!(
            rx.try_recv().unwrap(),
            DelegationEvent::Dispatched { .. }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            DelegationEvent::TimedOut { .. }
        ));

        // A late answer lands on an expired stream and is never read
        let stream = response_stream("job-1", "researcher", "c1");
        assert!(bus.read(&stream, 10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_answer_on_recreated_response_stream_is_found() {
        let config = SubstrateConfig {
            stream_retention: Duration::from_millis(100),
            ..SubstrateConfig::default()
        };
        let (delegator, bus, _) = setup(config);
        let mut req = delegator
            .request("researcher", "summarize", payload())
            .with_correlation_id("c1");
        req.timeout = Duration::from_millis(1000);

        let stream = response_stream("job-1", "researcher", "c1");
        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let other = ResponseEnvelope::err("someone-else", "researcher", "nope");
            publisher
                .publish(&stream, serde_json::to_value(&other).unwrap())
                .await
                .unwrap();

            // Outlives the stream's retention, so the answer recreates it
            tokio::time::sleep(Duration::from_millis(300)).await;
            let mine = ResponseEnvelope::ok(
                "c1",
                "researcher",
                PayloadBody::Inline {
                    value: json!({"summary": "hi"}),
                },
            );
            publisher
                .publish(&stream, serde_json::to_value(&mine).unwrap())
                .await
                .unwrap();
        });

        assert_eq!(
            delegator.delegate(req).await,
            DelegationResult::success(json!({"summary": "hi"}))
        );
    }

    #[tokio::test]
    async fn test_zero_batch_size_still_reads_entries() {
        let config = SubstrateConfig {
            read_batch_size: 0,
            ..SubstrateConfig::default()
        };
        let (delegator, bus, _) = setup(config);
        let mut req = delegator
            .request("researcher", "summarize", payload())
            .with_correlation_id("c1");
        req.timeout = Duration::from_secs(2);

        let envelope = ResponseEnvelope::ok(
            "c1",
            "researcher",
            PayloadBody::Inline { value: json!(7) },
        );
        bus.publish(
            &response_stream("job-1", "researcher", "c1"),
            serde_json::to_value(&envelope).unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(
            delegator.delegate(req).await,
            DelegationResult::success(json!(7))
        );
    }
}
