//! Responder side of a delegation
//!
//! An agent reads task messages from its inbox topic and answers each on the
//! response stream named in the message.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::artifact::ArtifactStore;
use crate::bus::{Bus, EntryId};
use crate::config::SubstrateConfig;
use crate::context::AgentContext;
use crate::error::Result;
use crate::models::{ResponseEnvelope, TaskMessage};

/// A task pulled from the inbox, with its payload already rehydrated
#[derive(Debug, Clone)]
pub struct IncomingTask {
    pub message: TaskMessage,
    pub payload: Value,
}

impl IncomingTask {
    pub fn description(&self) -> &str {
        &self.message.description
    }

    pub fn correlation_id(&self) -> &str {
        &self.message.correlation_id
    }
}

/// Cursor over one agent's inbox
pub struct AgentInbox {
    context: AgentContext,
    bus: Arc<dyn Bus>,
    artifacts: ArtifactStore,
    config: SubstrateConfig,
    cursor: Option<EntryId>,
}

impl AgentInbox {
    pub fn new(
        context: AgentContext,
        bus: Arc<dyn Bus>,
        artifacts: ArtifactStore,
        config: SubstrateConfig,
    ) -> Self {
        Self {
            context,
            bus,
            artifacts,
            config,
            cursor: None,
        }
    }

    /// Resume after a known entry id instead of from the start of the inbox
    pub fn starting_after(mut self, cursor: EntryId) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn cursor(&self) -> Option<EntryId> {
        self.cursor
    }

    /// Wait up to `max_wait` for the next task.
    ///
    /// Malformed entries are skipped. A task whose offloaded payload cannot
    /// be loaded is answered with an error and skipped.
    pub async fn next_task(&mut self, max_wait: Duration) -> Result<Option<IncomingTask>> {
        let topic = self.context.inbox_topic();
        let deadline = Instant::now() + max_wait;

        loop {
            let entries = self.bus.read(&topic, 1, self.cursor).await?;

            if let Some(entry) = entries.into_iter().next() {
                self.cursor = Some(entry.id);

                let message: TaskMessage = match serde_json::from_value(entry.body) {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::warn!("Skipping malformed task {} on {}: {}", entry.id, topic, e);
                        continue;
                    }
                };

                match self.artifacts.decode_payload(message.payload.clone()).await {
                    Ok(payload) => {
                        tracing::debug!(
                            "Received task {} from {}",
                            message.correlation_id,
                            message.from_agent
                        );
                        return Ok(Some(IncomingTask { message, payload }));
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Could not load payload of task {}: {}",
                            message.correlation_id,
                            e
                        );
                        self.publish_envelope(
                            &message,
                            ResponseEnvelope::err(
                                &message.correlation_id,
                                &self.context.agent_id,
                                format!("could not load task payload: {}", e),
                            ),
                        )
                        .await?;
                        continue;
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            self.bus
                .wait_for_entries(
                    &topic,
                    self.cursor,
                    (deadline - now).min(self.config.poll_interval),
                )
                .await;
        }
    }

    /// Answer `task` with a result or an error message
    pub async fn respond(
        &self,
        task: &IncomingTask,
        outcome: std::result::Result<Value, String>,
    ) -> Result<EntryId> {
        let envelope = match outcome {
            Ok(value) => {
                let body = self
                    .artifacts
                    .encode_payload(
                        &value,
                        &self.config.artifact_bucket,
                        self.config.inline_threshold_bytes,
                    )
                    .await?;
                ResponseEnvelope::ok(task.correlation_id(), &self.context.agent_id, body)
            }
            Err(message) => {
                ResponseEnvelope::err(task.correlation_id(), &self.context.agent_id, message)
            }
        };

        self.publish_envelope(&task.message, envelope).await
    }

    async fn publish_envelope(
        &self,
        message: &TaskMessage,
        envelope: ResponseEnvelope,
    ) -> Result<EntryId> {
        let id = self
            .bus
            .publish(&message.response_stream, serde_json::to_value(&envelope)?)
            .await?;
        tracing::info!(
            "Answered {} on {}",
            message.correlation_id,
            message.response_stream
        );
        Ok(id)
    }
}
