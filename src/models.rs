//! Data models for delegation requests, results and wire messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

use crate::context::AgentContext;
use crate::error::{ErrorKind, HandoffError, Result};

/// Structured task payload (arbitrarily nested key/value mapping)
pub type Payload = Map<String, Value>;

/// One delegation from the current job to a target agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationRequest {
    pub target_agent: String,
    pub description: String,
    pub payload: Payload,
    pub job_id: String,
    /// Routes the response back to this request; unique per job
    pub correlation_id: String,
    pub timeout: Duration,
}

impl DelegationRequest {
    /// Build a request from the current agent context with a fresh correlation id
    pub fn new(
        context: &AgentContext,
        target_agent: impl Into<String>,
        description: impl Into<String>,
        payload: Payload,
        timeout: Duration,
    ) -> Self {
        Self {
            target_agent: target_agent.into(),
            description: description.into(),
            payload,
            job_id: context.job_id.clone(),
            correlation_id: Uuid::new_v4().to_string(),
            timeout,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Reject requests that must never reach the bus
    pub fn validate(&self) -> Result<()> {
        if self.target_agent.trim().is_empty() {
            return Err(HandoffError::InvalidArgument(
                "target agent must not be empty".to_string(),
            ));
        }
        if self.description.trim().is_empty() {
            return Err(HandoffError::InvalidArgument(
                "task description must not be empty".to_string(),
            ));
        }
        if self.correlation_id.trim().is_empty() {
            return Err(HandoffError::InvalidArgument(
                "correlation id must not be empty".to_string(),
            ));
        }
        if self.job_id.trim().is_empty() {
            return Err(HandoffError::InvalidArgument(
                "job id must not be empty".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(HandoffError::InvalidArgument(
                "timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of one delegation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DelegationResult {
    Success { payload: Value },
    Failure { kind: ErrorKind, message: String },
    TimedOut,
}

impl DelegationResult {
    pub fn success(payload: Value) -> Self {
        DelegationResult::Success { payload }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        DelegationResult::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn from_error(error: &HandoffError) -> Self {
        Self::failure(error.kind(), error.to_string())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DelegationResult::Success { .. })
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, DelegationResult::TimedOut)
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            DelegationResult::Success { payload } => Some(payload),
            _ => None,
        }
    }

    /// Failure kind, with `TimedOut` reported as its own kind
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            DelegationResult::Success { .. } => None,
            DelegationResult::Failure { kind, .. } => Some(*kind),
            DelegationResult::TimedOut => Some(ErrorKind::TimedOut),
        }
    }

    pub fn status_str(&self) -> &'static str {
        match self {
            DelegationResult::Success { .. } => "success",
            DelegationResult::Failure { .. } => "failure",
            DelegationResult::TimedOut => "timed_out",
        }
    }
}

/// Pointer to bytes held by the artifact store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactReference {
    pub bucket: String,
    pub key: String,
    pub content_length: u64,
    /// Lowercase hex SHA-256 of the stored bytes
    pub content_hash: String,
}

/// A payload either embedded in a message or offloaded to the artifact store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadBody {
    Inline { value: Value },
    Artifact { reference: ArtifactReference },
}

impl PayloadBody {
    pub fn is_artifact(&self) -> bool {
        matches!(self, PayloadBody::Artifact { .. })
    }
}

/// Message published on a target agent's inbox topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub correlation_id: String,
    pub job_id: String,
    pub from_agent: String,
    pub description: String,
    pub payload: PayloadBody,
    /// Where the target must write its `ResponseEnvelope`
    pub response_stream: String,
    pub timeout_ms: u64,
    pub sent_at: DateTime<Utc>,
}

/// Message read back from a response stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub correlation_id: String,
    /// The agent that produced this response
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<PayloadBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ResponseEnvelope {
    pub fn ok(
        correlation_id: impl Into<String>,
        agent_id: impl Into<String>,
        result: PayloadBody,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            agent_id: agent_id.into(),
            result: Some(result),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn err(
        correlation_id: impl Into<String>,
        agent_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            agent_id: agent_id.into(),
            result: None,
            error: Some(message.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Delegation target for a fan-out call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Every task goes to the same agent
    Agent(String),
    /// Task `i` goes to agent `i`
    PerTask(Vec<String>),
}

impl Target {
    pub fn agent_for(&self, index: usize) -> Option<&str> {
        match self {
            Target::Agent(agent) => Some(agent.as_str()),
            Target::PerTask(agents) => agents.get(index).map(String::as_str),
        }
    }
}

impl From<&str> for Target {
    fn from(agent: &str) -> Self {
        Target::Agent(agent.to_string())
    }
}

impl From<String> for Target {
    fn from(agent: String) -> Self {
        Target::Agent(agent)
    }
}

/// A fan-out member before job, correlation and timeout are filled in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub description: String,
    #[serde(default)]
    pub payload: Payload,
    /// Overrides the call-level target for this task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Overrides the shared fan-out timeout for this task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl TaskTemplate {
    pub fn new(description: impl Into<String>, payload: Payload) -> Self {
        Self {
            description: description.into(),
            payload,
            target_agent: None,
            correlation_id: None,
            timeout: None,
        }
    }

    pub fn to_agent(mut self, agent: impl Into<String>) -> Self {
        self.target_agent = Some(agent.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}
