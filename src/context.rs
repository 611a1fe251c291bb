//! Agent context and bus naming
//!
//! Every topic and stream name the substrate uses is derived here, so the
//! producer of a response and the caller waiting on it agree on where to
//! look without any shared state.

use serde::{Deserialize, Serialize};

/// Identity of the running agent, read-only to the substrate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentContext {
    pub job_id: String,
    pub agent_id: String,
}

impl AgentContext {
    pub fn new(job_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            agent_id: agent_id.into(),
        }
    }

    /// The inbound topic of this agent
    pub fn inbox_topic(&self) -> String {
        inbox_topic(&self.agent_id)
    }
}

/// Topic an agent consumes delegated tasks from
pub fn inbox_topic(agent_id: &str) -> String {
    format!("agent:{}:inbox", agent_id)
}

/// Stream the answer to one delegation is written to.
///
/// Scoped by job, target agent and correlation id so concurrent delegations
/// never share a stream.
pub fn response_stream(job_id: &str, target_agent: &str, correlation_id: &str) -> String {
    format!(
        "job:{}:agent:{}:response:{}",
        job_id, target_agent, correlation_id
    )
}
