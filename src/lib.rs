//! Handoff - task delegation and override substrate for multi-agent systems

pub mod artifact;
pub mod bus;
pub mod config;
pub mod context;
pub mod delegation;
pub mod error;
pub mod models;
pub mod server;
pub mod tools;

pub use artifact::{ArtifactBackend, ArtifactStore};
pub use bus::{Bus, EntryId, StreamEntry};
pub use config::SubstrateConfig;
pub use context::AgentContext;
pub use delegation::{AgentInbox, DelegationEvent, IncomingTask, ParallelDelegator, TaskDelegator};
pub use error::{ErrorKind, HandoffError, Result};
pub use models::{
    ArtifactReference, DelegationRequest, DelegationResult, Payload, PayloadBody, ResponseEnvelope,
    TaskMessage, TaskTemplate, Target,
};
pub use server::AppState;
pub use tools::{ToolImpl, ToolName, ToolRegistry, ToolSet};
