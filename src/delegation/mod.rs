//! Agent-to-agent delegation
//!
//! A requesting agent hands a task to a target agent through the bus and
//! waits for a correlated answer; the target agent drains its inbox and
//! replies on the response stream the task names.

pub mod engine;
pub mod inbox;
pub mod parallel;

pub use engine::{DelegationEvent, TaskDelegator};
pub use inbox::{AgentInbox, IncomingTask};
pub use parallel::ParallelDelegator;
