//! Overridable tool operations
//!
//! The four operations an agent can invoke are traits; the built-in engines
//! implement them, and so can any user replacement registered in a
//! `ToolRegistry`.

pub mod builtin;
pub mod decorators;
pub mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{HandoffError, Result};
use crate::models::{
    ArtifactReference, DelegationRequest, DelegationResult, TaskTemplate, Target,
};

pub use builtin::ToolSet;
pub use decorators::RetryOnTimeout;
pub use registry::ToolRegistry;

/// Name of an overridable tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    DelegateTask,
    DelegateParallel,
    StoreArtifact,
    RetrieveArtifact,
}

impl ToolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::DelegateTask => "delegate_task",
            ToolName::DelegateParallel => "delegate_parallel",
            ToolName::StoreArtifact => "store_artifact",
            ToolName::RetrieveArtifact => "retrieve_artifact",
        }
    }

    pub fn all() -> [ToolName; 4] {
        [
            ToolName::DelegateTask,
            ToolName::DelegateParallel,
            ToolName::StoreArtifact,
            ToolName::RetrieveArtifact,
        ]
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = HandoffError;

    fn from_str(s: &str) -> Result<Self> {
        ToolName::all()
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| HandoffError::InvalidArgument(format!("unknown tool: {}", s)))
    }
}

#[async_trait]
pub trait DelegateTask: Send + Sync {
    async fn delegate_task(&self, request: DelegationRequest) -> Result<DelegationResult>;
}

#[async_trait]
pub trait DelegateParallel: Send + Sync {
    /// One result per task, in task order
    async fn delegate_parallel(
        &self,
        target: Target,
        tasks: Vec<TaskTemplate>,
        timeout: Duration,
    ) -> Result<Vec<DelegationResult>>;
}

#[async_trait]
pub trait StoreArtifact: Send + Sync {
    async fn store_artifact(&self, bucket: &str, bytes: Vec<u8>) -> Result<ArtifactReference>;
}

#[async_trait]
pub trait RetrieveArtifact: Send + Sync {
    async fn retrieve_artifact(&self, reference: &ArtifactReference) -> Result<Vec<u8>>;
}

/// An implementation of one tool; the variant decides which name it serves
#[derive(Clone)]
pub enum ToolImpl {
    DelegateTask(Arc<dyn DelegateTask>),
    DelegateParallel(Arc<dyn DelegateParallel>),
    StoreArtifact(Arc<dyn StoreArtifact>),
    RetrieveArtifact(Arc<dyn RetrieveArtifact>),
}

impl ToolImpl {
    pub fn name(&self) -> ToolName {
        match self {
            ToolImpl::DelegateTask(_) => ToolName::DelegateTask,
            ToolImpl::DelegateParallel(_) => ToolName::DelegateParallel,
            ToolImpl::StoreArtifact(_) => ToolName::StoreArtifact,
            ToolImpl::RetrieveArtifact(_) => ToolName::RetrieveArtifact,
        }
    }

    /// Whether both handles point at the same implementation instance
    pub fn ptr_eq(&self, other: &ToolImpl) -> bool {
        fn same<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
            std::ptr::eq(Arc::as_ptr(a) as *const u8, Arc::as_ptr(b) as *const u8)
        }

        match (self, other) {
            (ToolImpl::DelegateTask(a), ToolImpl::DelegateTask(b)) => same(a, b),
            (ToolImpl::DelegateParallel(a), ToolImpl::DelegateParallel(b)) => same(a, b),
            (ToolImpl::StoreArtifact(a), ToolImpl::StoreArtifact(b)) => same(a, b),
            (ToolImpl::RetrieveArtifact(a), ToolImpl::RetrieveArtifact(b)) => same(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for ToolImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ToolImpl").field(&self.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_name_strings() {
        for name in ToolName::all() {
            assert_eq!(name.as_str().parse::<ToolName>().unwrap(), name);
            assert_eq!(name.to_string(), name.as_str());
        }
        assert!("delegate".parse::<ToolName>().is_err());
    }

    #[test]
    fn test_tool_name_serde() {
        let json = serde_json::to_string(&ToolName::StoreArtifact).unwrap();
        assert_eq!(json, "\"store_artifact\"");
    }

    struct Nothing;

    #[async_trait]
    impl RetrieveArtifact for Nothing {
        async fn retrieve_artifact(&self, _reference: &ArtifactReference) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_ptr_eq() {
        let shared: Arc<dyn RetrieveArtifact> = Arc::new(Nothing);
        let a = ToolImpl::RetrieveArtifact(shared.clone());
        let b = ToolImpl::RetrieveArtifact(shared);
        let c = ToolImpl::RetrieveArtifact(Arc::new(Nothing));

        assert_eq!(a.name(), ToolName::RetrieveArtifact);
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
    }
}
