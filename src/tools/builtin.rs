//! Built-in tool implementations

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{DelegateParallel, DelegateTask, RetrieveArtifact, StoreArtifact, ToolImpl, ToolName};
use crate::artifact::ArtifactStore;
use crate::bus::Bus;
use crate::config::SubstrateConfig;
use crate::context::AgentContext;
use crate::delegation::{ParallelDelegator, TaskDelegator};
use crate::error::Result;
use crate::models::{ArtifactReference, DelegationRequest, DelegationResult, TaskTemplate, Target};

#[async_trait]
impl DelegateTask for TaskDelegator {
    async fn delegate_task(&self, request: DelegationRequest) -> Result<DelegationResult> {
        Ok(self.delegate(request).await)
    }
}

#[async_trait]
impl DelegateParallel for ParallelDelegator {
    async fn delegate_parallel(
        &self,
        target: Target,
        tasks: Vec<TaskTemplate>,
        timeout: Duration,
    ) -> Result<Vec<DelegationResult>> {
        Ok(ParallelDelegator::delegate_parallel(self, &target, tasks, timeout).await)
    }
}

#[async_trait]
impl StoreArtifact for ArtifactStore {
    async fn store_artifact(&self, bucket: &str, bytes: Vec<u8>) -> Result<ArtifactReference> {
        self.store(bucket, bytes).await
    }
}

#[async_trait]
impl RetrieveArtifact for ArtifactStore {
    async fn retrieve_artifact(&self, reference: &ArtifactReference) -> Result<Vec<u8>> {
        self.retrieve(reference).await
    }
}

/// The default implementation of every tool
#[derive(Clone)]
pub struct ToolSet {
    pub delegate_task: Arc<dyn DelegateTask>,
    pub delegate_parallel: Arc<dyn DelegateParallel>,
    pub store_artifact: Arc<dyn StoreArtifact>,
    pub retrieve_artifact: Arc<dyn RetrieveArtifact>,
}

impl ToolSet {
    /// Wire the built-in engines around shared collaborators. The parallel
    /// tool fans out through the built-in `delegate_task`.
    pub fn builtin(
        context: AgentContext,
        bus: Arc<dyn Bus>,
        artifacts: ArtifactStore,
        config: SubstrateConfig,
    ) -> Self {
        let delegator = Arc::new(TaskDelegator::new(
            context.clone(),
            bus,
            artifacts.clone(),
            config,
        ));
        let store = Arc::new(artifacts);

        Self {
            delegate_parallel: Arc::new(ParallelDelegator::new(context, delegator.clone())),
            delegate_task: delegator,
            store_artifact: store.clone(),
            retrieve_artifact: store,
        }
    }

    pub fn get(&self, name: ToolName) -> ToolImpl {
        match name {
            ToolName::DelegateTask => ToolImpl::DelegateTask(self.delegate_task.clone()),
            ToolName::DelegateParallel => {
                ToolImpl::DelegateParallel(self.delegate_parallel.clone())
            }
            ToolName::StoreArtifact => ToolImpl::StoreArtifact(self.store_artifact.clone()),
            ToolName::RetrieveArtifact => {
                ToolImpl::RetrieveArtifact(self.retrieve_artifact.clone())
            }
        }
    }
}
