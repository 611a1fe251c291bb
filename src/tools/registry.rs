//! Caller-held tool dispatch table
//!
//! A registry maps each tool name to the implementation that serves it: the
//! registered override when there is one, the built-in otherwise. Every call
//! through the registry resolves first, so a registration affects every later
//! call made through the same registry and nothing already running.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::{
    DelegateParallel, DelegateTask, RetrieveArtifact, StoreArtifact, ToolImpl, ToolName, ToolSet,
};
use crate::error::Result;
use crate::models::{ArtifactReference, DelegationRequest, DelegationResult, TaskTemplate, Target};

pub struct ToolRegistry {
    builtins: ToolSet,
    overrides: RwLock<HashMap<ToolName, ToolImpl>>,
}

impl ToolRegistry {
    pub fn new(builtins: ToolSet) -> Self {
        Self {
            builtins,
            overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Install `tool` as the override for its name, returning the override it replaced
    pub async fn register(&self, tool: ToolImpl) -> Option<ToolImpl> {
        let name = tool.name();
        let replaced = self.overrides.write().await.insert(name, tool);
        if replaced.is_some() {
            tracing::info!("Replaced override for {}", name);
        } else {
            tracing::info!("Registered override for {}", name);
        }
        replaced
    }

    pub async fn unregister(&self, name: ToolName) -> Option<ToolImpl> {
        let removed = self.overrides.write().await.remove(&name);
        if removed.is_some() {
            tracing::info!("Removed override for {}", name);
        }
        removed
    }

    /// The override for `name`, or the built-in when none is registered
    pub async fn resolve(&self, name: ToolName) -> ToolImpl {
        match self.overrides.read().await.get(&name) {
            Some(tool) => tool.clone(),
            None => self.builtins.get(name),
        }
    }

    /// Names with an active override
    pub async fn list(&self) -> BTreeSet<ToolName> {
        self.overrides.read().await.keys().copied().collect()
    }

    pub async fn clear(&self) {
        let mut overrides = self.overrides.write().await;
        if !overrides.is_empty() {
            tracing::info!("Clearing {} overrides", overrides.len());
        }
        overrides.clear();
    }

    pub fn builtin(&self, name: ToolName) -> ToolImpl {
        self.builtins.get(name)
    }

    pub fn builtins(&self) -> &ToolSet {
        &self.builtins
    }

    async fn resolve_delegate_task(&self) -> Arc<dyn DelegateTask> {
        match self.overrides.read().await.get(&ToolName::DelegateTask) {
            Some(ToolImpl::DelegateTask(tool)) => tool.clone(),
            _ => self.builtins.delegate_task.clone(),
        }
    }

    async fn resolve_delegate_parallel(&self) -> Arc<dyn DelegateParallel> {
        match self.overrides.read().await.get(&ToolName::DelegateParallel) {
            Some(ToolImpl::DelegateParallel(tool)) => tool.clone(),
            _ => self.builtins.delegate_parallel.clone(),
        }
    }

    async fn resolve_store_artifact(&self) -> Arc<dyn StoreArtifact> {
        match self.overrides.read().await.get(&ToolName::StoreArtifact) {
            Some(ToolImpl::StoreArtifact(tool)) => tool.clone(),
            _ => self.builtins.store_artifact.clone(),
        }
    }

    async fn resolve_retrieve_artifact(&self) -> Arc<dyn RetrieveArtifact> {
        match self.overrides.read().await.get(&ToolName::RetrieveArtifact) {
            Some(ToolImpl::RetrieveArtifact(tool)) => tool.clone(),
            _ => self.builtins.retrieve_artifact.clone(),
        }
    }

    // The lock is released before the call: registrations made while a call
    // runs apply to the next call only.

    pub async fn delegate_task(&self, request: DelegationRequest) -> Result<DelegationResult> {
        let tool = self.resolve_delegate_task().await;
        tool.delegate_task(request).await
    }

    pub async fn delegate_parallel(
        &self,
        target: Target,
        tasks: Vec<TaskTemplate>,
        timeout: Duration,
    ) -> Result<Vec<DelegationResult>> {
        let tool = self.resolve_delegate_parallel().await;
        tool.delegate_parallel(target, tasks, timeout).await
    }

    pub async fn store_artifact(&self, bucket: &str, bytes: Vec<u8>) -> Result<ArtifactReference> {
        let tool = self.resolve_store_artifact().await;
        tool.store_artifact(bucket, bytes).await
    }

    pub async fn retrieve_artifact(&self, reference: &ArtifactReference) -> Result<Vec<u8>> {
        let tool = self.resolve_retrieve_artifact().await;
        tool.retrieve_artifact(reference).await
    }
}
