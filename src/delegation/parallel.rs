//! Fan-out delegation
//!
//! Each task runs as its own tokio task so every member blocks on its own
//! response stream and deadline. Nothing short-circuits: the result vector
//! has one entry per input task, at the input's index.

use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::context::AgentContext;
use crate::error::{ErrorKind, HandoffError, Result};
use crate::models::{DelegationRequest, DelegationResult, TaskTemplate, Target};
use crate::tools::DelegateTask;

pub struct ParallelDelegator {
    context: AgentContext,
    single: Arc<dyn DelegateTask>,
}

impl ParallelDelegator {
    /// `single` performs each member delegation
    pub fn new(context: AgentContext, single: Arc<dyn DelegateTask>) -> Self {
        Self { context, single }
    }

    pub async fn delegate_parallel(
        &self,
        target: &Target,
        tasks: Vec<TaskTemplate>,
        timeout: Duration,
    ) -> Vec<DelegationResult> {
        let total = tasks.len();
        let mut seen_correlation_ids = HashSet::new();
        let mut members = JoinSet::new();

        tracing::info!("Fanning out {} tasks from {}", total, self.context.job_id);

        for (index, template) in tasks.into_iter().enumerate() {
            let prepared = self.prepare(target, index, template, timeout);
            let prepared = match prepared {
                Ok(request) if !seen_correlation_ids.insert(request.correlation_id.clone()) => {
                    Err(HandoffError::InvalidArgument(format!(
                        "duplicate correlation id {} in fan-out",
                        request.correlation_id
                    )))
                }
                other => other,
            };

            let single = self.single.clone();
            members.spawn(async move {
                let outcome = AssertUnwindSafe(run_member(single, prepared))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        DelegationResult::failure(
                            ErrorKind::Internal,
                            format!("task panicked: {}", panic_message(&*panic)),
                        )
                    });
                (index, outcome)
            });
        }

        let mut results: Vec<Option<DelegationResult>> = vec![None; total];
        while let Some(joined) = members.join_next().await {
            match joined {
                Ok((index, outcome)) => results[index] = Some(outcome),
                Err(e) => tracing::error!("Fan-out member did not join: {}", e),
            }
        }

        results
            .into_iter()
            .enumerate()
            .map(|(index, outcome)| {
                outcome.unwrap_or_else(|| {
                    DelegationResult::failure(
                        ErrorKind::Internal,
                        format!("task {} did not complete", index),
                    )
                })
            })
            .collect()
    }

    fn prepare(
        &self,
        target: &Target,
        index: usize,
        template: TaskTemplate,
        timeout: Duration,
    ) -> Result<DelegationRequest> {
        let target_agent = template
            .target_agent
            .or_else(|| target.agent_for(index).map(str::to_string))
            .ok_or_else(|| {
                HandoffError::InvalidArgument(format!("no target agent for task {}", index))
            })?;

        Ok(DelegationRequest {
            target_agent,
            description: template.description,
            payload: template.payload,
            job_id: self.context.job_id.clone(),
            correlation_id: template
                .correlation_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            timeout: template.timeout.unwrap_or(timeout),
        })
    }
}

async fn run_member(
    single: Arc<dyn DelegateTask>,
    prepared: Result<DelegationRequest>,
) -> DelegationResult {
    let request = match prepared {
        Ok(request) => request,
        Err(e) => return DelegationResult::from_error(&e),
    };

    match single.delegate_task(request).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!("Fan-out member raised: {}", e);
            DelegationResult::from_error(&e)
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
