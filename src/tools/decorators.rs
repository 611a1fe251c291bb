//! Overrides composed around another implementation

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use super::DelegateTask;
use crate::error::Result;
use crate::models::{DelegationRequest, DelegationResult};

/// Re-issues a timed out delegation, each time under a fresh correlation id
/// so a late answer to an earlier attempt is never mistaken for the retry's.
pub struct RetryOnTimeout {
    inner: Arc<dyn DelegateTask>,
    extra_attempts: u32,
}

impl RetryOnTimeout {
    pub fn new(inner: Arc<dyn DelegateTask>, extra_attempts: u32) -> Self {
        Self {
            inner,
            extra_attempts,
        }
    }
}

#[async_trait]
impl DelegateTask for RetryOnTimeout {
    async fn delegate_task(&self, request: DelegationRequest) -> Result<DelegationResult> {
        let mut result = self.inner.delegate_task(request.clone()).await?;

        for attempt in 1..=self.extra_attempts {
            if !result.is_timed_out() {
                break;
            }
            let retry = request
                .clone()
                .with_correlation_id(Uuid::new_v4().to_string());
            tracing::info!(
                "Retrying {} to {} as {} (attempt {} of {})",
                request.correlation_id,
                request.target_agent,
                retry.correlation_id,
                attempt,
                self.extra_attempts
            );
            result = self.inner.delegate_task(retry).await?;
        }

        Ok(result)
    }
}
