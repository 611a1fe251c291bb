//! Subcommand implementations

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use handoff::artifact::HttpArtifactBackend;
use handoff::bus::HttpBus;
use handoff::tools::RetryOnTimeout;
use handoff::{
    AgentContext, AgentInbox, ArtifactReference, ArtifactStore, Bus, DelegationRequest,
    DelegationResult, Payload, SubstrateConfig, TaskTemplate, Target, ToolImpl, ToolRegistry,
    ToolSet,
};

/// Everything one CLI invocation needs to talk to the hub
pub struct Session {
    context: AgentContext,
    config: SubstrateConfig,
    bus: Arc<dyn Bus>,
    artifacts: ArtifactStore,
    registry: ToolRegistry,
}

impl Session {
    pub fn connect(hub: &str, job: Option<String>, agent_id: String) -> Result<Self> {
        let job = job.unwrap_or_else(|| Uuid::new_v4().to_string());
        let context = AgentContext::new(job, agent_id);
        let config = SubstrateConfig::from_env()?;

        let bus: Arc<dyn Bus> = Arc::new(HttpBus::new(hub));
        let artifacts = ArtifactStore::new(Arc::new(HttpArtifactBackend::new(hub)));
        let registry = ToolRegistry::new(ToolSet::builtin(
            context.clone(),
            bus.clone(),
            artifacts.clone(),
            config.clone(),
        ));

        tracing::debug!(
            "Session for {} in job {} via {}",
            context.agent_id,
            context.job_id,
            hub
        );

        Ok(Self {
            context,
            config,
            bus,
            artifacts,
            registry,
        })
    }

    pub async fn delegate(
        &self,
        target: &str,
        description: &str,
        payload: &str,
        timeout_ms: Option<u64>,
        retries: u32,
    ) -> Result<()> {
        let payload = parse_payload(payload)?;
        let timeout = timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.config.default_timeout);

        if retries > 0 {
            let default = self.registry.builtins().delegate_task.clone();
            self.registry
                .register(ToolImpl::DelegateTask(Arc::new(RetryOnTimeout::new(
                    default, retries,
                ))))
                .await;
        }

        let request = DelegationRequest::new(&self.context, target, description, payload, timeout);
        tracing::info!("Delegating {} to {}", request.correlation_id, target);

        let result = self.registry.delegate_task(request).await?;
        print_json(&result)?;
        exit_status(std::slice::from_ref(&result))
    }

    pub async fn fanout(
        &self,
        targets: Vec<String>,
        descriptions: Vec<String>,
        payload: &str,
        timeout_ms: u64,
    ) -> Result<()> {
        let payload = parse_payload(payload)?;
        let target = match <[String; 1]>::try_from(targets) {
            Ok([agent]) => Target::Agent(agent),
            Err(agents) => Target::PerTask(agents),
        };
        let tasks = descriptions
            .into_iter()
            .map(|description| TaskTemplate::new(description, payload.clone()))
            .collect();

        let results = self
            .registry
            .delegate_parallel(target, tasks, Duration::from_millis(timeout_ms))
            .await?;
        print_json(&results)?;
        exit_status(&results)
    }

    pub async fn respond(&self, once: bool, idle_ms: Option<u64>) -> Result<()> {
        let mut inbox = AgentInbox::new(
            self.context.clone(),
            self.bus.clone(),
            self.artifacts.clone(),
            self.config.clone(),
        );
        let max_wait = Duration::from_millis(idle_ms.unwrap_or(60_000));

        tracing::info!("Answering tasks for {}", self.context.agent_id);

        loop {
            let next = tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted");
                    return Ok(());
                }
                next = inbox.next_task(max_wait) => next?,
            };

            let Some(task) = next else {
                if idle_ms.is_some() {
                    tracing::info!("No task within {:?}, exiting", max_wait);
                    return Ok(());
                }
                continue;
            };

            let reply = json!({
                "agent": self.context.agent_id,
                "description": task.description(),
                "payload": task.payload,
            });
            inbox.respond(&task, Ok(reply)).await?;

            if once {
                return Ok(());
            }
        }
    }

    pub async fn put(&self, bucket: &str, file: Option<PathBuf>) -> Result<()> {
        let bytes = match file {
            Some(path) => tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?,
            None => {
                let mut buf = Vec::new();
                tokio::io::stdin().read_to_end(&mut buf).await?;
                buf
            }
        };

        let reference = self.registry.store_artifact(bucket, bytes).await?;
        println!("{}", serde_json::to_string(&reference)?);
        Ok(())
    }

    pub async fn get(&self, reference: &str, output: Option<PathBuf>) -> Result<()> {
        let reference: ArtifactReference =
            serde_json::from_str(reference).context("parsing artifact reference")?;
        let bytes = self.registry.retrieve_artifact(&reference).await?;

        match output {
            Some(path) => tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("writing {}", path.display()))?,
            None => {
                let mut stdout = tokio::io::stdout();
                stdout.write_all(&bytes).await?;
                stdout.flush().await?;
            }
        }
        Ok(())
    }
}

fn parse_payload(raw: &str) -> Result<Payload> {
    serde_json::from_str(raw).context("payload must be a JSON object")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_status(results: &[DelegationResult]) -> Result<()> {
    let unsuccessful = results.iter().filter(|r| !r.is_success()).count();
    if unsuccessful > 0 {
        bail!("{} of {} delegations did not succeed", unsuccessful, results.len());
    }
    Ok(())
}
