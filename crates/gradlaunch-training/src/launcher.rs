use crate::command::LaunchCommand;
use crate::distributed::Interpreter;
use crate::env::{ClusterTopology, TransportConfig};
use crate::error::{LaunchError, LaunchResult};
use crate::layout::LogFile;
use crate::progress::{LaunchEvent, LaunchEventSink, RunId};
use crate::runner::{ExitOutcome, Runner};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use tracing::info;

/// Process-boundary inputs shared by every launcher.
#[derive(Debug, Clone, Default)]
pub struct LaunchEnv {
    pub interpreter: Interpreter,
    pub topology: ClusterTopology,
    pub transport: TransportConfig,
}

impl LaunchEnv {
    /// Devices participating in the job: GPUs per node times node count.
    pub fn device_count(&self, gpus_per_node: u32) -> LaunchResult<u32> {
        let nnodes = self.topology.nnodes.max(1);
        gpus_per_node.checked_mul(nnodes).ok_or_else(|| {
            LaunchError::InvalidCommand(format!(
                "device count overflows: {gpus_per_node} GPUs x {nnodes} nodes"
            ))
        })
    }
}

/// One CLI invocation: where commands go and who hears about them.
pub struct LaunchSession<'a> {
    pub env: &'a LaunchEnv,
    pub runner: &'a dyn Runner,
    pub events: &'a dyn LaunchEventSink,
    pub run_id: RunId,
    pub started_at: DateTime<Local>,
}

impl<'a> LaunchSession<'a> {
    #[must_use]
    pub fn new(
        env: &'a LaunchEnv,
        runner: &'a dyn Runner,
        events: &'a dyn LaunchEventSink,
    ) -> Self {
        Self { env, runner, events, run_id: RunId::new(), started_at: Local::now() }
    }

    /// Whether the runner really executes commands (false for dry runs).
    #[must_use]
    pub fn executes(&self) -> bool {
        self.runner.executes()
    }

    /// Run one command to completion, reporting lifecycle events.
    pub async fn execute(
        &self,
        job: &str,
        command: &LaunchCommand,
        log: Option<&LogFile>,
    ) -> LaunchResult<ExitOutcome> {
        let rendered = command.to_string();
        if !self.runner.executes() {
            self.events.on_event(LaunchEvent::DryRun {
                run_id: self.run_id.clone(),
                job: job.to_string(),
                command: rendered,
            });
            return self.runner.run(command, log).await;
        }

        if let Some(log) = log {
            self.events.on_event(LaunchEvent::LogFile {
                run_id: self.run_id.clone(),
                job: job.to_string(),
                path: log.path.clone(),
            });
        }
        self.events.on_event(LaunchEvent::Started {
            run_id: self.run_id.clone(),
            job: job.to_string(),
            command: rendered,
        });
        info!(run_id = %self.run_id, job, "launching");

        let outcome = self.runner.run(command, log).await?;
        self.events.on_event(LaunchEvent::Finished {
            run_id: self.run_id.clone(),
            job: job.to_string(),
            exit_code: outcome.code(),
        });
        Ok(outcome)
    }
}

/// A standalone launcher entry point.
#[async_trait]
pub trait Launcher: Send + Sync {
    fn id(&self) -> &'static str;

    /// Assemble every command this launcher would run, without side effects.
    fn plan(&self, env: &LaunchEnv) -> LaunchResult<Vec<LaunchCommand>>;

    /// Validate, launch and wait. The returned outcome is the CLI's exit status.
    async fn launch(&self, session: &LaunchSession<'_>) -> LaunchResult<ExitOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with_nodes(nnodes: u32) -> LaunchEnv {
        LaunchEnv {
            topology: ClusterTopology { nnodes, ..ClusterTopology::default() },
            ..LaunchEnv::default()
        }
    }

    #[test]
    fn test_device_count() {
        assert_eq!(env_with_nodes(1).device_count(8).unwrap(), 8);
        assert_eq!(env_with_nodes(4).device_count(8).unwrap(), 32);
        assert_eq!(env_with_nodes(0).device_count(2).unwrap(), 2);
    }

    #[test]
    fn test_device_count_overflow() {
        let err = env_with_nodes(70_000).device_count(70_000).unwrap_err();
        assert!(matches!(err, LaunchError::InvalidCommand(_)));
        assert!(err.to_string().contains("overflows"));
    }
}
