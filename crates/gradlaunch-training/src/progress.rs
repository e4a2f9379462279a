use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Identifier attached to every event of one CLI invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LaunchEvent {
    Started { run_id: RunId, job: String, command: String },
    LogFile { run_id: RunId, job: String, path: PathBuf },
    DryRun { run_id: RunId, job: String, command: String },
    Finished { run_id: RunId, job: String, exit_code: i32 },
}

pub trait LaunchEventSink: Send + Sync {
    fn on_event(&self, event: LaunchEvent);
}

#[derive(Debug, Default)]
pub struct StdoutEventSink;

impl LaunchEventSink for StdoutEventSink {
    fn on_event(&self, event: LaunchEvent) {
        match event {
            LaunchEvent::Started { job, command, .. } => println!("[{job}] + {command}"),
            LaunchEvent::LogFile { path, .. } => println!("Logs written to {}", path.display()),
            LaunchEvent::DryRun { job, command, .. } => println!("[{job}] (dry run) {command}"),
            LaunchEvent::Finished { job, exit_code, .. } => {
                if exit_code == 0 {
                    println!("finished {job}");
                } else {
                    println!("finished {job} (exit code {exit_code})");
                }
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NullEventSink;

impl LaunchEventSink for NullEventSink {
    fn on_event(&self, _event: LaunchEvent) {}
}
