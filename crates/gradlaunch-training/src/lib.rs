//! gradlaunch training launchers
//!
//! Typed configuration and launch plumbing for distributed training jobs:
//! - Resolving hyperparameters and toggles (`params`)
//! - Assembling argument vectors against per-program flag schemas (`command`)
//! - Translating cluster topology and transport settings to the child environment (`env`)
//! - Launching detection, two-phase pretraining and fine-tuning jobs (`Launcher`)
//! - Running children with terminal + log file output (`Runner`)

pub mod autoscaler;
pub mod command;
pub mod config;
pub mod detection;
pub mod distributed;
pub mod env;
pub mod error;
pub mod finetune;
pub mod launcher;
pub mod layout;
pub mod params;
pub mod preflight;
pub mod pretrain;
pub mod progress;
pub mod runner;

pub use autoscaler::AutoscalerConfig;
pub use command::{CommandBuilder, FlagSchema, LaunchCommand};
pub use config::LauncherConfig;
pub use detection::{parse_decay_steps, DetectionLauncher, DetectionParams};
pub use distributed::Interpreter;
pub use env::{ClusterTopology, TransportConfig};
pub use error::{LaunchError, LaunchResult};
pub use finetune::{FinetuneLauncher, FinetuneMode, FinetuneParams, ModeSelection};
pub use launcher::{LaunchEnv, LaunchSession, Launcher};
pub use layout::{log_tag, LogFile, ResultsLayout};
pub use params::{
    global_batch_size, optional_path, toggle, LaunchOptions, OptimizerParams, Precision,
};
pub use pretrain::{Phase, PhaseFailurePolicy, PhaseParams, PretrainLauncher, PretrainParams};
pub use progress::{LaunchEvent, LaunchEventSink, NullEventSink, RunId, StdoutEventSink};
pub use runner::{DryRunRunner, ExitOutcome, ProcessRunner, Runner};
