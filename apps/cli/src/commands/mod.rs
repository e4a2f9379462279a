//! Command implementations for the gradlaunch CLI.

pub mod detect;
pub mod finetune;
pub mod pretrain;
pub mod types;

use anyhow::Result;
use gradlaunch_training::{
    ClusterTopology, DryRunRunner, LaunchEnv, LaunchSession, Launcher, LauncherConfig,
    ProcessRunner, StdoutEventSink,
};
use tracing::debug;

/// Everything a command needs from outside its own arguments.
pub struct CommandContext {
    pub env: LaunchEnv,
    pub config: LauncherConfig,
    pub dry_run: bool,
    pub print_plan: bool,
}

impl CommandContext {
    /// Build the launch environment from the config file and process environment.
    pub fn from_process(config: &LauncherConfig, dry_run: bool, print_plan: bool) -> Result<Self> {
        let topology = ClusterTopology::from_process_env()?;
        let env = LaunchEnv {
            interpreter: config.interpreter(std::env::var("GRADLAUNCH_PYTHON").ok()),
            topology,
            transport: config.transport().with_process_overrides()?,
        };
        debug!(?env, "launch environment");
        Ok(Self { env, config: config.clone(), dry_run, print_plan })
    }

    /// GPUs per node: the positional argument, then `NUM_GPUS`, then 8.
    pub fn num_gpus(&self, arg: Option<u32>) -> u32 {
        arg.or(self.env.topology.gpus_per_node).unwrap_or(8)
    }
}

/// Print the plan, or launch for real (or dry), returning the process exit code.
pub async fn run_launcher(launcher: &dyn Launcher, ctx: &CommandContext) -> Result<i32> {
    if ctx.print_plan {
        let plan = launcher.plan(&ctx.env)?;
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(0);
    }

    let events = StdoutEventSink;
    let outcome = if ctx.dry_run {
        let session = LaunchSession::new(&ctx.env, &DryRunRunner, &events);
        launcher.launch(&session).await?
    } else {
        let runner = ProcessRunner;
        let session = LaunchSession::new(&ctx.env, &runner, &events);
        launcher.launch(&session).await?
    };
    Ok(outcome.code())
}
