//! gradlaunch CLI - launch distributed training jobs
//!
//! Provides the `gradlaunch` command with one subcommand per launcher:
//! object-detection training, two-phase language-model pretraining and
//! question-answering fine-tuning.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use gradlaunch_training::LaunchError;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::types::{DetectArgs, FinetuneArgs, PretrainArgs};
use commands::{detect, finetune, pretrain, CommandContext};

/// gradlaunch - distributed training launcher
///
/// Each subcommand takes positional arguments in a fixed order; omitted
/// trailing arguments use their documented defaults.
#[derive(Parser, Debug)]
#[command(
    name = "gradlaunch",
    author,
    version,
    about = "gradlaunch - configure and launch distributed training jobs",
    long_about = "gradlaunch assembles torch.distributed.launch command lines for detection \
                  training,\ntwo-phase BERT pretraining and SQuAD fine-tuning, exports the \
                  network transport\nenvironment and mirrors the job output to a log file."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Launcher config file (overrides ~/.gradlaunch/config.toml and ./.gradlaunchrc)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Run preflight checks and print the commands without launching anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Print the assembled commands as JSON and exit (no preflight, no launch)
    #[arg(long, global = true)]
    print_plan: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Launch object-detection training
    ///
    /// Sets the solver schedule (learning rate, batch size, iterations, warmup,
    /// decay milestones) as config overrides of the detection program.
    Detect(DetectArgs),

    /// Launch two-phase language-model pretraining
    ///
    /// Runs phase 1 (sequence length 128) to completion, then phase 2
    /// (sequence length 512) resuming from phase 1's checkpoint.
    Pretrain(PretrainArgs),

    /// Launch question-answering fine-tuning and/or evaluation
    ///
    /// Modes: train, eval, prediction, or "train eval" (the default).
    Finetune(FinetuneArgs),
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber =
        FmtSubscriber::builder().with_max_level(level).without_time().with_target(false).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<i32> {
    let launcher_config = config::load_config(args.config.as_deref())?;

    let level = args
        .log_level
        .clone()
        .or_else(|| launcher_config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    init_tracing(&level)?;

    let ctx = CommandContext::from_process(&launcher_config, args.dry_run, args.print_plan)?;
    match args.command {
        Command::Detect(cmd) => detect::execute(cmd, &ctx).await,
        Command::Pretrain(cmd) => pretrain::execute(cmd, &ctx).await,
        Command::Finetune(cmd) => finetune::execute(cmd, &ctx).await,
    }
}

/// Configuration errors go to stdout, like the rest of the launcher output.
fn report(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<LaunchError>() {
        Some(launch) if launch.is_configuration() => {
            println!("{} {:#}", "Error!".red().bold(), err);
            launch.exit_code()
        }
        Some(launch) => {
            eprintln!("{} {:#}", "Error:".red().bold(), err);
            launch.exit_code()
        }
        None => {
            eprintln!("{} {:#}", "Error:".red().bold(), err);
            1
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let code = match run(args).await {
        Ok(code) => code,
        Err(err) => report(&err),
    };
    std::process::exit(code);
}
