//! Detection training command.

use super::types::DetectArgs;
use super::{run_launcher, CommandContext};
use anyhow::Result;
use gradlaunch_training::{parse_decay_steps, toggle, DetectionLauncher, DetectionParams};

pub async fn execute(args: DetectArgs, ctx: &CommandContext) -> Result<i32> {
    let params = DetectionParams {
        base_lr: args.base_lr,
        batch_per_gpu: args.batch_per_gpu,
        max_iter: args.max_iter,
        warmup_iters: args.warmup_iters,
        warmup_factor: args.warmup_factor,
        precision: args.precision.parse()?,
        num_gpus: ctx.num_gpus(args.num_gpus),
        config_file: args.config_file,
        results_dir: args.results_dir,
        data_dir: args.data_dir,
        create_logfile: toggle(&args.create_logfile),
        job_name: args.job_name,
        decay_steps: parse_decay_steps(&args.decay_steps)?,
        optimizer: args.optimizer,
        weight_decay: args.weight_decay,
        momentum: args.momentum,
        script: args.script,
    };
    run_launcher(&DetectionLauncher::new(params), ctx).await
}
