//! Two-phase pretraining command.

use super::types::PretrainArgs;
use super::{run_launcher, CommandContext};
use anyhow::Result;
use gradlaunch_training::{
    toggle, LaunchOptions, OptimizerParams, PhaseFailurePolicy, PretrainLauncher, PretrainParams,
};

pub async fn execute(args: PretrainArgs, ctx: &CommandContext) -> Result<i32> {
    let mut params = PretrainParams::with_prep_dir(&args.prep_dir);

    params.precision = args.precision.parse()?;
    params.num_gpus = ctx.num_gpus(args.num_gpus);
    params.save_checkpoint_steps = args.save_checkpoint_steps;
    params.create_logfile = toggle(&args.create_logfile);
    params.seed = args.seed;
    params.job_name = args.job_name;
    params.options = LaunchOptions::from_args(
        &args.accumulate_gradients,
        &args.resume_training,
        &args.allreduce_post_accumulation,
        &args.allreduce_post_accumulation_fp16,
        &args.sampling_with_replacement,
        &args.init_checkpoint,
    );

    params.phase1.train_batch_size = args.train_batch_size;
    params.phase1.learning_rate = args.learning_rate;
    params.phase1.warmup_proportion = args.warmup_proportion;
    params.phase1.train_steps = args.train_steps;
    params.phase1.gradient_accumulation_steps = args.gradient_accumulation_steps;
    if let Some(dir) = args.data_dir_phase1 {
        params.phase1.data_dir = dir;
    }

    params.phase2.train_batch_size = args.train_batch_size_phase2;
    params.phase2.learning_rate = args.learning_rate_phase2;
    params.phase2.warmup_proportion = args.warmup_proportion_phase2;
    params.phase2.train_steps = args.train_steps_phase2;
    params.phase2.gradient_accumulation_steps = args.gradient_accumulation_steps_phase2;
    if let Some(dir) = args.data_dir_phase2 {
        params.phase2.data_dir = dir;
    }

    params.bert_config = args.bert_config.unwrap_or_else(|| args.code_dir.join("bert_config.json"));
    params.code_dir = args.code_dir;
    params.optimizer = OptimizerParams {
        name: args.optimizer,
        weight_decay: args.weight_decay,
        beta1: args.beta1,
        beta2: args.beta2,
    };
    params.autoscaler_cfg = args.autoscaler_cfg;
    params.on_phase1_failure = match args.on_phase1_failure {
        Some(raw) => raw.parse::<PhaseFailurePolicy>()?,
        None => ctx.config.phase1_failure.unwrap_or_default(),
    };

    run_launcher(&PretrainLauncher::new(params), ctx).await
}
