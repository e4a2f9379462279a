//! Question-answering fine-tuning command.

use super::types::FinetuneArgs;
use super::{run_launcher, CommandContext};
use anyhow::Result;
use gradlaunch_training::{toggle, FinetuneLauncher, FinetuneMode, FinetuneParams};

pub async fn execute(args: FinetuneArgs, ctx: &CommandContext) -> Result<i32> {
    let defaults = FinetuneParams::with_prep_dir(&args.prep_dir);
    let strict = args.strict_mode || ctx.config.strict_mode;

    let params = FinetuneParams {
        init_checkpoint: args.init_checkpoint,
        epochs: args.epochs,
        batch_size: args.batch_size,
        learning_rate: args.learning_rate,
        warmup_proportion: args.warmup_proportion,
        precision: args.precision.parse()?,
        num_gpus: ctx.num_gpus(args.num_gpus),
        seed: args.seed,
        squad_dir: args.squad_dir.unwrap_or(defaults.squad_dir),
        vocab_file: args.vocab_file.unwrap_or(defaults.vocab_file),
        out_dir: args.out_dir,
        mode: FinetuneMode::resolve(&args.mode, strict)?,
        config_file: args.config_file,
        max_steps: args.max_steps,
        create_logfile: toggle(&args.create_logfile),
        job_name: args.job_name,
        code_dir: args.code_dir,
        bert_model: defaults.bert_model,
    };
    run_launcher(&FinetuneLauncher::new(params), ctx).await
}
