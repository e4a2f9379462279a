//! Command argument definitions shared between main.rs and the command modules.
//!
//! Positional arguments mirror the launch scripts these subcommands replace:
//! precision and boolean toggles stay strings so that `"true"` is the only
//! value enabling a toggle and unknown precisions are reported by the launcher.

use clap::Args;
use std::path::PathBuf;

/// Default data preparation root when `BERT_PREP_WORKING_DIR` is unset.
pub const DEFAULT_PREP_DIR: &str = "/workspace/bert/data";

#[derive(Args, Debug, Clone)]
pub struct DetectArgs {
    /// Base learning rate
    #[arg(default_value_t = 0.12)]
    pub base_lr: f64,

    /// Images per GPU
    #[arg(default_value_t = 12)]
    pub batch_per_gpu: u32,

    /// Training iterations
    #[arg(default_value_t = 40000)]
    pub max_iter: u64,

    /// Warmup iterations
    #[arg(default_value_t = 800)]
    pub warmup_iters: u64,

    /// Warmup factor
    #[arg(default_value_t = 0.000_256)]
    pub warmup_factor: f64,

    /// Precision (fp16, fp32, tf32)
    #[arg(default_value = "fp16")]
    pub precision: String,

    /// GPUs per node (defaults to NUM_GPUS, then 8)
    pub num_gpus: Option<u32>,

    /// Detection config file
    #[arg(default_value = "configs/e2e_mask_rcnn_R_50_FPN_1x.yaml")]
    pub config_file: PathBuf,

    /// Results directory (must exist)
    #[arg(default_value = "/workspace/results")]
    pub results_dir: PathBuf,

    /// Dataset directory
    #[arg(default_value = "/workspace/data/coco")]
    pub data_dir: PathBuf,

    /// Mirror output to a log file in the results directory ("true" to enable)
    #[arg(default_value = "true")]
    pub create_logfile: String,

    /// Job name used in the log file name
    #[arg(default_value = "maskrcnn")]
    pub job_name: String,

    /// Comma-separated learning rate decay iterations
    #[arg(default_value = "30000,40000")]
    pub decay_steps: String,

    /// Optimizer name
    #[arg(default_value = "sgdw")]
    pub optimizer: String,

    /// Weight decay
    #[arg(default_value_t = 0.0001)]
    pub weight_decay: f64,

    /// Momentum
    #[arg(default_value_t = 0.9)]
    pub momentum: f64,

    /// Training program, relative to the working directory
    #[arg(long, default_value = "tools/train_net.py")]
    pub script: String,
}

#[derive(Args, Debug, Clone)]
pub struct PretrainArgs {
    /// Phase 1 per-GPU batch size
    #[arg(default_value_t = 8192)]
    pub train_batch_size: u64,

    /// Phase 1 learning rate
    #[arg(default_value_t = 6e-3)]
    pub learning_rate: f64,

    /// Precision (fp16, fp32, tf32)
    #[arg(default_value = "fp16")]
    pub precision: String,

    /// GPUs per node (defaults to NUM_GPUS, then 8)
    pub num_gpus: Option<u32>,

    /// Phase 1 warmup proportion
    #[arg(default_value_t = 0.2843)]
    pub warmup_proportion: f64,

    /// Phase 1 training steps
    #[arg(default_value_t = 7038)]
    pub train_steps: u64,

    /// Steps between checkpoints
    #[arg(default_value_t = 200)]
    pub save_checkpoint_steps: u64,

    /// Resume phase 1 from the latest checkpoint ("true" to enable)
    #[arg(default_value = "false")]
    pub resume_training: String,

    /// Mirror output to log files ("true" to enable)
    #[arg(default_value = "true")]
    pub create_logfile: String,

    /// Pass gradient accumulation steps ("true" to enable)
    #[arg(default_value = "true")]
    pub accumulate_gradients: String,

    /// Phase 1 gradient accumulation steps
    #[arg(default_value_t = 128)]
    pub gradient_accumulation_steps: u32,

    /// Random seed
    #[arg(default_value_t = 12439)]
    pub seed: u64,

    /// Job name used in log file names
    #[arg(default_value = "bert_lamb_pretraining")]
    pub job_name: String,

    /// All-reduce after accumulation ("true" to enable)
    #[arg(default_value = "true")]
    pub allreduce_post_accumulation: String,

    /// All-reduce in fp16 after accumulation ("true" to enable)
    #[arg(default_value = "true")]
    pub allreduce_post_accumulation_fp16: String,

    /// Sample with replacement ("true" to enable)
    #[arg(default_value = "false")]
    pub sampling_with_replacement: String,

    /// Phase 2 per-GPU batch size
    #[arg(default_value_t = 4096)]
    pub train_batch_size_phase2: u64,

    /// Phase 2 learning rate
    #[arg(default_value_t = 4e-3)]
    pub learning_rate_phase2: f64,

    /// Phase 2 warmup proportion
    #[arg(default_value_t = 0.128)]
    pub warmup_proportion_phase2: f64,

    /// Phase 2 training steps
    #[arg(default_value_t = 1563)]
    pub train_steps_phase2: u64,

    /// Phase 2 gradient accumulation steps
    #[arg(default_value_t = 512)]
    pub gradient_accumulation_steps_phase2: u32,

    /// Phase 1 dataset (defaults under the prep dir)
    pub data_dir_phase1: Option<PathBuf>,

    /// Phase 2 dataset (defaults under the prep dir)
    pub data_dir_phase2: Option<PathBuf>,

    /// Code directory holding run_pretraining.py and results/
    #[arg(default_value = "/workspace/bert")]
    pub code_dir: PathBuf,

    /// Checkpoint to initialize phase 1 from ("None" for none)
    #[arg(default_value = "None")]
    pub init_checkpoint: String,

    /// Optimizer name
    #[arg(default_value = "lamb")]
    pub optimizer: String,

    /// Weight decay
    #[arg(default_value_t = 0.01)]
    pub weight_decay: f64,

    /// Adam beta1
    #[arg(default_value_t = 0.9)]
    pub beta1: f64,

    /// Adam beta2
    #[arg(default_value_t = 0.999)]
    pub beta2: f64,

    /// Model config file (defaults to <code_dir>/bert_config.json)
    #[arg(long)]
    pub bert_config: Option<PathBuf>,

    /// What to do when phase 1 fails (abort, continue)
    #[arg(long)]
    pub on_phase1_failure: Option<String>,

    /// Autoscaler YAML passed to both phases
    #[arg(long)]
    pub autoscaler_cfg: Option<PathBuf>,

    /// Data preparation root
    #[arg(long, env = "BERT_PREP_WORKING_DIR", default_value = DEFAULT_PREP_DIR)]
    pub prep_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct FinetuneArgs {
    /// Checkpoint to fine-tune from
    #[arg(default_value = "/workspace/bert/checkpoints/bert_uncased.pt")]
    pub init_checkpoint: PathBuf,

    /// Training epochs
    #[arg(default_value_t = 2.0)]
    pub epochs: f64,

    /// Per-GPU batch size
    #[arg(default_value_t = 4)]
    pub batch_size: u32,

    /// Learning rate
    #[arg(default_value_t = 3e-5)]
    pub learning_rate: f64,

    /// Warmup proportion
    #[arg(default_value_t = 0.1)]
    pub warmup_proportion: f64,

    /// Precision (fp16, fp32, tf32)
    #[arg(default_value = "fp16")]
    pub precision: String,

    /// GPUs per node (defaults to NUM_GPUS, then 8)
    pub num_gpus: Option<u32>,

    /// Random seed
    #[arg(default_value_t = 1)]
    pub seed: u64,

    /// SQuAD dataset directory (defaults under the prep dir)
    pub squad_dir: Option<PathBuf>,

    /// Vocabulary file (defaults under the prep dir)
    pub vocab_file: Option<PathBuf>,

    /// Output directory (created if absent)
    #[arg(default_value = "/workspace/bert/results/SQuAD")]
    pub out_dir: PathBuf,

    /// Mode: train, eval, prediction or "train eval"
    #[arg(default_value = "train eval")]
    pub mode: String,

    /// Model config file
    #[arg(default_value = "/workspace/bert/bert_config.json")]
    pub config_file: PathBuf,

    /// Step limit, -1 to derive it from the epoch count
    #[arg(default_value_t = -1, allow_negative_numbers = true)]
    pub max_steps: i64,

    /// Mirror output to a log file ("true" to enable)
    #[arg(default_value = "true")]
    pub create_logfile: String,

    /// Job name used in the log file name
    #[arg(default_value = "bert_squad")]
    pub job_name: String,

    /// Reject unrecognized modes instead of running every stage
    #[arg(long)]
    pub strict_mode: bool,

    /// Code directory holding run_squad.py
    #[arg(long, default_value = "/workspace/bert")]
    pub code_dir: PathBuf,

    /// Data preparation root
    #[arg(long, env = "BERT_PREP_WORKING_DIR", default_value = DEFAULT_PREP_DIR)]
    pub prep_dir: PathBuf,
}
