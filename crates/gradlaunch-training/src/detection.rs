//! Object-detection training launcher.
//!
//! The detection program takes a YAML config plus trailing `KEY VALUE`
//! overrides, so the solver schedule is expressed as config overrides rather
//! than `--flags`.

use crate::command::{CommandBuilder, FlagSchema, LaunchCommand};
use crate::error::{LaunchError, LaunchResult};
use crate::launcher::{LaunchEnv, LaunchSession, Launcher};
use crate::layout::{log_tag, ResultsLayout};
use crate::params::{global_batch_size, Precision};
use crate::preflight;
use crate::runner::ExitOutcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

static TRAIN_NET: FlagSchema = FlagSchema {
    program: "train_net.py",
    flags: &["config-file"],
    overrides: &[
        "SOLVER.BASE_LR",
        "SOLVER.IMS_PER_BATCH",
        "SOLVER.MAX_ITER",
        "SOLVER.WARMUP_FACTOR",
        "SOLVER.WARMUP_ITERS",
        "SOLVER.STEPS",
        "SOLVER.OPTIMIZER",
        "SOLVER.WEIGHT_DECAY",
        "SOLVER.MOMENTUM",
        "TEST.IMS_PER_BATCH",
        "DTYPE",
        "DATA_DIR",
        "OUTPUT_DIR",
    ],
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionParams {
    pub base_lr: f64,
    pub batch_per_gpu: u32,
    pub max_iter: u64,
    pub warmup_iters: u64,
    pub warmup_factor: f64,
    pub precision: Precision,
    pub num_gpus: u32,
    pub config_file: PathBuf,
    pub results_dir: PathBuf,
    pub data_dir: PathBuf,
    pub create_logfile: bool,
    pub job_name: String,
    /// Iterations at which the learning rate decays.
    pub decay_steps: Vec<u64>,
    pub optimizer: String,
    pub weight_decay: f64,
    pub momentum: f64,
    pub script: String,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            base_lr: 0.12,
            batch_per_gpu: 12,
            max_iter: 40000,
            warmup_iters: 800,
            warmup_factor: 0.000_256,
            precision: Precision::Fp16,
            num_gpus: 8,
            config_file: PathBuf::from("configs/e2e_mask_rcnn_R_50_FPN_1x.yaml"),
            results_dir: PathBuf::from("/workspace/results"),
            data_dir: PathBuf::from("/workspace/data/coco"),
            create_logfile: true,
            job_name: "maskrcnn".to_string(),
            decay_steps: vec![30000, 40000],
            optimizer: "sgdw".to_string(),
            weight_decay: 0.0001,
            momentum: 0.9,
            script: "tools/train_net.py".to_string(),
        }
    }
}

/// Parse `"30000,40000"` (parentheses and spaces tolerated) into milestones.
pub fn parse_decay_steps(raw: &str) -> LaunchResult<Vec<u64>> {
    raw.trim_matches(|c| c == '(' || c == ')')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .map_err(|_| LaunchError::InvalidCommand(format!("invalid decay step {s:?}")))
        })
        .collect()
}

impl DetectionParams {
    pub fn validate(&self) -> LaunchResult<()> {
        if !self.base_lr.is_finite() || self.base_lr <= 0.0 {
            return Err(LaunchError::InvalidCommand("base_lr must be > 0".to_string()));
        }
        if self.batch_per_gpu == 0 || self.num_gpus == 0 {
            return Err(LaunchError::InvalidCommand(
                "batch size and GPU count must be >= 1".to_string(),
            ));
        }
        if self.max_iter == 0 {
            return Err(LaunchError::InvalidCommand("max_iter must be >= 1".to_string()));
        }
        if self.warmup_iters > self.max_iter {
            return Err(LaunchError::InvalidCommand(
                "warmup_iters cannot exceed max_iter".to_string(),
            ));
        }
        if self.decay_steps.windows(2).any(|w| w[0] >= w[1]) {
            return Err(LaunchError::InvalidCommand(
                "decay steps must be strictly increasing".to_string(),
            ));
        }
        if self.decay_steps.iter().any(|&s| s > self.max_iter) {
            return Err(LaunchError::InvalidCommand(
                "decay steps cannot exceed max_iter".to_string(),
            ));
        }
        Ok(())
    }

    pub fn global_batch_size(&self, env: &LaunchEnv) -> LaunchResult<u64> {
        global_batch_size(u64::from(self.batch_per_gpu), self.num_gpus, env.topology.nnodes)
    }

    fn solver_steps(&self) -> String {
        let steps: Vec<String> = self.decay_steps.iter().map(ToString::to_string).collect();
        format!("({})", steps.join(", "))
    }

    pub fn build_command(&self, env: &LaunchEnv) -> LaunchResult<LaunchCommand> {
        self.validate()?;
        let args = CommandBuilder::new(&TRAIN_NET)
            .value("config-file", self.config_file.display())
            .config_override("SOLVER.BASE_LR", self.base_lr)
            .config_override("SOLVER.IMS_PER_BATCH", self.global_batch_size(env)?)
            .config_override("SOLVER.MAX_ITER", self.max_iter)
            .config_override("SOLVER.WARMUP_FACTOR", self.warmup_factor)
            .config_override("SOLVER.WARMUP_ITERS", self.warmup_iters)
            .config_override("SOLVER.STEPS", self.solver_steps())
            .config_override("SOLVER.OPTIMIZER", &self.optimizer)
            .config_override("SOLVER.WEIGHT_DECAY", self.weight_decay)
            .config_override("SOLVER.MOMENTUM", self.momentum)
            .config_override("TEST.IMS_PER_BATCH", env.device_count(self.num_gpus)?)
            .config_override("DATA_DIR", self.data_dir.display())
            .config_override("OUTPUT_DIR", self.results_dir.display());
        let args =
            if self.precision.is_half() { args.config_override("DTYPE", "float16") } else { args };

        Ok(env
            .interpreter
            .distributed(self.num_gpus, &env.topology, &self.script)?
            .args(args.build()?)
            .env(env.transport.to_env()))
    }
}

#[derive(Debug, Clone)]
pub struct DetectionLauncher {
    pub params: DetectionParams,
}

impl DetectionLauncher {
    #[must_use]
    pub fn new(params: DetectionParams) -> Self {
        Self { params }
    }
}

#[async_trait]
impl Launcher for DetectionLauncher {
    fn id(&self) -> &'static str {
        "detect"
    }

    fn plan(&self, env: &LaunchEnv) -> LaunchResult<Vec<LaunchCommand>> {
        Ok(vec![self.params.build_command(env)?])
    }

    async fn launch(&self, session: &LaunchSession<'_>) -> LaunchResult<ExitOutcome> {
        let params = &self.params;
        let layout = ResultsLayout::new(params.results_dir.clone());
        layout.require_results_dir()?;
        preflight::require_file("detection config file", &params.config_file)?;
        preflight::warn_if_missing_dataset(&params.data_dir);

        let command = params.build_command(session.env)?;
        let gbs = params.global_batch_size(session.env)?;
        let log = params.create_logfile.then(|| {
            let tag = log_tag("pyt_maskrcnn", params.precision, gbs);
            layout.log_file(&params.job_name, &tag, session.started_at)
        });

        session.execute(&params.job_name, &command, log.as_ref()).await
    }
}
