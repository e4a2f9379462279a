//! Question-answering fine-tuning and evaluation launcher.

use crate::command::{CommandBuilder, FlagSchema, LaunchCommand};
use crate::error::{LaunchError, LaunchResult};
use crate::launcher::{LaunchEnv, LaunchSession, Launcher};
use crate::layout::{log_tag, ResultsLayout};
use crate::params::{global_batch_size, Precision};
use crate::preflight;
use crate::runner::ExitOutcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

static RUN_SQUAD: FlagSchema = FlagSchema {
    program: "run_squad.py",
    flags: &[
        "init_checkpoint",
        "do_train",
        "train_file",
        "train_batch_size",
        "do_predict",
        "predict_file",
        "predict_batch_size",
        "eval_script",
        "do_eval",
        "do_lower_case",
        "bert_model",
        "learning_rate",
        "warmup_proportion",
        "seed",
        "num_train_epochs",
        "max_seq_length",
        "doc_stride",
        "output_dir",
        "vocab_file",
        "config_file",
        "max_steps",
        "fp16",
        "json-summary",
    ],
    overrides: &[],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinetuneMode {
    Train,
    /// Prediction followed by scoring with the evaluation script.
    Eval,
    Prediction,
    TrainEval,
}

/// Result of interpreting a raw mode argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeSelection {
    Exact(FinetuneMode),
    /// The argument named no mode; the combined mode is used instead.
    Fallback { requested: String },
}

impl ModeSelection {
    #[must_use]
    pub fn mode(&self) -> FinetuneMode {
        match self {
            Self::Exact(mode) => *mode,
            Self::Fallback { .. } => FinetuneMode::TrainEval,
        }
    }
}

impl FinetuneMode {
    #[must_use]
    pub fn select(raw: &str) -> ModeSelection {
        match raw {
            "train" => ModeSelection::Exact(Self::Train),
            "eval" => ModeSelection::Exact(Self::Eval),
            "prediction" => ModeSelection::Exact(Self::Prediction),
            "train eval" | "train_eval" => ModeSelection::Exact(Self::TrainEval),
            other => ModeSelection::Fallback { requested: other.to_string() },
        }
    }

    /// Resolve a raw mode, rejecting unknown values when `strict`.
    pub fn resolve(raw: &str, strict: bool) -> LaunchResult<Self> {
        match Self::select(raw) {
            ModeSelection::Exact(mode) => Ok(mode),
            ModeSelection::Fallback { requested } if strict => {
                Err(LaunchError::UnknownMode(requested))
            }
            fallback @ ModeSelection::Fallback { .. } => {
                warn!(mode = raw, "unrecognized mode, running train + eval + prediction");
                Ok(fallback.mode())
            }
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Eval => "eval",
            Self::Prediction => "prediction",
            Self::TrainEval => "train_eval",
        }
    }

    #[must_use]
    pub fn trains(self) -> bool {
        matches!(self, Self::Train | Self::TrainEval)
    }

    #[must_use]
    pub fn predicts(self) -> bool {
        !matches!(self, Self::Train)
    }

    #[must_use]
    pub fn evaluates(self) -> bool {
        matches!(self, Self::Eval | Self::TrainEval)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinetuneParams {
    pub init_checkpoint: PathBuf,
    pub epochs: f64,
    pub batch_size: u32,
    pub learning_rate: f64,
    pub warmup_proportion: f64,
    pub precision: Precision,
    pub num_gpus: u32,
    pub seed: u64,
    pub squad_dir: PathBuf,
    pub vocab_file: PathBuf,
    pub out_dir: PathBuf,
    pub mode: FinetuneMode,
    pub config_file: PathBuf,
    /// -1 lets the program derive the step count from the epoch count.
    pub max_steps: i64,
    pub create_logfile: bool,
    pub job_name: String,
    pub code_dir: PathBuf,
    pub bert_model: String,
}

impl FinetuneParams {
    #[must_use]
    pub fn with_prep_dir(prep_dir: &Path) -> Self {
        let download = prep_dir.join("download");
        Self {
            init_checkpoint: PathBuf::from("/workspace/bert/checkpoints/bert_uncased.pt"),
            epochs: 2.0,
            batch_size: 4,
            learning_rate: 3e-5,
            warmup_proportion: 0.1,
            precision: Precision::Fp16,
            num_gpus: 8,
            seed: 1,
            squad_dir: download.join("squad").join("v1.1"),
            vocab_file: download
                .join("google_pretrained_weights")
                .join("uncased_L-24_H-1024_A-16")
                .join("vocab.txt"),
            out_dir: PathBuf::from("/workspace/bert/results/SQuAD"),
            mode: FinetuneMode::TrainEval,
            config_file: PathBuf::from("/workspace/bert/bert_config.json"),
            max_steps: -1,
            create_logfile: true,
            job_name: "bert_squad".to_string(),
            code_dir: PathBuf::from("/workspace/bert"),
            bert_model: "bert-large-uncased".to_string(),
        }
    }

    pub fn validate(&self) -> LaunchResult<()> {
        if self.batch_size == 0 || self.num_gpus == 0 {
            return Err(LaunchError::InvalidCommand(
                "batch size and GPU count must be >= 1".to_string(),
            ));
        }
        if !self.epochs.is_finite() || self.epochs <= 0.0 {
            return Err(LaunchError::InvalidCommand("epochs must be > 0".to_string()));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(LaunchError::InvalidCommand("learning_rate must be > 0".to_string()));
        }
        if self.max_steps < -1 || self.max_steps == 0 {
            return Err(LaunchError::InvalidCommand("max_steps must be -1 or >= 1".to_string()));
        }
        Ok(())
    }

    pub fn global_batch_size(&self, env: &LaunchEnv) -> LaunchResult<u64> {
        global_batch_size(u64::from(self.batch_size), self.num_gpus, env.topology.nnodes)
    }

    pub fn build_command(&self, env: &LaunchEnv) -> LaunchResult<LaunchCommand> {
        self.validate()?;
        let mode = self.mode;
        let squad = &self.squad_dir;

        let args = CommandBuilder::new(&RUN_SQUAD)
            .value("init_checkpoint", self.init_checkpoint.display())
            .switch_if(mode.trains(), "do_train")
            .value_if(mode.trains(), "train_file", squad.join("train-v1.1.json").display())
            .value_if(mode.trains(), "train_batch_size", self.batch_size)
            .switch_if(mode.predicts(), "do_predict")
            .value_if(mode.predicts(), "predict_file", squad.join("dev-v1.1.json").display())
            .value_if(mode.predicts(), "predict_batch_size", self.batch_size)
            .value_if(mode.evaluates(), "eval_script", squad.join("evaluate-v1.1.py").display())
            .switch_if(mode.evaluates(), "do_eval")
            .switch("do_lower_case")
            .value("bert_model", &self.bert_model)
            .value("learning_rate", self.learning_rate)
            .value("warmup_proportion", self.warmup_proportion)
            .value("seed", self.seed)
            .value("num_train_epochs", self.epochs)
            .value("max_seq_length", 384)
            .value("doc_stride", 128)
            .value("output_dir", self.out_dir.display())
            .value("vocab_file", self.vocab_file.display())
            .value("config_file", self.config_file.display())
            .value("max_steps", self.max_steps)
            .switch_if(self.precision.is_half(), "fp16")
            .value("json-summary", self.out_dir.join("dllogger.json").display())
            .build()?;

        let script = self.code_dir.join("run_squad.py").display().to_string();
        let command = if self.num_gpus == 1 {
            env.interpreter
                .direct(&script)
                .env([("CUDA_VISIBLE_DEVICES".to_string(), "0".to_string())])
        } else {
            env.interpreter
                .distributed(self.num_gpus, &env.topology, &script)?
                .env_remove("CUDA_VISIBLE_DEVICES")
        };
        Ok(command.args(args).env(env.transport.to_env()))
    }
}

#[derive(Debug, Clone)]
pub struct FinetuneLauncher {
    pub params: FinetuneParams,
}

impl FinetuneLauncher {
    #[must_use]
    pub fn new(params: FinetuneParams) -> Self {
        Self { params }
    }
}

#[async_trait]
impl Launcher for FinetuneLauncher {
    fn id(&self) -> &'static str {
        "finetune"
    }

    fn plan(&self, env: &LaunchEnv) -> LaunchResult<Vec<LaunchCommand>> {
        Ok(vec![self.params.build_command(env)?])
    }

    async fn launch(&self, session: &LaunchSession<'_>) -> LaunchResult<ExitOutcome> {
        let params = &self.params;
        params.validate()?;
        info!("out dir is {}", params.out_dir.display());

        let layout = ResultsLayout::new(params.out_dir.clone());
        if session.executes() {
            std::fs::create_dir_all(&params.out_dir)?;
            layout.require_results_dir()?;
        } else if layout.require_results_dir().is_err() {
            let out_dir = params.out_dir.display();
            warn!("{out_dir} does not exist yet; it is created on a real launch");
        }
        preflight::require_file("BERT configuration file", &params.config_file)?;
        preflight::warn_if_missing_dataset(&params.squad_dir);
        if params.precision.is_half() {
            info!("fp16 activated!");
        }

        let command = params.build_command(session.env)?;
        let gbs = params.global_batch_size(session.env)?;
        let log = params.create_logfile.then(|| {
            let prefix = format!("pyt_bert_squad_{}", params.mode.as_str());
            let tag = log_tag(&prefix, params.precision, gbs);
            layout.log_file(&params.job_name, &tag, session.started_at)
        });

        session.execute(&params.job_name, &command, log.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRAIN_FLAGS: [&str; 3] = ["do_train", "train_file", "train_batch_size"];
    const PREDICT_FLAGS: [&str; 3] = ["do_predict", "predict_file", "predict_batch_size"];
    const EVAL_FLAGS: [&str; 2] = ["eval_script", "do_eval"];

    fn command_for(mode: &str) -> LaunchCommand {
        let mut params = FinetuneParams::with_prep_dir(Path::new("/prep"));
        params.mode = FinetuneMode::resolve(mode, false).unwrap();
        params.build_command(&LaunchEnv::default()).unwrap()
    }

    fn has_all(cmd: &LaunchCommand, flags: &[&str]) -> bool {
        flags.iter().all(|f| cmd.has_flag(f))
    }

    fn has_none(cmd: &LaunchCommand, flags: &[&str]) -> bool {
        flags.iter().all(|f| !cmd.has_flag(f))
    }

    #[test]
    fn test_train_mode() {
        let cmd = command_for("train");
        assert!(has_all(&cmd, &TRAIN_FLAGS));
        assert!(has_none(&cmd, &PREDICT_FLAGS));
        assert!(has_none(&cmd, &EVAL_FLAGS));
        assert_eq!(cmd.flag_value("train_file"), Some("/prep/download/squad/v1.1/train-v1.1.json"));
    }

    #[test]
    fn test_eval_mode() {
        let cmd = command_for("eval");
        assert!(has_none(&cmd, &TRAIN_FLAGS));
        assert!(has_all(&cmd, &PREDICT_FLAGS));
        assert!(has_all(&cmd, &EVAL_FLAGS));
    }

    #[test]
    fn test_prediction_mode() {
        let cmd = command_for("prediction");
        assert!(has_none(&cmd, &TRAIN_FLAGS));
        assert!(has_all(&cmd, &PREDICT_FLAGS));
        assert!(has_none(&cmd, &EVAL_FLAGS));
    }

    #[test]
    fn test_unknown_mode_falls_back_to_everything() {
        for mode in ["trian", "", "train eval"] {
            let cmd = command_for(mode);
            assert!(has_all(&cmd, &TRAIN_FLAGS), "{mode:?}");
            assert!(has_all(&cmd, &PREDICT_FLAGS), "{mode:?}");
            assert!(has_all(&cmd, &EVAL_FLAGS), "{mode:?}");
        }
    }

    #[test]
    fn test_strict_mode_rejects_unknown() {
        assert!(matches!(FinetuneMode::resolve("trian", true), Err(LaunchError::UnknownMode(_))));
        assert_eq!(FinetuneMode::resolve("eval", true).unwrap(), FinetuneMode::Eval);
        assert_eq!(
            FinetuneMode::select("predict"),
            ModeSelection::Fallback { requested: "predict".to_string() }
        );
    }

    #[test]
    fn test_single_gpu_runs_without_distributed_launcher() {
        let mut params = FinetuneParams::with_prep_dir(Path::new("/prep"));
        params.num_gpus = 1;
        let cmd = params.build_command(&LaunchEnv::default()).unwrap();
        assert!(!cmd.args.iter().any(|a| a == "torch.distributed.launch"));
        assert!(cmd.env.contains(&("CUDA_VISIBLE_DEVICES".to_string(), "0".to_string())));

        params.num_gpus = 8;
        let cmd = params.build_command(&LaunchEnv::default()).unwrap();
        assert!(cmd.args.iter().any(|a| a == "torch.distributed.launch"));
        assert_eq!(cmd.env_remove, vec!["CUDA_VISIBLE_DEVICES".to_string()]);
    }

    #[test]
    fn test_fp16_flag_once() {
        let cmd = command_for("train");
        assert_eq!(cmd.count_flag("fp16"), 1);
    }
}
