//! Two-phase language-model pretraining launcher.
//!
//! Phase 1 trains on 128-token sequences, phase 2 on 512-token sequences and
//! always resumes from the checkpoint phase 1 left in the checkpoint
//! directory. Phases run strictly one after the other.

use crate::autoscaler::AutoscalerConfig;
use crate::command::{CommandBuilder, FlagSchema, LaunchCommand};
use crate::error::{LaunchError, LaunchResult};
use crate::launcher::{LaunchEnv, LaunchSession, Launcher};
use crate::layout::{log_tag, ResultsLayout};
use crate::params::{global_batch_size, LaunchOptions, OptimizerParams, Precision};
use crate::preflight;
use crate::runner::ExitOutcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

static RUN_PRETRAINING: FlagSchema = FlagSchema {
    program: "run_pretraining.py",
    flags: &[
        "input_dir",
        "output_dir",
        "config_file",
        "bert_model",
        "train_batch_size",
        "max_seq_length",
        "max_predictions_per_seq",
        "max_steps",
        "warmup_proportion",
        "num_steps_per_checkpoint",
        "learning_rate",
        "seed",
        "fp16",
        "gradient_accumulation_steps",
        "resume_from_checkpoint",
        "allreduce_post_accumulation",
        "allreduce_post_accumulation_fp16",
        "sampling_with_replacement",
        "init_checkpoint",
        "optimizer",
        "weight_decay",
        "beta1",
        "beta2",
        "autoscaler_cfg_path",
        "do_train",
        "phase2",
        "phase1_end_step",
        "json-summary",
    ],
    overrides: &[],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    One,
    Two,
}

impl Phase {
    #[must_use]
    pub fn max_seq_length(self) -> u32 {
        match self {
            Self::One => 128,
            Self::Two => 512,
        }
    }

    #[must_use]
    pub fn max_predictions_per_seq(self) -> u32 {
        match self {
            Self::One => 20,
            Self::Two => 80,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::One => "phase1",
            Self::Two => "phase2",
        }
    }
}

/// What to do when phase 1 exits non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseFailurePolicy {
    /// Stop and report phase 1's exit code.
    Abort,
    /// Run phase 2 anyway; it may resume from a partial checkpoint.
    #[default]
    Continue,
}

impl FromStr for PhaseFailurePolicy {
    type Err = LaunchError;

    fn from_str(s: &str) -> LaunchResult<Self> {
        match s {
            "abort" => Ok(Self::Abort),
            "continue" => Ok(Self::Continue),
            other => Err(LaunchError::InvalidConfig(format!(
                "unknown phase 1 failure policy {other:?} (expected abort or continue)"
            ))),
        }
    }
}

/// Hyperparameters that differ between the two phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseParams {
    pub train_batch_size: u64,
    pub learning_rate: f64,
    pub warmup_proportion: f64,
    pub train_steps: u64,
    pub gradient_accumulation_steps: u32,
    pub data_dir: PathBuf,
}

impl PhaseParams {
    fn validate(&self, phase: Phase) -> LaunchResult<()> {
        let fail =
            |what: &str| Err(LaunchError::InvalidCommand(format!("{}: {what}", phase.label())));
        if self.train_batch_size == 0 {
            return fail("train_batch_size must be >= 1");
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return fail("learning_rate must be > 0");
        }
        if !(0.0..=1.0).contains(&self.warmup_proportion) {
            return fail("warmup_proportion must be in [0, 1]");
        }
        if self.train_steps == 0 {
            return fail("train_steps must be >= 1");
        }
        if self.gradient_accumulation_steps == 0 {
            return fail("gradient_accumulation_steps must be >= 1");
        }
        Ok(())
    }
}

pub const PHASE1_DATASET: &str = concat!(
    "hdf5_lower_case_1_seq_len_128_max_pred_20_masked_lm_prob_0.15_random_seed_12345_dupe_factor_5",
    "/books_wiki_en_corpus"
);
pub const PHASE2_DATASET: &str = concat!(
    "hdf5_lower_case_1_seq_len_512_max_pred_80_masked_lm_prob_0.15_random_seed_12345_dupe_factor_5",
    "/books_wiki_en_corpus"
);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PretrainParams {
    pub precision: Precision,
    pub num_gpus: u32,
    pub save_checkpoint_steps: u64,
    pub create_logfile: bool,
    pub seed: u64,
    pub job_name: String,
    pub options: LaunchOptions,
    pub phase1: PhaseParams,
    pub phase2: PhaseParams,
    pub code_dir: PathBuf,
    pub bert_config: PathBuf,
    pub bert_model: String,
    pub optimizer: OptimizerParams,
    pub autoscaler_cfg: Option<PathBuf>,
    pub on_phase1_failure: PhaseFailurePolicy,
}

impl PretrainParams {
    /// Defaults for a given data preparation root.
    #[must_use]
    pub fn with_prep_dir(prep_dir: &Path) -> Self {
        let code_dir = PathBuf::from("/workspace/bert");
        Self {
            precision: Precision::Fp16,
            num_gpus: 8,
            save_checkpoint_steps: 200,
            create_logfile: true,
            seed: 12439,
            job_name: "bert_lamb_pretraining".to_string(),
            options: LaunchOptions {
                accumulate_gradients: true,
                allreduce_post_accumulation: true,
                allreduce_post_accumulation_fp16: true,
                ..LaunchOptions::default()
            },
            phase1: PhaseParams {
                train_batch_size: 8192,
                learning_rate: 6e-3,
                warmup_proportion: 0.2843,
                train_steps: 7038,
                gradient_accumulation_steps: 128,
                data_dir: prep_dir.join(PHASE1_DATASET),
            },
            phase2: PhaseParams {
                train_batch_size: 4096,
                learning_rate: 4e-3,
                warmup_proportion: 0.128,
                train_steps: 1563,
                gradient_accumulation_steps: 512,
                data_dir: prep_dir.join(PHASE2_DATASET),
            },
            bert_config: code_dir.join("bert_config.json"),
            code_dir,
            bert_model: "bert-large-uncased".to_string(),
            optimizer: OptimizerParams::default(),
            autoscaler_cfg: None,
            on_phase1_failure: PhaseFailurePolicy::default(),
        }
    }

    #[must_use]
    pub fn results_layout(&self) -> ResultsLayout {
        ResultsLayout::new(self.code_dir.join("results"))
    }

    #[must_use]
    pub fn phase(&self, phase: Phase) -> &PhaseParams {
        match phase {
            Phase::One => &self.phase1,
            Phase::Two => &self.phase2,
        }
    }

    pub fn global_batch_size(&self, phase: Phase, env: &LaunchEnv) -> LaunchResult<u64> {
        global_batch_size(self.phase(phase).train_batch_size, self.num_gpus, env.topology.nnodes)
    }

    pub fn validate(&self) -> LaunchResult<()> {
        if self.num_gpus == 0 {
            return Err(LaunchError::InvalidCommand("num_gpus must be >= 1".to_string()));
        }
        if self.job_name.trim().is_empty() {
            return Err(LaunchError::InvalidCommand("job_name is required".to_string()));
        }
        self.phase1.validate(Phase::One)?;
        self.phase2.validate(Phase::Two)?;
        self.optimizer.validate()
    }

    /// Assemble the command for one phase, writing checkpoints to `checkpoints_dir`.
    pub fn build_command(
        &self,
        phase: Phase,
        checkpoints_dir: &Path,
        env: &LaunchEnv,
    ) -> LaunchResult<LaunchCommand> {
        self.validate()?;
        let params = self.phase(phase);
        let opts = &self.options;
        let is_phase2 = phase == Phase::Two;
        let layout = self.results_layout();

        let args = CommandBuilder::new(&RUN_PRETRAINING)
            .value("input_dir", params.data_dir.display())
            .value("output_dir", checkpoints_dir.display())
            .value("config_file", self.bert_config.display())
            .value("bert_model", &self.bert_model)
            .value("train_batch_size", params.train_batch_size)
            .value("max_seq_length", phase.max_seq_length())
            .value("max_predictions_per_seq", phase.max_predictions_per_seq())
            .value("max_steps", params.train_steps)
            .value("warmup_proportion", params.warmup_proportion)
            .value("num_steps_per_checkpoint", self.save_checkpoint_steps)
            .value("learning_rate", params.learning_rate)
            .value("seed", self.seed)
            .switch_if(self.precision.is_half(), "fp16")
            .value_if(
                opts.accumulate_gradients,
                "gradient_accumulation_steps",
                params.gradient_accumulation_steps,
            )
            .switch_if(is_phase2 || opts.resume_training, "resume_from_checkpoint")
            .switch_if(opts.allreduce_post_accumulation, "allreduce_post_accumulation")
            .switch_if(opts.allreduce_post_accumulation_fp16, "allreduce_post_accumulation_fp16")
            .switch_if(opts.sampling_with_replacement, "sampling_with_replacement")
            .value_opt(
                "init_checkpoint",
                opts.init_checkpoint.as_ref().filter(|_| !is_phase2).map(|p| p.display()),
            )
            .value("optimizer", &self.optimizer.name)
            .value("weight_decay", self.optimizer.weight_decay)
            .value("beta1", self.optimizer.beta1)
            .value("beta2", self.optimizer.beta2)
            .value_opt("autoscaler_cfg_path", self.autoscaler_cfg.as_ref().map(|p| p.display()))
            .switch("do_train")
            .switch_if(is_phase2, "phase2")
            .value_if(is_phase2, "phase1_end_step", self.phase1.train_steps)
            .value("json-summary", layout.json_summary_path().display())
            .build()?;

        let script = self.code_dir.join("run_pretraining.py");
        Ok(env
            .interpreter
            .distributed(self.num_gpus, &env.topology, &script.display().to_string())?
            .args(args)
            .env(env.transport.to_env()))
    }
}

#[derive(Debug, Clone)]
pub struct PretrainLauncher {
    pub params: PretrainParams,
}

impl PretrainLauncher {
    #[must_use]
    pub fn new(params: PretrainParams) -> Self {
        Self { params }
    }

    fn job_label(&self, phase: Phase) -> String {
        format!("{} {}", self.params.job_name, phase.label())
    }
}

#[async_trait]
impl Launcher for PretrainLauncher {
    fn id(&self) -> &'static str {
        "pretrain"
    }

    fn plan(&self, env: &LaunchEnv) -> LaunchResult<Vec<LaunchCommand>> {
        let layout = self.params.results_layout();
        [Phase::One, Phase::Two]
            .into_iter()
            .map(|phase| self.params.build_command(phase, layout.checkpoints_dir(), env))
            .collect()
    }

    async fn launch(&self, session: &LaunchSession<'_>) -> LaunchResult<ExitOutcome> {
        let params = &self.params;
        params.validate()?;
        let phase1_gbs = params.global_batch_size(Phase::One, session.env)?;
        let phase2_gbs = params.global_batch_size(Phase::Two, session.env)?;

        let mut layout = params.results_layout();
        preflight::warn_if_missing_dataset(&params.phase1.data_dir);
        layout.require_results_dir()?;
        preflight::require_file("BERT configuration file", &params.bert_config)?;
        if let Some(path) = &params.autoscaler_cfg {
            let autoscaler = AutoscalerConfig::load(path)?;
            for gbs in [phase1_gbs, phase2_gbs] {
                autoscaler.check_batch_size(gbs)?;
            }
        }
        if session.executes() {
            layout.ensure_checkpoints_dir();
        }

        // Both commands are assembled up front so configuration errors surface before phase 1 runs.
        let phase1 = params.build_command(Phase::One, layout.checkpoints_dir(), session.env)?;
        let phase2 = params.build_command(Phase::Two, layout.checkpoints_dir(), session.env)?;

        let log_for = |phase: Phase, gbs: u64| {
            params.create_logfile.then(|| {
                let prefix = format!("pyt_bert_pretraining_{}", phase.label());
                let tag = log_tag(&prefix, params.precision, gbs);
                layout.log_file(&params.job_name, &tag, session.started_at)
            })
        };

        let phase1_log = log_for(Phase::One, phase1_gbs);
        let outcome =
            session.execute(&self.job_label(Phase::One), &phase1, phase1_log.as_ref()).await?;
        if !outcome.success() {
            match params.on_phase1_failure {
                PhaseFailurePolicy::Abort => {
                    warn!(
                        exit_code = outcome.code(),
                        "phase 1 failed, not starting phase 2 (on_phase1_failure=abort)"
                    );
                    return Ok(outcome);
                }
                PhaseFailurePolicy::Continue => {
                    warn!(
                        exit_code = outcome.code(),
                        "phase 1 failed, starting phase 2 anyway (on_phase1_failure=continue)"
                    );
                }
            }
        }

        info!("Start phase 2");
        if session.executes() {
            preflight::warn_if_missing_dataset(&params.phase2.data_dir);
        }
        let phase2_log = log_for(Phase::Two, phase2_gbs);
        session.execute(&self.job_label(Phase::Two), &phase2, phase2_log.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::LaunchCommand;
    use crate::layout::LogFile;
    use crate::progress::NullEventSink;
    use crate::runner::Runner;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records commands and answers with scripted exit codes.
    struct ScriptedRunner {
        codes: Mutex<Vec<i32>>,
        seen: Mutex<Vec<LaunchCommand>>,
    }

    impl ScriptedRunner {
        fn new(codes: &[i32]) -> Self {
            Self {
                codes: Mutex::new(codes.iter().rev().copied().collect()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Runner for ScriptedRunner {
        async fn run(
            &self,
            command: &LaunchCommand,
            _log: Option<&LogFile>,
        ) -> LaunchResult<ExitOutcome> {
            self.seen.lock().unwrap().push(command.clone());
            let code = self.codes.lock().unwrap().pop().unwrap_or(0);
            Ok(ExitOutcome::from_code(code))
        }
    }

    fn fixture(temp: &TempDir) -> PretrainParams {
        let code_dir = temp.path().join("bert");
        std::fs::create_dir_all(code_dir.join("results")).unwrap();
        std::fs::write(code_dir.join("bert_config.json"), "{}").unwrap();
        let mut params = PretrainParams::with_prep_dir(&temp.path().join("prep"));
        params.bert_config = code_dir.join("bert_config.json");
        params.code_dir = code_dir;
        params.create_logfile = false;
        params
    }

    fn checkpoints() -> PathBuf {
        PathBuf::from("/ckpt")
    }

    #[test]
    fn test_phase2_always_resumes() {
        let temp = TempDir::new().unwrap();
        let mut params = fixture(&temp);
        params.options.resume_training = false;
        let env = LaunchEnv::default();

        let phase1 = params.build_command(Phase::One, &checkpoints(), &env).unwrap();
        let phase2 = params.build_command(Phase::Two, &checkpoints(), &env).unwrap();
        assert!(!phase1.has_flag("resume_from_checkpoint"));
        assert!(!phase1.has_flag("phase2"));
        assert_eq!(phase2.count_flag("resume_from_checkpoint"), 1);
        assert_eq!(phase2.count_flag("phase2"), 1);
        assert_eq!(phase2.flag_value("phase1_end_step"), Some("7038"));
        assert_eq!(phase2.flag_value("max_seq_length"), Some("512"));
        assert_eq!(phase2.flag_value("max_predictions_per_seq"), Some("80"));
    }

    #[test]
    fn test_toggles_map_to_flags() {
        let temp = TempDir::new().unwrap();
        let mut params = fixture(&temp);
        let env = LaunchEnv::default();
        params.options =
            LaunchOptions::from_args("true", "true", "false", "nope", "true", "/ckpt/init.pt");

        let cmd = params.build_command(Phase::One, &checkpoints(), &env).unwrap();
        assert_eq!(cmd.flag_value("gradient_accumulation_steps"), Some("128"));
        assert!(cmd.has_flag("resume_from_checkpoint"));
        assert!(!cmd.has_flag("allreduce_post_accumulation"));
        assert!(!cmd.has_flag("allreduce_post_accumulation_fp16"));
        assert!(cmd.has_flag("sampling_with_replacement"));
        assert_eq!(cmd.flag_value("init_checkpoint"), Some("/ckpt/init.pt"));

        let phase2 = params.build_command(Phase::Two, &checkpoints(), &env).unwrap();
        assert_eq!(phase2.flag_value("gradient_accumulation_steps"), Some("512"));
        assert!(!phase2.has_flag("init_checkpoint"));
    }

    #[test]
    fn test_precision_flag() {
        let temp = TempDir::new().unwrap();
        let mut params = fixture(&temp);
        let env = LaunchEnv::default();
        let phase1 = |params: &PretrainParams| {
            params.build_command(Phase::One, &checkpoints(), &env).unwrap()
        };
        assert_eq!(phase1(&params).count_flag("fp16"), 1);
        for precision in [Precision::Fp32, Precision::Tf32] {
            params.precision = precision;
            assert!(!phase1(&params).has_flag("fp16"));
        }
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("abort".parse::<PhaseFailurePolicy>().unwrap(), PhaseFailurePolicy::Abort);
        assert_eq!("continue".parse::<PhaseFailurePolicy>().unwrap(), PhaseFailurePolicy::Continue);
        assert!("retry".parse::<PhaseFailurePolicy>().is_err());
    }

    #[tokio::test]
    async fn test_phase1_failure_continues_by_default() {
        let temp = TempDir::new().unwrap();
        let params = fixture(&temp);
        let env = LaunchEnv::default();
        let runner = ScriptedRunner::new(&[1, 0]);
        let session = LaunchSession::new(&env, &runner, &NullEventSink);

        let outcome = PretrainLauncher::new(params).launch(&session).await.unwrap();
        assert!(outcome.success());
        let seen = runner.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].has_flag("phase2"));
        assert!(seen[1].has_flag("resume_from_checkpoint"));
    }

    #[tokio::test]
    async fn test_batch_size_overflow_launches_nothing() {
        let temp = TempDir::new().unwrap();
        let mut params = fixture(&temp);
        params.phase1.train_batch_size = 1 << 62;
        let env = LaunchEnv::default();
        let runner = ScriptedRunner::new(&[]);
        let session = LaunchSession::new(&env, &runner, &NullEventSink);

        let err = PretrainLauncher::new(params).launch(&session).await.unwrap_err();
        assert!(matches!(err, LaunchError::InvalidCommand(_)));
        assert!(runner.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_phase1_failure_aborts_when_asked() {
        let temp = TempDir::new().unwrap();
        let mut params = fixture(&temp);
        params.on_phase1_failure = PhaseFailurePolicy::Abort;
        let env = LaunchEnv::default();
        let runner = ScriptedRunner::new(&[3]);
        let session = LaunchSession::new(&env, &runner, &NullEventSink);

        let outcome = PretrainLauncher::new(params).launch(&session).await.unwrap();
        assert_eq!(outcome.code(), 3);
        assert_eq!(runner.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_results_dir_launches_nothing() {
        let temp = TempDir::new().unwrap();
        let mut params = fixture(&temp);
        params.code_dir = temp.path().join("elsewhere");
        let env = LaunchEnv::default();
        let runner = ScriptedRunner::new(&[]);
        let session = LaunchSession::new(&env, &runner, &NullEventSink);

        let err = PretrainLauncher::new(params).launch(&session).await.unwrap_err();
        assert!(err.to_string().contains("elsewhere"));
        assert!(runner.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_launch_creates_checkpoint_dir() {
        let temp = TempDir::new().unwrap();
        let params = fixture(&temp);
        let checkpoints = params.results_layout().checkpoints_dir().to_path_buf();
        let env = LaunchEnv::default();
        let runner = ScriptedRunner::new(&[0, 0]);
        let session = LaunchSession::new(&env, &runner, &NullEventSink);

        PretrainLauncher::new(params).launch(&session).await.unwrap();
        assert!(checkpoints.is_dir());
        let seen = runner.seen.lock().unwrap();
        assert_eq!(seen[0].flag_value("output_dir"), Some(checkpoints.to_str().unwrap()));
    }
}
