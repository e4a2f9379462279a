//! Shared hyperparameter primitives: precision, boolean toggles, the
//! enumerated option set and the global batch size computation.

use crate::error::{LaunchError, LaunchResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Numeric representation used by the external training program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    Fp16,
    Fp32,
    Tf32,
}

impl Precision {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fp16 => "fp16",
            Self::Fp32 => "fp32",
            Self::Tf32 => "tf32",
        }
    }

    /// Only fp16 changes the command line; fp32 and tf32 are the program default.
    #[must_use]
    pub fn is_half(self) -> bool {
        self == Self::Fp16
    }
}

impl FromStr for Precision {
    type Err = LaunchError;

    fn from_str(s: &str) -> LaunchResult<Self> {
        match s {
            "fp16" => Ok(Self::Fp16),
            "fp32" => Ok(Self::Fp32),
            "tf32" => Ok(Self::Tf32),
            other => Err(LaunchError::UnknownPrecision(other.to_string())),
        }
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a boolean switch argument. Only the literal `"true"` enables it.
#[must_use]
pub fn toggle(arg: &str) -> bool {
    arg == "true"
}

/// Parse an optional path argument where `"None"` or an empty string means absent.
#[must_use]
pub fn optional_path(arg: &str) -> Option<PathBuf> {
    match arg.trim() {
        "" | "None" => None,
        path => Some(PathBuf::from(path)),
    }
}

/// Per-device batch size multiplied by the number of participating devices.
pub fn global_batch_size(per_device: u64, gpus_per_node: u32, nnodes: u32) -> LaunchResult<u64> {
    per_device
        .checked_mul(u64::from(gpus_per_node))
        .and_then(|n| n.checked_mul(u64::from(nnodes.max(1))))
        .ok_or_else(|| {
            LaunchError::InvalidCommand(format!(
                "global batch size overflows: {per_device} x {gpus_per_node} GPUs x {nnodes} nodes"
            ))
        })
}

/// Optional behaviors toggled independently on the pretraining command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchOptions {
    pub accumulate_gradients: bool,
    pub resume_training: bool,
    pub allreduce_post_accumulation: bool,
    pub allreduce_post_accumulation_fp16: bool,
    pub sampling_with_replacement: bool,
    pub init_checkpoint: Option<PathBuf>,
}

impl LaunchOptions {
    /// Build the option set from raw positional strings.
    #[must_use]
    pub fn from_args(
        accumulate_gradients: &str,
        resume_training: &str,
        allreduce_post_accumulation: &str,
        allreduce_post_accumulation_fp16: &str,
        sampling_with_replacement: &str,
        init_checkpoint: &str,
    ) -> Self {
        Self {
            accumulate_gradients: toggle(accumulate_gradients),
            resume_training: toggle(resume_training),
            allreduce_post_accumulation: toggle(allreduce_post_accumulation),
            allreduce_post_accumulation_fp16: toggle(allreduce_post_accumulation_fp16),
            sampling_with_replacement: toggle(sampling_with_replacement),
            init_checkpoint: optional_path(init_checkpoint),
        }
    }
}

/// Optimizer coefficients forwarded to the external program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerParams {
    pub name: String,
    pub weight_decay: f64,
    pub beta1: f64,
    pub beta2: f64,
}

impl Default for OptimizerParams {
    fn default() -> Self {
        Self { name: "lamb".to_string(), weight_decay: 0.01, beta1: 0.9, beta2: 0.999 }
    }
}

impl OptimizerParams {
    pub fn validate(&self) -> LaunchResult<()> {
        if self.name.trim().is_empty() {
            return Err(LaunchError::InvalidCommand("optimizer name is required".to_string()));
        }
        if !self.weight_decay.is_finite() || self.weight_decay < 0.0 {
            return Err(LaunchError::InvalidCommand("weight_decay must be >= 0".to_string()));
        }
        for (name, beta) in [("beta1", self.beta1), ("beta2", self.beta2)] {
            if !(0.0..1.0).contains(&beta) {
                return Err(LaunchError::InvalidCommand(format!("{name} must be in [0, 1)")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precision_parse() {
        assert_eq!("fp16".parse::<Precision>().unwrap(), Precision::Fp16);
        assert_eq!("tf32".parse::<Precision>().unwrap(), Precision::Tf32);
        assert!(matches!("FP16".parse::<Precision>(), Err(LaunchError::UnknownPrecision(_))));
        assert!("bf16".parse::<Precision>().is_err());
    }

    #[test]
    fn test_toggle_only_accepts_literal_true() {
        assert!(toggle("true"));
        for value in ["True", "TRUE", "1", "yes", "false", "", " true"] {
            assert!(!toggle(value), "{value:?} must not enable the switch");
        }
    }

    #[test]
    fn test_optional_path() {
        assert_eq!(optional_path("None"), None);
        assert_eq!(optional_path(""), None);
        assert_eq!(optional_path("/ckpt/model.pt"), Some(PathBuf::from("/ckpt/model.pt")));
    }

    #[test]
    fn test_global_batch_size() {
        assert_eq!(global_batch_size(1024, 8, 1).unwrap(), 8192);
        assert_eq!(global_batch_size(12, 8, 4).unwrap(), 384);
        // zero nodes means the topology was not provided
        assert_eq!(global_batch_size(4, 8, 0).unwrap(), 32);
    }

    #[test]
    fn test_global_batch_size_overflow() {
        let err = global_batch_size(u64::MAX / 4, 8, 1).unwrap_err();
        assert!(matches!(err, LaunchError::InvalidCommand(_)));
        assert!(err.to_string().contains("overflows"));
        assert!(global_batch_size(u64::MAX / 8, 8, 2).is_err());
        assert_eq!(global_batch_size(u64::MAX / 8, 8, 1).unwrap(), u64::MAX / 8 * 8);
    }

    #[test]
    fn test_launch_options_from_args() {
        let opts = LaunchOptions::from_args("true", "false", "true", "yes", "true", "None");
        assert!(opts.accumulate_gradients);
        assert!(!opts.resume_training);
        assert!(opts.allreduce_post_accumulation);
        assert!(!opts.allreduce_post_accumulation_fp16);
        assert!(opts.sampling_with_replacement);
        assert!(opts.init_checkpoint.is_none());
    }

    #[test]
    fn test_optimizer_validate() {
        assert!(OptimizerParams::default().validate().is_ok());
        let bad = OptimizerParams { beta2: 1.0, ..OptimizerParams::default() };
        assert!(bad.validate().is_err());
    }
}
