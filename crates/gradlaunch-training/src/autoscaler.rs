//! AdaScale / gradient-noise-scale configuration consumed by the pretraining
//! program. The file is only validated here; the program reads it itself.

use crate::error::{LaunchError, LaunchResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoscalerSection {
    pub adjust_gradients_for_accumulation: bool,
    pub enable_debug: bool,
    pub collect_tensorboard: bool,
    /// 0 means "use the launched world size".
    pub world_size: u32,
    pub scale: f64,
    pub update_interval: u32,
    pub precondition_gradients: bool,
    pub smoothing: Option<f64>,
    pub num_gradients_to_accumulate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaScaleSection {
    pub enabled: bool,
    pub aggressive_schedule: bool,
    pub max_grad_norm: f64,
    pub use_pt_adam: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientNoiseScaleSection {
    pub enabled: bool,
    pub batch_size_upper_limit: u64,
    pub scale_one_batch_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoscalerConfig {
    #[serde(skip)]
    pub path: PathBuf,
    pub autoscaler: AutoscalerSection,
    pub adascale: AdaScaleSection,
    pub gradient_noise_scale: GradientNoiseScaleSection,
}

impl AutoscalerConfig {
    pub fn load(path: &Path) -> LaunchResult<Self> {
        if !path.is_file() {
            let path = path.to_path_buf();
            return Err(LaunchError::MissingFile { what: "autoscaler config", path });
        }
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yaml::from_str(&content).map_err(|e| {
            LaunchError::InvalidAutoscalerConfig { path: path.to_path_buf(), reason: e.to_string() }
        })?;
        config.path = path.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    fn invalid(&self, reason: impl Into<String>) -> LaunchError {
        LaunchError::InvalidAutoscalerConfig { path: self.path.clone(), reason: reason.into() }
    }

    pub fn validate(&self) -> LaunchResult<()> {
        if self.autoscaler.num_gradients_to_accumulate < 1 {
            return Err(self.invalid("num_gradients_to_accumulate must be a positive integer"));
        }
        if self.autoscaler.update_interval > 1 {
            return Err(self.invalid("update_interval > 1 is not supported"));
        }
        if let Some(smoothing) = self.autoscaler.smoothing {
            if !(0.0..=1.0).contains(&smoothing) {
                return Err(self.invalid("smoothing must be in [0, 1]"));
            }
        }
        Ok(())
    }

    /// The batch size a phase launches with must stay under the ceiling,
    /// whether or not gradient noise scale tracking is enabled.
    pub fn check_batch_size(&self, global_batch_size: u64) -> LaunchResult<()> {
        let limit = self.gradient_noise_scale.batch_size_upper_limit;
        if global_batch_size > limit {
            return Err(self.invalid(format!(
                "global batch size {global_batch_size} exceeds batch_size_upper_limit {limit}"
            )));
        }
        Ok(())
    }
}
