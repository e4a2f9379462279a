use crate::error::{LaunchError, LaunchResult};
use crate::params::Precision;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Filesystem layout of one job's results directory.
///
/// ```text
/// <results>/
///   checkpoints/
///   dllogger.json
///   <job>.<tag>.<yymmddHHMMSS>.log
/// ```
#[derive(Debug, Clone)]
pub struct ResultsLayout {
    results_dir: PathBuf,
    checkpoints_dir: PathBuf,
}

impl ResultsLayout {
    #[must_use]
    pub fn new(results_dir: PathBuf) -> Self {
        let checkpoints_dir = results_dir.join("checkpoints");
        Self { results_dir, checkpoints_dir }
    }

    #[must_use]
    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    #[must_use]
    pub fn checkpoints_dir(&self) -> &Path {
        &self.checkpoints_dir
    }

    #[must_use]
    pub fn json_summary_path(&self) -> PathBuf {
        self.results_dir.join("dllogger.json")
    }

    /// Fail if the results directory itself is missing.
    pub fn require_results_dir(&self) -> LaunchResult<()> {
        if self.results_dir.is_dir() {
            Ok(())
        } else {
            Err(LaunchError::MissingDirectory(self.results_dir.clone()))
        }
    }

    /// Create the checkpoint directory, falling back to the results directory.
    pub fn ensure_checkpoints_dir(&mut self) {
        if let Err(e) = std::fs::create_dir_all(&self.checkpoints_dir) {
            warn!(
                "{} directory missing ({e}). Checkpoints will be written to {} instead.",
                self.checkpoints_dir.display(),
                self.results_dir.display()
            );
            self.checkpoints_dir = self.results_dir.clone();
        }
    }

    #[must_use]
    pub fn log_file(&self, job_name: &str, tag: &str, now: DateTime<Local>) -> LogFile {
        LogFile::new(&self.results_dir, job_name, tag, now)
    }
}

/// Terminal-mirrored log of a launched process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub path: PathBuf,
}

impl LogFile {
    #[must_use]
    pub fn new(dir: &Path, job_name: &str, tag: &str, now: DateTime<Local>) -> Self {
        let stamp = now.format("%y%m%d%H%M%S");
        Self { path: dir.join(format!("{job_name}.{tag}.{stamp}.log")) }
    }

    pub fn create_parent(&self) -> LaunchResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        debug!(path = %self.path.display(), "log file parent ready");
        Ok(())
    }
}

/// `<prefix>_<precision>_gbs<global batch size>`
#[must_use]
pub fn log_tag(prefix: &str, precision: Precision, global_batch_size: u64) -> String {
    format!("{prefix}_{precision}_gbs{global_batch_size}")
}
