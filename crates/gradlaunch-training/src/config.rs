//! Launcher configuration file support.
//!
//! Configuration precedence:
//! 1. Positional arguments (handled by the CLI)
//! 2. Environment variables
//! 3. Local config file (./.gradlaunchrc)
//! 4. Global config file (~/.gradlaunch/config.toml)
//! 5. Defaults

use crate::distributed::Interpreter;
use crate::env::TransportConfig;
use crate::error::{LaunchError, LaunchResult};
use crate::pretrain::PhaseFailurePolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Python interpreter used to start every program
    #[serde(default)]
    pub python: Option<String>,

    /// Module run with `python -m` for multi-GPU jobs
    #[serde(default)]
    pub launcher_module: Option<String>,

    /// Transport environment exported to the child
    #[serde(default)]
    pub transport: Option<TransportConfig>,

    /// Pretraining behavior when phase 1 fails
    #[serde(default)]
    pub phase1_failure: Option<PhaseFailurePolicy>,

    /// Reject unknown fine-tuning modes instead of falling back
    #[serde(default)]
    pub strict_mode: bool,

    /// Log level
    #[serde(default)]
    pub log_level: Option<String>,
}

impl LauncherConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> LaunchResult<Self> {
        if !path.exists() {
            let path = path.to_path_buf();
            return Err(LaunchError::MissingFile { what: "launcher config", path });
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| LaunchError::InvalidConfig(format!("{}: {}", path.display(), e)))
    }

    /// Get default global configuration file path.
    pub fn default_global_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".gradlaunch")
            .join("config.toml")
    }

    /// Get default local configuration file path.
    pub fn default_local_path() -> PathBuf {
        PathBuf::from(".gradlaunchrc")
    }

    /// Load the global config, then the local one on top of it.
    ///
    /// Unreadable files are skipped; a file that exists but fails to parse is an error.
    pub fn discover_and_load() -> LaunchResult<Self> {
        let mut config = Self::default();
        for path in [Self::default_global_path(), Self::default_local_path()] {
            match Self::load_from_file(&path) {
                Ok(found) => config.merge(&found),
                Err(LaunchError::MissingFile { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(config)
    }

    /// Values from `other` override values in `self` if they are set.
    pub fn merge(&mut self, other: &Self) {
        if let Some(ref python) = other.python {
            self.python = Some(python.clone());
        }
        if let Some(ref module) = other.launcher_module {
            self.launcher_module = Some(module.clone());
        }
        if let Some(ref transport) = other.transport {
            self.transport = Some(transport.clone());
        }
        if let Some(policy) = other.phase1_failure {
            self.phase1_failure = Some(policy);
        }
        if other.strict_mode {
            self.strict_mode = true;
        }
        if let Some(ref log_level) = other.log_level {
            self.log_level = Some(log_level.clone());
        }
    }

    /// Interpreter settings with `python_override` (from `GRADLAUNCH_PYTHON`) taking precedence.
    #[must_use]
    pub fn interpreter(&self, python_override: Option<String>) -> Interpreter {
        let defaults = Interpreter::default();
        Interpreter {
            python: python_override.or_else(|| self.python.clone()).unwrap_or(defaults.python),
            launcher_module: self.launcher_module.clone().unwrap_or(defaults.launcher_module),
        }
    }

    #[must_use]
    pub fn transport(&self) -> TransportConfig {
        self.transport.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_and_merge() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
python = "/opt/conda/bin/python"
phase1_failure = "abort"

[transport]
fi_provider = "tcp"
rdmav_fork_safe = false
"#,
        )
        .unwrap();

        let loaded = LauncherConfig::load_from_file(&path).unwrap();
        let mut config =
            LauncherConfig { python: Some("python3".to_string()), ..Default::default() };
        config.merge(&loaded);

        assert_eq!(config.python.as_deref(), Some("/opt/conda/bin/python"));
        assert_eq!(config.phase1_failure, Some(PhaseFailurePolicy::Abort));
        let transport = config.transport();
        assert_eq!(transport.fi_provider.as_deref(), Some("tcp"));
        assert!(!transport.rdmav_fork_safe);
        // unspecified transport fields keep their defaults
        assert_eq!(transport.fi_efa_tx_min_credits, Some(64));
    }

    #[test]
    fn test_interpreter_override() {
        let config =
            LauncherConfig { python: Some("python3.10".to_string()), ..Default::default() };
        assert_eq!(config.interpreter(None).python, "python3.10");
        assert_eq!(config.interpreter(Some("echo".to_string())).python, "echo");
        assert_eq!(config.interpreter(None).launcher_module, "torch.distributed.launch");
    }

    #[test]
    fn test_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.toml");
        std::fs::write(&path, "python = [").unwrap();
        let result = LauncherConfig::load_from_file(&path);
        assert!(matches!(result, Err(LaunchError::InvalidConfig(_))));
    }
}
