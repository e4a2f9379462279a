use std::path::PathBuf;
use thiserror::Error;

pub type LaunchResult<T> = std::result::Result<T, LaunchError>;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("{} directory missing.", .0.display())]
    MissingDirectory(PathBuf),

    #[error("{what} not found at {}", .path.display())]
    MissingFile { what: &'static str, path: PathBuf },

    #[error("Unknown <precision> argument: {0} (expected fp16, fp32 or tf32)")]
    UnknownPrecision(String),

    #[error("Unknown <mode> argument: {0} (expected train, eval, prediction or \"train eval\")")]
    UnknownMode(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("invalid launcher config: {0}")]
    InvalidConfig(String),

    #[error("invalid autoscaler config {}: {reason}", .path.display())]
    InvalidAutoscalerConfig { path: PathBuf, reason: String },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LaunchError {
    /// Process exit code the CLI reports for this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UnknownPrecision(_) | Self::UnknownMode(_) => 2,
            Self::Spawn { .. } => 127,
            _ => 1,
        }
    }

    /// Configuration errors are detected before anything is launched.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingDirectory(_)
                | Self::MissingFile { .. }
                | Self::UnknownPrecision(_)
                | Self::UnknownMode(_)
                | Self::InvalidCommand(_)
                | Self::InvalidConfig(_)
                | Self::InvalidAutoscalerConfig { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_directory_message_names_path() {
        let err = LaunchError::MissingDirectory(PathBuf::from("/workspace/bert/results"));
        assert!(err.to_string().contains("/workspace/bert/results"));
        assert_eq!(err.exit_code(), 1);
        assert!(err.is_configuration());
    }

    #[test]
    fn test_precision_error_uses_distinct_exit_code() {
        let err = LaunchError::UnknownPrecision("bf16".to_string());
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("bf16"));
    }
}
