//! Filesystem checks run before anything is launched.

use crate::error::{LaunchError, LaunchResult};
use std::path::Path;
use tracing::warn;

/// Missing dataset directories are not fatal; the training program reports them later.
pub fn warn_if_missing_dataset(dir: &Path) -> bool {
    if dir.is_dir() {
        return true;
    }
    warn!("Warning! {} directory missing. Training cannot start", dir.display());
    false
}

pub fn require_file(what: &'static str, path: &Path) -> LaunchResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(LaunchError::MissingFile { what, path: path.to_path_buf() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_dataset_only_warns() {
        let temp = TempDir::new().unwrap();
        assert!(warn_if_missing_dataset(temp.path()));
        assert!(!warn_if_missing_dataset(&temp.path().join("hdf5")));
    }

    #[test]
    fn test_require_file() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("bert_config.json");
        let err = require_file("BERT configuration file", &config).unwrap_err();
        assert!(err.to_string().contains("bert_config.json"));

        std::fs::write(&config, "{}").unwrap();
        assert!(require_file("BERT configuration file", &config).is_ok());
        // a directory does not satisfy a file requirement
        assert!(require_file("BERT configuration file", temp.path()).is_err());
    }
}
