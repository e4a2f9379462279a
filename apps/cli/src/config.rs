//! CLI configuration loading.

use anyhow::Context;
use gradlaunch_training::LauncherConfig;
use std::path::Path;

/// Load the launcher configuration.
///
/// An explicit `--config` file replaces discovery; otherwise the global
/// config is loaded and the local `.gradlaunchrc` is merged over it.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<LauncherConfig> {
    match explicit {
        Some(path) => LauncherConfig::load_from_file(path)
            .with_context(|| format!("Failed to load launcher config {}", path.display())),
        None => LauncherConfig::discover_and_load().context("Failed to load launcher config"),
    }
}
