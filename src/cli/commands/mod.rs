pub mod build;
pub mod config;
pub mod dev;
pub mod display;
pub mod init;
pub mod install;
pub mod setup;

use crate::config::{AppConfig, LectureEnvironmentConfig};
use crate::environment::EnvironmentManager;
use crate::error::Result;
use crate::utils::expand_path;

/// Manager for the lecture at `path`, configured from the user config.
pub(crate) fn manager(config: &AppConfig, path: &str, system_tool: bool) -> EnvironmentManager {
    let path = expand_path(path);
    // Absolute first so "." still yields the directory name as lecture id.
    let path = std::path::absolute(&path).unwrap_or(path);
    let lecture = LectureEnvironmentConfig::new(path).with_system_tool(system_tool);
    EnvironmentManager::with_settings(lecture, config.clone())
}

/// Map a result record's `success` to the process exit status.
pub(crate) fn finish(success: bool, operation: &str) -> Result<()> {
    if success {
        Ok(())
    } else {
        Err(anyhow::anyhow!("{} failed", operation).into())
    }
}
