//! Dependency installation for a lecture's manifest.

use std::path::Path;

use super::process::{run_captured, RunLimits};
use super::toolchain::Toolchain;
use super::types::{InstallMode, InstallResult, TOOL_CLIENT_PACKAGE, TOOL_RUNTIME_PACKAGE};
use crate::error::{LecternError, Result};

/// Number of trailing output lines kept as result messages.
const OUTPUT_TAIL_LINES: usize = 10;

/// Runs the package manager's install for one lecture directory.
pub struct DependencyInstaller<'a> {
    toolchain: &'a Toolchain,
    lecture_path: &'a Path,
    manifest_path: &'a Path,
    limits: RunLimits,
}

impl<'a> DependencyInstaller<'a> {
    pub fn new(
        toolchain: &'a Toolchain,
        lecture_path: &'a Path,
        manifest_path: &'a Path,
        limits: RunLimits,
    ) -> Self {
        Self {
            toolchain,
            lecture_path,
            manifest_path,
            limits,
        }
    }

    /// Install declared dependencies. Only the tool's exit code is checked;
    /// the installed packages are not verified on disk.
    pub async fn install(&self, mode: InstallMode) -> Result<InstallResult> {
        if !self.manifest_path.exists() {
            return Err(LecternError::precondition(format!(
                "No manifest at {}. Initialize the environment first.",
                self.manifest_path.display()
            )));
        }

        let spec = self.toolchain.install_command(mode);
        let command = spec.display();
        tracing::info!("Installing dependencies: {}", command);

        let passthrough = matches!(mode, InstallMode::Frozen { silent: false });
        let output = run_captured(&spec, self.lecture_path, self.limits, passthrough)
            .await?
            .into_result(&command)?;

        let mut messages = vec![format!("Ran {}", command)];
        messages.extend(tail_lines(&output.stdout, OUTPUT_TAIL_LINES));
        if output.truncated {
            messages.push("Output exceeded the capture limit and was truncated".to_string());
        }
        messages.push(format!(
            "Dependencies installed in {}",
            self.lecture_path.join(super::types::DEPENDENCIES_DIR).display()
        ));

        tracing::info!("Dependencies installed for {}", self.lecture_path.display());

        Ok(InstallResult {
            success: true,
            messages,
            errors: Vec::new(),
            installed_packages: vec![
                TOOL_RUNTIME_PACKAGE.to_string(),
                TOOL_CLIENT_PACKAGE.to_string(),
            ],
            exit_code: output.status.code(),
        })
    }
}

fn tail_lines(text: &str, count: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].iter().map(|l| l.to_string()).collect()
}
