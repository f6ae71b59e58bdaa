//! Core value types for a lecture environment.

use std::path::PathBuf;

use serde::Serialize;

/// Runtime package of the presentation tool (dev server, build, export).
pub const TOOL_RUNTIME_PACKAGE: &str = "@slidev/cli";

/// Client assets package loaded by the generated presentation.
pub const TOOL_CLIENT_PACKAGE: &str = "@slidev/client";

/// Theme entry older manifests declared; removed on initialize.
pub const STALE_THEME_PACKAGE: &str = "@slidev/theme-default";

pub const MANIFEST_FILE: &str = "package.json";
pub const DEPENDENCIES_DIR: &str = "node_modules";
pub const BUILD_OUTPUT_DIR: &str = "dist";

/// Status of a lecture environment
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentStatus {
    #[default]
    NotInitialized,
    Initializing,
    Ready,
    Installing,
    Error,
}

impl std::fmt::Display for EnvironmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotInitialized => "not initialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Installing => "installing",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Snapshot of one lecture's environment.
///
/// Paths are derived once when the manager is built; `status` only moves
/// through the manager's transitions.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentInfo {
    pub status: EnvironmentStatus,
    pub lecture_path: PathBuf,
    pub manifest_path: PathBuf,
    pub dependencies_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl EnvironmentInfo {
    pub fn new(lecture_path: PathBuf) -> Self {
        Self {
            status: EnvironmentStatus::NotInitialized,
            manifest_path: lecture_path.join(MANIFEST_FILE),
            dependencies_path: lecture_path.join(DEPENDENCIES_DIR),
            lecture_path,
            tool_version: None,
            last_error: None,
        }
    }
}

/// How the dependency installer should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallMode {
    /// Plain install, output captured.
    #[default]
    Managed,
    /// Reproducible, network-minimal install for unattended runs.
    /// `silent` suppresses live passthrough of tool output.
    Frozen { silent: bool },
}

/// Caller options for starting a dev server.
#[derive(Debug, Clone, Default)]
pub struct DevServerOptions {
    pub port: Option<u16>,
    pub host: Option<String>,
    /// Let the tool open a browser window.
    pub open: bool,
    /// Extra arguments passed through to the tool.
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InitResult {
    pub success: bool,
    pub messages: Vec<String>,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallResult {
    pub success: bool,
    pub messages: Vec<String>,
    pub errors: Vec<String>,
    pub installed_packages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DevServerResult {
    pub success: bool,
    pub messages: Vec<String>,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildResult {
    pub success: bool,
    pub messages: Vec<String>,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl InitResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
            ..Default::default()
        }
    }
}

impl InstallResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
            ..Default::default()
        }
    }
}

impl DevServerResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
            ..Default::default()
        }
    }
}

impl BuildResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
            ..Default::default()
        }
    }
}
