use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::environment::PackageManager;
use crate::error::{LecternError, Result};

/// Version range pinned for the presentation tool when nothing else is configured.
pub const DEFAULT_TOOL_VERSION: &str = "^51.0.0";

/// Entry source file every lecture directory must contain.
pub const DEFAULT_ENTRY_FILE: &str = "slides.md";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_port")]
    pub default_port: u16,
    #[serde(default = "default_host")]
    pub default_host: String,
    #[serde(default = "default_tool_version")]
    pub tool_version: String,
    /// Package managers probed in order; the first one that answers wins.
    #[serde(default = "default_package_managers")]
    pub package_managers: Vec<String>,
    #[serde(default = "default_long_timeout")]
    pub install_timeout: String,
    #[serde(default = "default_long_timeout")]
    pub build_timeout: String,
    #[serde(default = "default_readiness_timeout")]
    pub readiness_timeout: String,
    /// Ceiling for captured process output, in megabytes.
    #[serde(default = "default_output_buffer_mb")]
    pub output_buffer_mb: usize,
}

fn default_port() -> u16 {
    3030
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_tool_version() -> String {
    DEFAULT_TOOL_VERSION.to_string()
}

fn default_package_managers() -> Vec<String> {
    vec![
        "pnpm".to_string(),
        "bun".to_string(),
        "yarn".to_string(),
        "npm".to_string(),
    ]
}

fn default_long_timeout() -> String {
    "5m".to_string()
}

fn default_readiness_timeout() -> String {
    "30s".to_string()
}

fn default_output_buffer_mb() -> usize {
    50
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_port: default_port(),
            default_host: default_host(),
            tool_version: default_tool_version(),
            package_managers: default_package_managers(),
            install_timeout: default_long_timeout(),
            build_timeout: default_long_timeout(),
            readiness_timeout: default_readiness_timeout(),
            output_buffer_mb: default_output_buffer_mb(),
        }
    }
}

impl AppConfig {
    pub fn config_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| LecternError::Config("HOME environment variable not set".to_string()))?;
        Ok(PathBuf::from(home).join(".config").join("lectern"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.yaml"))
    }

    /// Load the user configuration, falling back to defaults when no file exists.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Self::default()
        };

        if let Ok(pm) = std::env::var("LECTERN_PACKAGE_MANAGER") {
            config.package_managers = vec![pm];
        }
        if let Ok(version) = std::env::var("LECTERN_TOOL_VERSION") {
            config.tool_version = version;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| LecternError::Config(format!("Invalid config: {}", e)))
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .map_err(|e| LecternError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// Returns an error for unknown package managers or unparseable durations.
    pub fn validate(&self) -> Result<()> {
        for name in &self.package_managers {
            if PackageManager::from_name(name).is_none() {
                return Err(LecternError::Config(format!(
                    "Unknown package manager '{}'. Supported: {:?}",
                    name,
                    PackageManager::supported_names()
                )));
            }
        }

        for (field, value) in [
            ("install_timeout", &self.install_timeout),
            ("build_timeout", &self.build_timeout),
            ("readiness_timeout", &self.readiness_timeout),
        ] {
            if parse_duration(value).is_none() {
                return Err(LecternError::Config(format!(
                    "Invalid {} '{}'. Use format like '5m', '30s', or '300'",
                    field, value
                )));
            }
        }

        if self.output_buffer_mb == 0 {
            return Err(LecternError::Config(
                "output_buffer_mb must be greater than zero".to_string(),
            ));
        }
        if megabytes(self.output_buffer_mb).is_none() {
            return Err(LecternError::Config(format!(
                "output_buffer_mb {} is too large",
                self.output_buffer_mb
            )));
        }

        Ok(())
    }

    /// Preference order as typed values, unknown names dropped.
    pub fn preferred_package_managers(&self) -> Vec<PackageManager> {
        self.package_managers
            .iter()
            .filter_map(|name| PackageManager::from_name(name))
            .collect()
    }

    pub fn install_timeout(&self) -> Duration {
        parse_duration(&self.install_timeout).unwrap_or(Duration::from_secs(300))
    }

    pub fn build_timeout(&self) -> Duration {
        parse_duration(&self.build_timeout).unwrap_or(Duration::from_secs(300))
    }

    pub fn readiness_timeout(&self) -> Duration {
        parse_duration(&self.readiness_timeout).unwrap_or(Duration::from_secs(30))
    }

    /// Saturates for sizes `validate` would reject.
    pub fn output_buffer_bytes(&self) -> usize {
        megabytes(self.output_buffer_mb).unwrap_or(usize::MAX)
    }
}

/// Input for one lecture's environment. Supplied once when the manager is built.
#[derive(Debug, Clone)]
pub struct LectureEnvironmentConfig {
    pub lecture_path: PathBuf,
    pub lecture_id: String,
    pub tool_version: Option<String>,
    /// Run a globally installed presentation tool instead of the lecture-local one.
    pub use_system_tool: bool,
    pub entry_file: String,
}

impl LectureEnvironmentConfig {
    /// Config for the lecture at `path`, identified by its directory name.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let lecture_path = path.into();
        let lecture_id = lecture_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "lecture".to_string());

        Self {
            lecture_path,
            lecture_id,
            tool_version: None,
            use_system_tool: false,
            entry_file: DEFAULT_ENTRY_FILE.to_string(),
        }
    }

    pub fn with_tool_version(mut self, version: impl Into<String>) -> Self {
        self.tool_version = Some(version.into());
        self
    }

    pub fn with_system_tool(mut self, enabled: bool) -> Self {
        self.use_system_tool = enabled;
        self
    }
}

fn megabytes(mb: usize) -> Option<usize> {
    mb.checked_mul(1024 * 1024)
}

pub(crate) fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim().to_lowercase();

    if let Some(hours) = s.strip_suffix('h') {
        hours.parse::<u64>().ok()?.checked_mul(3600).map(Duration::from_secs)
    } else if let Some(millis) = s.strip_suffix("ms") {
        millis.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(minutes) = s.strip_suffix('m') {
        minutes.parse::<u64>().ok()?.checked_mul(60).map(Duration::from_secs)
    } else if let Some(seconds) = s.strip_suffix('s') {
        seconds.parse::<u64>().ok().map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
