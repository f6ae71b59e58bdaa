//! Package manager detection and command construction.
//!
//! Every external invocation the manager makes is described as a
//! [`CommandSpec`] built here, so the installer, dev server and build runner
//! never hard-code tool names.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use super::types::{DevServerOptions, InstallMode};

/// Name of the presentation tool's executable.
pub const TOOL_BINARY: &str = "slidev";

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Pnpm,
    Yarn,
    Bun,
}

impl PackageManager {
    /// Used when no preferred package manager answers its version probe.
    pub const FALLBACK: PackageManager = PackageManager::Npm;

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "npm" => Some(Self::Npm),
            "pnpm" => Some(Self::Pnpm),
            "yarn" => Some(Self::Yarn),
            "bun" => Some(Self::Bun),
            _ => None,
        }
    }

    pub fn supported_names() -> Vec<&'static str> {
        vec!["npm", "pnpm", "yarn", "bun"]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Pnpm => "pnpm",
            Self::Yarn => "yarn",
            Self::Bun => "bun",
        }
    }

    /// Executable name; Windows ships the node tools as `.cmd` shims.
    pub fn program(&self) -> String {
        if cfg!(windows) && *self != Self::Bun {
            format!("{}.cmd", self.as_str())
        } else {
            self.as_str().to_string()
        }
    }

    pub fn install_args(&self, mode: InstallMode) -> Vec<String> {
        let mut args: Vec<&str> = match (self, mode) {
            (_, InstallMode::Managed) => vec!["install"],
            (Self::Npm, InstallMode::Frozen { .. }) => vec!["ci", "--no-audit", "--no-fund"],
            (Self::Pnpm | Self::Yarn, InstallMode::Frozen { .. }) => {
                vec!["install", "--frozen-lockfile", "--prefer-offline"]
            }
            (Self::Bun, InstallMode::Frozen { .. }) => vec!["install", "--frozen-lockfile"],
        };

        if let InstallMode::Frozen { silent: true } = mode {
            args.push("--silent");
        }

        args.into_iter().map(String::from).collect()
    }

    /// Arguments that run a locally installed binary.
    pub fn exec_args(&self, binary: &str) -> Vec<String> {
        let args: Vec<&str> = match self {
            Self::Npm => vec!["exec", "--", binary],
            Self::Pnpm => vec!["exec", binary],
            Self::Yarn => vec![binary],
            Self::Bun => vec!["x", binary],
        };
        args.into_iter().map(String::from).collect()
    }

    pub fn run_script_args(&self, script: &str) -> Vec<String> {
        vec!["run".to_string(), script.to_string()]
    }
}

impl std::fmt::Display for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully resolved external command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Human-readable form for logs and error messages.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    /// Build a tokio command running in `cwd`, inheriting the parent environment.
    pub fn to_command(&self, cwd: &std::path::Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(cwd).stdin(Stdio::null());
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Explicit commands for hosts that bring their own tooling.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomToolchain {
    pub install: CommandSpec,
    pub dev: CommandSpec,
    pub build: CommandSpec,
}

/// How the manager invokes the package manager and the presentation tool.
#[derive(Debug, Clone, PartialEq)]
pub enum Toolchain {
    /// Everything goes through the package manager and the lecture-local tool.
    PackageManager(PackageManager),
    /// Dependencies via the package manager; dev and build via a global binary.
    SystemTool {
        package_manager: PackageManager,
        binary: PathBuf,
    },
    Custom(CustomToolchain),
}

impl Toolchain {
    pub fn describe(&self) -> String {
        match self {
            Self::PackageManager(pm) => pm.to_string(),
            Self::SystemTool {
                package_manager,
                binary,
            } => format!("{} + {}", package_manager, binary.display()),
            Self::Custom(_) => "custom".to_string(),
        }
    }

    pub fn install_command(&self, mode: InstallMode) -> CommandSpec {
        let spec = match self {
            Self::PackageManager(pm)
            | Self::SystemTool {
                package_manager: pm,
                ..
            } => CommandSpec::new(pm.program()).args(pm.install_args(mode)),
            Self::Custom(custom) => custom.install.clone(),
        };

        match mode {
            InstallMode::Frozen { .. } => spec.env("CI", "true"),
            InstallMode::Managed => spec,
        }
    }

    pub fn dev_command(&self, entry: &str, host: &str, port: u16, options: &DevServerOptions) -> CommandSpec {
        let base = match self {
            Self::PackageManager(pm) => {
                CommandSpec::new(pm.program()).args(pm.exec_args(TOOL_BINARY))
            }
            Self::SystemTool { binary, .. } => {
                CommandSpec::new(binary.to_string_lossy().to_string())
            }
            Self::Custom(custom) => custom.dev.clone(),
        };

        let open = if options.open { "--open" } else { "--open=false" };
        base.args([entry.to_string()])
            .args(["--port".to_string(), port.to_string()])
            .args(["--bind".to_string(), host.to_string()])
            .args([open])
            .args(options.args.iter().cloned())
            .env("NODE_ENV", "development")
            .env("PORT", port.to_string())
            .env("HOST", host)
    }

    pub fn build_command(&self, entry: &str) -> CommandSpec {
        let spec = match self {
            Self::PackageManager(pm) => {
                CommandSpec::new(pm.program()).args(pm.run_script_args("build"))
            }
            Self::SystemTool { binary, .. } => {
                CommandSpec::new(binary.to_string_lossy().to_string()).args(["build", entry])
            }
            Self::Custom(custom) => custom.build.clone(),
        };
        spec.env("NODE_ENV", "production")
    }
}

/// Probe the preferred package managers in order; fall back to npm unprobed.
pub async fn detect_package_manager(preferred: &[PackageManager]) -> PackageManager {
    for pm in preferred {
        if let Some(version) = probe_version(&pm.program()).await {
            tracing::debug!("Detected {} {}", pm, version);
            return *pm;
        }
        tracing::debug!("{} not available", pm);
    }

    tracing::debug!(
        "No preferred package manager found, falling back to {}",
        PackageManager::FALLBACK
    );
    PackageManager::FALLBACK
}

/// Locate the presentation tool on `PATH`.
pub fn find_system_tool() -> Option<PathBuf> {
    which::which(TOOL_BINARY).ok()
}

/// Run `<program> --version` and return the trimmed first line on success.
pub async fn probe_version(program: &str) -> Option<String> {
    let output = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(VERSION_PROBE_TIMEOUT, output)
        .await
        .ok()?
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .next()
        .map(parse_version_line)
        .filter(|v| !v.is_empty())
}

/// Strip tool prefixes such as `@slidev/cli v51.2.0` down to `51.2.0`.
fn parse_version_line(line: &str) -> String {
    let token = line.split_whitespace().last().unwrap_or("");
    token.trim_start_matches('v').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        assert_eq!(PackageManager::from_name("PNPM"), Some(PackageManager::Pnpm));
        assert_eq!(PackageManager::from_name(" bun "), Some(PackageManager::Bun));
        assert_eq!(PackageManager::from_name("pip"), None);
    }

    #[test]
    fn test_install_args_by_mode() {
        assert_eq!(PackageManager::Npm.install_args(InstallMode::Managed), vec!["install"]);
        assert_eq!(
            PackageManager::Npm.install_args(InstallMode::Frozen { silent: true }),
            vec!["ci", "--no-audit", "--no-fund", "--silent"]
        );
        assert_eq!(
            PackageManager::Pnpm.install_args(InstallMode::Frozen { silent: false }),
            vec!["install", "--frozen-lockfile", "--prefer-offline"]
        );
    }

    #[test]
    fn test_exec_args() {
        assert_eq!(PackageManager::Npm.exec_args("slidev"), vec!["exec", "--", "slidev"]);
        assert_eq!(PackageManager::Yarn.exec_args("slidev"), vec!["slidev"]);
        assert_eq!(PackageManager::Bun.exec_args("slidev"), vec!["x", "slidev"]);
    }

    #[test]
    fn test_dev_command_arguments() {
        let toolchain = Toolchain::PackageManager(PackageManager::Pnpm);
        let options = DevServerOptions {
            args: vec!["--remote".to_string()],
            ..Default::default()
        };
        let spec = toolchain.dev_command("slides.md", "127.0.0.1", 4000, &options);

        assert_eq!(
            spec.args,
            vec!["exec", "slidev", "slides.md", "--port", "4000", "--bind", "127.0.0.1", "--open=false", "--remote"]
        );
        assert!(spec.env.contains(&("PORT".to_string(), "4000".to_string())));
        assert!(spec.env.contains(&("NODE_ENV".to_string(), "development".to_string())));
    }

    #[test]
    fn test_dev_command_open_requested() {
        let toolchain = Toolchain::PackageManager(PackageManager::Npm);
        let options = DevServerOptions {
            open: true,
            ..Default::default()
        };
        let spec = toolchain.dev_command("slides.md", "localhost", 3030, &options);
        assert!(spec.args.contains(&"--open".to_string()));
        assert!(!spec.args.contains(&"--open=false".to_string()));
    }

    #[test]
    fn test_build_command_variants() {
        let spec = Toolchain::PackageManager(PackageManager::Yarn).build_command("slides.md");
        assert_eq!(spec.args, vec!["run", "build"]);
        assert!(spec.env.contains(&("NODE_ENV".to_string(), "production".to_string())));

        let system = Toolchain::SystemTool {
            package_manager: PackageManager::Npm,
            binary: PathBuf::from("/usr/local/bin/slidev"),
        };
        let spec = system.build_command("slides.md");
        assert_eq!(spec.program, "/usr/local/bin/slidev");
        assert_eq!(spec.args, vec!["build", "slides.md"]);
    }

    #[test]
    fn test_frozen_install_sets_ci() {
        let spec = Toolchain::PackageManager(PackageManager::Npm)
            .install_command(InstallMode::Frozen { silent: false });
        assert!(spec.env.contains(&("CI".to_string(), "true".to_string())));

        let spec = Toolchain::PackageManager(PackageManager::Npm).install_command(InstallMode::Managed);
        assert!(spec.env.is_empty());
    }

    #[test]
    fn test_parse_version_line() {
        assert_eq!(parse_version_line("v51.2.0"), "51.2.0");
        assert_eq!(parse_version_line("@slidev/cli v0.49.1"), "0.49.1");
        assert_eq!(parse_version_line("9.1.4"), "9.1.4");
    }

    #[tokio::test]
    async fn test_probe_version_missing_program() {
        assert!(probe_version("lectern-definitely-not-installed").await.is_none());
    }

    #[tokio::test]
    async fn test_detect_falls_back_without_preferences() {
        assert_eq!(detect_package_manager(&[]).await, PackageManager::Npm);
    }
}
