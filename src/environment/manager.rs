//! EnvironmentManager - Coordinates one lecture's environment.
//!
//! initialize → install → dev server / build → stop. Every public operation
//! returns a result record instead of an error; failures are converted at
//! this boundary and, where the state machine says so, move the status to
//! `Error`.

use std::path::PathBuf;

use super::build::BuildRunner;
use super::dev_server::{DevServerController, ReadinessPolicy};
use super::installer::DependencyInstaller;
use super::manifest::{Manifest, ManifestSource};
use super::process::{OutputLine, RunLimits};
use super::registry::{ProcessRegistry, ProcessSnapshot};
use super::toolchain::{
    detect_package_manager, find_system_tool, probe_version, CommandSpec, Toolchain,
};
use super::types::{
    BuildResult, DevServerOptions, DevServerResult, EnvironmentInfo, EnvironmentStatus,
    InitResult, InstallMode, InstallResult, TOOL_CLIENT_PACKAGE, TOOL_RUNTIME_PACKAGE,
};
use crate::config::{AppConfig, LectureEnvironmentConfig};
use crate::error::{LecternError, Result};

/// Lifecycle manager for a single lecture.
///
/// Operations take `&mut self`, so one manager never runs two of them at once.
/// Managers for different lectures are independent apart from an optionally
/// shared [`ProcessRegistry`].
pub struct EnvironmentManager {
    config: LectureEnvironmentConfig,
    settings: AppConfig,
    info: EnvironmentInfo,
    registry: ProcessRegistry,
    toolchain: Option<Toolchain>,
}

impl EnvironmentManager {
    pub fn new(config: LectureEnvironmentConfig) -> Self {
        Self::with_settings(config, AppConfig::default())
    }

    pub fn with_settings(config: LectureEnvironmentConfig, settings: AppConfig) -> Self {
        let lecture_path =
            std::path::absolute(&config.lecture_path).unwrap_or_else(|_| config.lecture_path.clone());

        Self {
            info: EnvironmentInfo::new(lecture_path),
            config,
            settings,
            registry: ProcessRegistry::new(),
            toolchain: None,
        }
    }

    /// Track processes in `registry`, typically one shared by every lecture.
    pub fn with_registry(mut self, registry: ProcessRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Skip detection and use `toolchain` for every external command.
    pub fn with_toolchain(mut self, toolchain: Toolchain) -> Self {
        self.toolchain = Some(toolchain);
        self
    }

    pub fn info(&self) -> EnvironmentInfo {
        self.info.clone()
    }

    pub fn status(&self) -> EnvironmentStatus {
        self.info.status
    }

    pub fn lecture_id(&self) -> &str {
        &self.config.lecture_id
    }

    pub fn lecture_path(&self) -> &PathBuf {
        &self.info.lecture_path
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    fn fail(&mut self, err: &LecternError) {
        tracing::error!("[{}] {}", self.config.lecture_id, err);
        self.info.status = EnvironmentStatus::Error;
        self.info.last_error = Some(err.to_string());
    }

    /// Validate the lecture directory and write its manifest.
    pub async fn initialize(&mut self) -> InitResult {
        self.info.status = EnvironmentStatus::Initializing;
        self.info.last_error = None;

        match self.prepare_manifest().await {
            Ok(result) => {
                self.info.status = EnvironmentStatus::Ready;
                result
            }
            Err(e) => {
                self.fail(&e);
                InitResult::failed(e.to_string())
            }
        }
    }

    async fn prepare_manifest(&mut self) -> Result<InitResult> {
        let lecture_path = self.info.lecture_path.clone();
        if !lecture_path.is_dir() {
            return Err(LecternError::filesystem(format!(
                "Lecture directory not found: {}",
                lecture_path.display()
            )));
        }

        let entry = lecture_path.join(&self.config.entry_file);
        if !entry.is_file() {
            return Err(LecternError::filesystem(format!(
                "Entry file {} not found in {}",
                self.config.entry_file,
                lecture_path.display()
            )));
        }

        let version = self.resolve_tool_version().await;
        let mut messages = Vec::new();

        let (mut manifest, source) =
            Manifest::load_or_create(&self.info.manifest_path, &self.config.lecture_id);
        match source {
            ManifestSource::Existing => messages.push("Updated existing manifest".to_string()),
            ManifestSource::Created => messages.push("Created manifest".to_string()),
            ManifestSource::Recreated(reason) => {
                messages.push(format!("Recreated unreadable manifest ({})", reason))
            }
        }

        if let Some(previous) = manifest.tool_version().filter(|v| *v != version) {
            messages.push(format!("Changed tool version from {} to {}", previous, version));
        }
        manifest.ensure_tool(&version);
        manifest.write(&self.info.manifest_path)?;
        messages.push(format!(
            "Pinned {} and {} to {}",
            TOOL_RUNTIME_PACKAGE, TOOL_CLIENT_PACKAGE, version
        ));

        tracing::info!(
            "[{}] Initialized {} (tool {})",
            self.config.lecture_id,
            self.info.manifest_path.display(),
            version
        );
        self.info.tool_version = Some(version.clone());

        Ok(InitResult {
            success: true,
            messages,
            errors: Vec::new(),
            tool_version: Some(version),
        })
    }

    /// Explicit config wins, then a detected system tool, then the default.
    async fn resolve_tool_version(&self) -> String {
        if let Some(version) = &self.config.tool_version {
            return version.clone();
        }

        if self.config.use_system_tool {
            if let Some(binary) = find_system_tool() {
                if let Some(version) = probe_version(&binary.to_string_lossy()).await {
                    tracing::debug!("Using system tool version {}", version);
                    return version;
                }
            }
            tracing::warn!("System tool requested but not found, using configured version");
        }

        self.settings.tool_version.clone()
    }

    async fn toolchain(&mut self) -> Toolchain {
        if let Some(toolchain) = &self.toolchain {
            return toolchain.clone();
        }

        let pm = detect_package_manager(&self.settings.preferred_package_managers()).await;
        let toolchain = if self.config.use_system_tool {
            match find_system_tool() {
                Some(binary) => Toolchain::SystemTool {
                    package_manager: pm,
                    binary,
                },
                None => Toolchain::PackageManager(pm),
            }
        } else {
            Toolchain::PackageManager(pm)
        };

        tracing::info!("[{}] Using {}", self.config.lecture_id, toolchain.describe());
        self.toolchain = Some(toolchain.clone());
        toolchain
    }

    pub async fn install_dependencies(&mut self) -> InstallResult {
        self.install_dependencies_with(InstallMode::Managed).await
    }

    /// Install dependencies in the given mode.
    ///
    /// Refused without touching the status unless a manifest was initialized.
    pub async fn install_dependencies_with(&mut self, mode: InstallMode) -> InstallResult {
        let initialized = match self.info.status {
            EnvironmentStatus::NotInitialized | EnvironmentStatus::Initializing => false,
            EnvironmentStatus::Error => self.info.manifest_path.exists(),
            EnvironmentStatus::Ready | EnvironmentStatus::Installing => true,
        };
        if !initialized {
            return InstallResult::failed(format!(
                "Environment for {} is not initialized (status: {}). Run initialize first.",
                self.config.lecture_id, self.info.status
            ));
        }

        self.info.status = EnvironmentStatus::Installing;
        let toolchain = self.toolchain().await;
        let limits = RunLimits {
            timeout: self.settings.install_timeout(),
            max_buffer: self.settings.output_buffer_bytes(),
        };

        let installer = DependencyInstaller::new(
            &toolchain,
            &self.info.lecture_path,
            &self.info.manifest_path,
            limits,
        );
        let outcome = installer.install(mode).await;

        match outcome {
            Ok(result) => {
                self.info.status = EnvironmentStatus::Ready;
                self.info.last_error = None;
                result
            }
            Err(e) => {
                self.fail(&e);
                let mut result = InstallResult::failed(e.to_string());
                result.exit_code = e.exit_code();
                result
            }
        }
    }

    /// `initialize` then, only if it succeeded, `install_dependencies`.
    pub async fn setup(&mut self) -> InstallResult {
        let init = self.initialize().await;
        if !init.success {
            return InstallResult {
                success: false,
                messages: init.messages,
                errors: init.errors,
                ..Default::default()
            };
        }

        let mut result = self.install_dependencies().await;
        result.messages = prepend(init.messages, result.messages);
        result
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.info.status == EnvironmentStatus::Ready {
            Ok(())
        } else {
            Err(LecternError::precondition(format!(
                "Environment for {} is not ready (status: {}). Run setup first.",
                self.config.lecture_id, self.info.status
            )))
        }
    }

    /// Install first when the dependency directory is missing.
    ///
    /// Returns the installer's messages, or its errors on failure.
    async fn ensure_dependencies(&mut self) -> std::result::Result<Vec<String>, Vec<String>> {
        if self.info.dependencies_path.exists() {
            return Ok(Vec::new());
        }

        tracing::info!(
            "[{}] {} missing, installing dependencies first",
            self.config.lecture_id,
            self.info.dependencies_path.display()
        );
        let install = self.install_dependencies().await;
        if install.success {
            Ok(install.messages)
        } else {
            Err(install.errors)
        }
    }

    /// Start the dev server and wait for readiness.
    ///
    /// A readiness timeout with the process still alive counts as success.
    pub async fn start_dev_server(&mut self, options: DevServerOptions) -> DevServerResult {
        if let Err(e) = self.ensure_ready() {
            return DevServerResult::failed(e.to_string());
        }

        let install_messages = match self.ensure_dependencies().await {
            Ok(messages) => messages,
            Err(errors) => {
                return DevServerResult {
                    errors,
                    ..Default::default()
                }
            }
        };

        let port = options.port.unwrap_or(self.settings.default_port);
        let host = options
            .host
            .clone()
            .unwrap_or_else(|| self.settings.default_host.clone());

        let toolchain = self.toolchain().await;
        let spec = toolchain.dev_command(&self.config.entry_file, &host, port, &options);

        let mut result = self.dev_server().start(&spec, &host, port).await;
        result.messages = prepend(install_messages, result.messages);
        result
    }

    fn dev_server(&self) -> DevServerController {
        let policy = ReadinessPolicy {
            timeout: self.settings.readiness_timeout(),
            ..ReadinessPolicy::default()
        };
        DevServerController::new(
            self.registry.clone(),
            self.config.lecture_id.clone(),
            self.info.lecture_path.clone(),
            policy,
        )
    }

    /// `false` when no dev server is tracked for this lecture.
    pub fn stop_dev_server(&self) -> bool {
        self.dev_server().stop()
    }

    pub fn is_dev_server_running(&self) -> bool {
        self.dev_server().is_running()
    }

    pub fn dev_server_pid(&self) -> Option<u32> {
        self.dev_server().pid()
    }

    fn build_runner(&self) -> BuildRunner {
        BuildRunner::new(
            self.registry.clone(),
            self.config.lecture_id.clone(),
            self.info.lecture_path.clone(),
            RunLimits {
                timeout: self.settings.build_timeout(),
                max_buffer: self.settings.output_buffer_bytes(),
            },
        )
    }

    /// Build with captured output.
    ///
    /// `success` does not imply artifacts exist; check `output_path`.
    pub async fn build(&mut self) -> BuildResult {
        let (spec, install_messages) = match self.prepare_build().await {
            Ok(prepared) => prepared,
            Err(result) => return result,
        };
        let result = self.build_runner().build(&spec).await;
        with_leading_messages(result, install_messages)
    }

    /// Build, handing each output line to `on_line` as it arrives.
    pub async fn build_with_output<F>(&mut self, on_line: F) -> BuildResult
    where
        F: FnMut(&OutputLine),
    {
        let (spec, install_messages) = match self.prepare_build().await {
            Ok(prepared) => prepared,
            Err(result) => return result,
        };
        let result = self.build_runner().build_with_output(&spec, on_line).await;
        with_leading_messages(result, install_messages)
    }

    async fn prepare_build(&mut self) -> std::result::Result<(CommandSpec, Vec<String>), BuildResult> {
        if let Err(e) = self.ensure_ready() {
            return Err(BuildResult::failed(e.to_string()));
        }

        let install_messages = self.ensure_dependencies().await.map_err(|errors| BuildResult {
            errors,
            ..Default::default()
        })?;

        let toolchain = self.toolchain().await;
        Ok((toolchain.build_command(&self.config.entry_file), install_messages))
    }

    pub fn list_processes(&self) -> Vec<ProcessSnapshot> {
        self.registry.list()
    }

    /// Stop every process in the registry, this lecture's and any others
    /// sharing it. Returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        let stopped = self.registry.stop_all();
        if stopped > 0 {
            tracing::info!("Stopped {} tracked process(es)", stopped);
        }
        stopped
    }
}

fn prepend(mut first: Vec<String>, mut rest: Vec<String>) -> Vec<String> {
    first.append(&mut rest);
    first
}

fn with_leading_messages(mut result: BuildResult, messages: Vec<String>) -> BuildResult {
    result.messages = prepend(messages, result.messages);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::types::STALE_THEME_PACKAGE;

    fn lecture_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("slides.md"), "# Hello\n").unwrap();
        dir
    }

    fn read_manifest(dir: &std::path::Path) -> serde_json::Value {
        let content = std::fs::read_to_string(dir.join("package.json")).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-lecture");
        let mut manager = EnvironmentManager::new(LectureEnvironmentConfig::new(&missing));

        let result = manager.initialize().await;

        assert!(!result.success);
        assert!(result.errors[0].contains("not found"));
        assert!(result.errors[0].contains("no-such-lecture"));
        assert_eq!(manager.status(), EnvironmentStatus::Error);
        assert!(manager.info().last_error.is_some());
    }

    #[tokio::test]
    async fn test_initialize_missing_entry_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = EnvironmentManager::new(LectureEnvironmentConfig::new(dir.path()));

        let result = manager.initialize().await;

        assert!(!result.success);
        assert!(result.errors[0].contains("slides.md"));
        assert_eq!(manager.status(), EnvironmentStatus::Error);
        assert!(!dir.path().join("package.json").exists());
    }

    #[tokio::test]
    async fn test_initialize_creates_manifest() {
        let dir = lecture_dir();
        let mut manager = EnvironmentManager::new(LectureEnvironmentConfig::new(dir.path()));

        let result = manager.initialize().await;

        assert!(result.success, "errors: {:?}", result.errors);
        assert_eq!(manager.status(), EnvironmentStatus::Ready);
        assert_eq!(result.tool_version.as_deref(), Some(crate::config::DEFAULT_TOOL_VERSION));

        let manifest = read_manifest(dir.path());
        assert_eq!(manifest["devDependencies"][TOOL_RUNTIME_PACKAGE], crate::config::DEFAULT_TOOL_VERSION);
        assert_eq!(manifest["dependencies"][TOOL_CLIENT_PACKAGE], crate::config::DEFAULT_TOOL_VERSION);
        assert_eq!(manager.info().tool_version.as_deref(), Some(crate::config::DEFAULT_TOOL_VERSION));
    }

    #[tokio::test]
    async fn test_initialize_preserves_unrelated_dependencies() {
        let dir = lecture_dir();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"name":"deck","dependencies":{"foo":"1.0.0","@slidev/theme-default":"latest"}}"#,
        )
        .unwrap();
        let config = LectureEnvironmentConfig::new(dir.path()).with_tool_version("51.3.0");
        let mut manager = EnvironmentManager::new(config);

        let result = manager.initialize().await;

        assert!(result.success);
        let manifest = read_manifest(dir.path());
        assert_eq!(manifest["dependencies"]["foo"], "1.0.0");
        assert_eq!(manifest["dependencies"][TOOL_CLIENT_PACKAGE], "51.3.0");
        assert_eq!(manifest["devDependencies"][TOOL_RUNTIME_PACKAGE], "51.3.0");
        assert!(manifest["dependencies"].get(STALE_THEME_PACKAGE).is_none());
    }

    #[tokio::test]
    async fn test_initialize_reports_tool_version_change() {
        let dir = lecture_dir();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"name":"deck","devDependencies":{"@slidev/cli":"^49.0.0"}}"#,
        )
        .unwrap();
        let config = LectureEnvironmentConfig::new(dir.path()).with_tool_version("^51.0.0");
        let mut manager = EnvironmentManager::new(config);

        let result = manager.initialize().await;

        assert!(result.success);
        assert!(result
            .messages
            .contains(&"Changed tool version from ^49.0.0 to ^51.0.0".to_string()));

        let again = manager.initialize().await;
        assert!(!again.messages.iter().any(|m| m.starts_with("Changed tool version")));
    }

    #[tokio::test]
    async fn test_initialize_recovers_from_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = EnvironmentManager::new(LectureEnvironmentConfig::new(dir.path()));

        assert!(!manager.initialize().await.success);
        assert_eq!(manager.status(), EnvironmentStatus::Error);

        std::fs::write(dir.path().join("slides.md"), "# Late\n").unwrap();
        assert!(manager.initialize().await.success);
        assert_eq!(manager.status(), EnvironmentStatus::Ready);
        assert!(manager.info().last_error.is_none());
    }

    #[test]
    fn test_info_paths_derived_from_lecture() {
        let manager = EnvironmentManager::new(LectureEnvironmentConfig::new("/courses/algo/week-1"));
        let info = manager.info();
        assert_eq!(info.status, EnvironmentStatus::NotInitialized);
        assert!(info.manifest_path.starts_with(&info.lecture_path));
        assert!(info.dependencies_path.starts_with(&info.lecture_path));
        assert_eq!(manager.lecture_id(), "week-1");
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::environment::registry::ProcessKind;
        use crate::environment::toolchain::{CommandSpec, CustomToolchain};
        use tokio::net::TcpListener;

        const MARKER: &str = "install-ran";

        fn toolchain(install: &str, dev: &str, build: &str) -> Toolchain {
            Toolchain::Custom(CustomToolchain {
                install: CommandSpec::new("sh").args(["-c", install]),
                dev: CommandSpec::new("sh").args(["-c", dev]),
                build: CommandSpec::new("sh").args(["-c", build]),
            })
        }

        fn working_toolchain() -> Toolchain {
            toolchain(
                &format!("touch {} && mkdir -p node_modules", MARKER),
                "sleep 30",
                "mkdir -p dist && echo ok > dist/index.html",
            )
        }

        fn settings() -> AppConfig {
            AppConfig {
                readiness_timeout: "300ms".to_string(),
                build_timeout: "10s".to_string(),
                install_timeout: "10s".to_string(),
                ..Default::default()
            }
        }

        fn manager(dir: &std::path::Path, toolchain: Toolchain) -> EnvironmentManager {
            EnvironmentManager::with_settings(LectureEnvironmentConfig::new(dir), settings())
                .with_toolchain(toolchain)
        }

        #[tokio::test]
        async fn test_install_before_initialize_is_refused() {
            let dir = lecture_dir();
            let mut manager = manager(dir.path(), working_toolchain());

            let result = manager.install_dependencies().await;

            assert!(!result.success);
            assert!(!result.errors.is_empty());
            assert_eq!(manager.status(), EnvironmentStatus::NotInitialized);
            assert!(!dir.path().join(MARKER).exists());
        }

        #[tokio::test]
        async fn test_build_before_initialize_is_refused() {
            let dir = lecture_dir();
            let mut manager = manager(dir.path(), working_toolchain());

            let result = manager.build().await;

            assert!(!result.success);
            assert!(result.errors[0].contains("not ready"));
            assert!(result.output_path.is_none());
            assert!(!dir.path().join(MARKER).exists());
            assert!(!dir.path().join("dist").exists());
        }

        #[tokio::test]
        async fn test_setup_initializes_and_installs() {
            let dir = lecture_dir();
            let mut manager = manager(dir.path(), working_toolchain());

            let result = manager.setup().await;

            assert!(result.success, "errors: {:?}", result.errors);
            assert_eq!(manager.status(), EnvironmentStatus::Ready);
            assert!(result.messages.iter().any(|m| m == "Created manifest"));
            assert_eq!(result.installed_packages, vec![TOOL_RUNTIME_PACKAGE, TOOL_CLIENT_PACKAGE]);
            assert!(dir.path().join("node_modules").is_dir());
        }

        #[tokio::test]
        async fn test_setup_short_circuits_on_init_failure() {
            let dir = tempfile::tempdir().unwrap();
            let mut manager = manager(dir.path(), working_toolchain());

            let result = manager.setup().await;

            assert!(!result.success);
            assert_eq!(manager.status(), EnvironmentStatus::Error);
            assert!(!dir.path().join(MARKER).exists());
        }

        #[tokio::test]
        async fn test_frozen_install_sets_ci_and_reports_output() {
            for silent in [true, false] {
                let dir = lecture_dir();
                let mut manager = manager(
                    dir.path(),
                    toolchain("echo ci=$CI; mkdir -p node_modules", "sleep 30", "true"),
                );
                assert!(manager.initialize().await.success);

                let result = manager
                    .install_dependencies_with(InstallMode::Frozen { silent })
                    .await;

                assert!(result.success, "silent={} errors: {:?}", silent, result.errors);
                assert!(result.messages.contains(&"ci=true".to_string()));
                assert_eq!(result.exit_code, Some(0));
                assert_eq!(manager.status(), EnvironmentStatus::Ready);
                assert!(dir.path().join("node_modules").is_dir());
            }
        }

        #[tokio::test]
        async fn test_frozen_install_failure_moves_to_error() {
            let dir = lecture_dir();
            let mut manager = manager(
                dir.path(),
                toolchain("echo 'lockfile out of date' >&2; exit 1", "sleep 30", "true"),
            );
            assert!(manager.initialize().await.success);

            let result = manager
                .install_dependencies_with(InstallMode::Frozen { silent: false })
                .await;

            assert!(!result.success);
            assert_eq!(result.exit_code, Some(1));
            assert!(result.errors[0].contains("lockfile out of date"));
            assert_eq!(manager.status(), EnvironmentStatus::Error);
        }

        #[tokio::test]
        async fn test_dev_server_clean_exit_is_not_tracked() {
            let dir = lecture_dir();
            let mut manager = manager(
                dir.path(),
                toolchain("mkdir -p node_modules", "exit 0", "true"),
            );
            assert!(manager.setup().await.success);

            let result = manager.start_dev_server(DevServerOptions::default()).await;

            assert!(result.success, "errors: {:?}", result.errors);
            assert!(manager.list_processes().is_empty());
            assert!(!manager.is_dev_server_running());
            assert!(!manager.stop_dev_server());
        }

        #[tokio::test]
        async fn test_install_failure_moves_to_error() {
            let dir = lecture_dir();
            let mut manager = manager(
                dir.path(),
                toolchain("echo 'network unreachable' >&2; exit 7", "sleep 30", "true"),
            );

            assert!(manager.initialize().await.success);
            let result = manager.install_dependencies().await;

            assert!(!result.success);
            assert_eq!(result.exit_code, Some(7));
            assert!(result.errors[0].contains("network unreachable"));
            assert_eq!(manager.status(), EnvironmentStatus::Error);
            assert!(manager.info().last_error.unwrap().contains("code 7"));

            // Manifest exists, so a retry is allowed; the dev server is not.
            let dev = manager.start_dev_server(DevServerOptions::default()).await;
            assert!(!dev.success);
            assert!(manager.registry().is_empty());
            let retry = manager.install_dependencies().await;
            assert_eq!(retry.exit_code, Some(7));
        }

        #[tokio::test]
        async fn test_dev_server_lifecycle() {
            let dir = lecture_dir();
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            let mut manager = manager(dir.path(), working_toolchain());
            assert!(manager.initialize().await.success);

            assert!(!manager.stop_dev_server());

            let options = DevServerOptions {
                port: Some(port),
                host: Some("127.0.0.1".to_string()),
                ..Default::default()
            };
            let result = manager.start_dev_server(options).await;

            assert!(result.success, "errors: {:?}", result.errors);
            assert_eq!(result.url, Some(format!("http://127.0.0.1:{}", port)));
            assert!(dir.path().join(MARKER).exists(), "missing dependencies trigger an install");
            assert!(manager.is_dev_server_running());
            assert_eq!(manager.dev_server_pid(), result.process_id);

            assert!(manager.stop_dev_server());
            assert!(!manager.is_dev_server_running());
            assert!(manager.dev_server_pid().is_none());
        }

        #[tokio::test]
        async fn test_start_twice_tracks_one_dev_server() {
            let dir = lecture_dir();
            let mut manager = manager(dir.path(), working_toolchain());
            assert!(manager.initialize().await.success);

            let first = manager.start_dev_server(DevServerOptions::default()).await;
            let second = manager.start_dev_server(DevServerOptions::default()).await;

            assert!(first.success && second.success);
            let processes = manager.list_processes();
            assert_eq!(processes.len(), 1);
            assert_eq!(processes[0].kind, ProcessKind::DevServer);
            assert_eq!(processes[0].pid, second.process_id);
            assert_eq!(manager.stop_all(), 1);
            assert!(manager.list_processes().is_empty());
        }

        #[tokio::test]
        async fn test_shared_registry_stop_all_spans_lectures() {
            let registry = ProcessRegistry::new();
            let first_dir = lecture_dir();
            let second_dir = lecture_dir();
            let mut first = manager(first_dir.path(), working_toolchain())
                .with_registry(registry.clone());
            let mut second = manager(second_dir.path(), working_toolchain())
                .with_registry(registry.clone());
            assert!(first.initialize().await.success);
            assert!(second.initialize().await.success);

            assert!(first.start_dev_server(DevServerOptions::default()).await.success);
            assert!(second.start_dev_server(DevServerOptions::default()).await.success);

            assert_eq!(registry.len(), 2);
            assert_eq!(first.stop_all(), 2);
            assert!(!second.is_dev_server_running());
        }

        #[tokio::test]
        async fn test_build_twice_same_output() {
            let dir = lecture_dir();
            let mut manager = manager(dir.path(), working_toolchain());
            assert!(manager.setup().await.success);

            let first = manager.build().await;
            let second = manager.build().await;

            assert!(first.success && second.success, "{:?} {:?}", first.errors, second.errors);
            assert_eq!(first.output_path, Some(manager.lecture_path().join("dist")));
            assert_eq!(first.output_path, second.output_path);
            assert!(manager.list_processes().is_empty());
        }

        #[tokio::test]
        async fn test_build_with_output_streams_lines() {
            let dir = lecture_dir();
            let mut manager = manager(
                dir.path(),
                toolchain("mkdir -p node_modules", "sleep 30", "echo vite build; echo warn >&2"),
            );
            assert!(manager.setup().await.success);
            let mut count = 0;

            let result = manager.build_with_output(|_| count += 1).await;

            assert!(result.success);
            assert_eq!(count, 2);
            assert!(result.messages.contains(&"[stdout] vite build".to_string()));
            assert!(result.output_path.is_none());
            assert!(result.messages.iter().any(|m| m.starts_with("Warning:")));
        }
    }
}
