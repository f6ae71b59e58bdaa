use super::display::{print_outcome, print_step};
use crate::config::AppConfig;
use crate::environment::InstallMode;
use crate::error::Result;

pub async fn execute(config: &AppConfig, path: &str, mode: InstallMode, system_tool: bool) -> Result<()> {
    let mut manager = super::manager(config, path, system_tool);

    let init = manager.initialize().await;
    if !init.success {
        print_outcome(false, "", &init.messages, &init.errors);
        return super::finish(false, "Initialization");
    }

    let label = match mode {
        InstallMode::Managed => "Installing dependencies",
        InstallMode::Frozen { .. } => "Installing dependencies from lockfile",
    };
    print_step(label);

    let result = manager.install_dependencies_with(mode).await;
    let done = format!("Installed {}", result.installed_packages.join(", "));
    print_outcome(result.success, &done, &result.messages, &result.errors);

    super::finish(result.success, "Install")
}
