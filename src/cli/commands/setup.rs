use super::display::{print_outcome, print_step};
use crate::config::AppConfig;
use crate::error::Result;

pub async fn execute(config: &AppConfig, path: &str, system_tool: bool) -> Result<()> {
    let mut manager = super::manager(config, path, system_tool);

    print_step(&format!("Setting up {}", manager.lecture_id()));
    let result = manager.setup().await;
    print_outcome(result.success, "Environment ready", &result.messages, &result.errors);

    super::finish(result.success, "Setup")
}
