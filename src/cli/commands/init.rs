use console::style;

use super::display::{print_outcome, print_step};
use crate::config::AppConfig;
use crate::error::Result;

pub async fn execute(config: &AppConfig, path: &str, system_tool: bool) -> Result<()> {
    let mut manager = super::manager(config, path, system_tool);

    print_step(&format!("Initializing {}", manager.lecture_id()));
    let result = manager.initialize().await;

    let done = match &result.tool_version {
        Some(version) => format!("Ready (slidev {})", version),
        None => "Ready".to_string(),
    };
    print_outcome(result.success, &done, &result.messages, &result.errors);

    if result.success {
        println!(
            "\nNext: {}",
            style(format!("lectern install {}", path)).cyan()
        );
    }

    super::finish(result.success, "Initialization")
}
