use console::style;

use super::display::{print_line, print_outcome, print_step};
use crate::config::AppConfig;
use crate::error::Result;

pub async fn execute(config: &AppConfig, path: &str, stream: bool, system_tool: bool) -> Result<()> {
    let mut manager = super::manager(config, path, system_tool);

    let init = manager.initialize().await;
    if !init.success {
        print_outcome(false, "", &init.messages, &init.errors);
        return super::finish(false, "Initialization");
    }

    print_step(&format!("Building {}", manager.lecture_id()));
    let result = if stream {
        let result = manager.build_with_output(print_line).await;
        // Lines were already printed; only the trailing report remains.
        let report: Vec<String> = result
            .messages
            .iter()
            .filter(|m| !m.starts_with("[stdout]"))
            .cloned()
            .collect();
        let errors: Vec<String> = result
            .errors
            .iter()
            .filter(|e| !e.starts_with("[stderr]"))
            .cloned()
            .collect();
        print_outcome(result.success, "Build finished", &report, &errors);
        result
    } else {
        let result = manager.build().await;
        print_outcome(result.success, "Build finished", &result.messages, &result.errors);
        result
    };

    if let Some(output) = &result.output_path {
        println!("  Output: {}", style(output.display()).cyan());
    }

    super::finish(result.success, "Build")
}
