use std::time::Duration;

use console::style;

use super::display::{print_outcome, print_processes, print_step};
use crate::config::AppConfig;
use crate::environment::DevServerOptions;
use crate::error::Result;

/// How often the foreground loop checks the server is still alive.
const WATCH_INTERVAL: Duration = Duration::from_secs(1);

pub async fn execute(
    config: &AppConfig,
    path: &str,
    options: DevServerOptions,
    system_tool: bool,
) -> Result<()> {
    let mut manager = super::manager(config, path, system_tool);

    let init = manager.initialize().await;
    if !init.success {
        print_outcome(false, "", &init.messages, &init.errors);
        return super::finish(false, "Initialization");
    }

    print_step(&format!("Starting dev server for {}", manager.lecture_id()));
    let result = manager.start_dev_server(options).await;
    print_outcome(result.success, "Dev server started", &result.messages, &result.errors);
    if !result.success {
        return super::finish(false, "Dev server");
    }

    if let Some(url) = &result.url {
        println!("  {}  {}", style("URL").dim(), style(url).cyan().bold());
    }
    println!();
    print_processes(&manager.list_processes());
    println!("\n{}", style("Press Ctrl-C to stop").dim());

    let mut ticker = tokio::time::interval(WATCH_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let exited = loop {
        tokio::select! {
            _ = &mut ctrl_c => break false,
            _ = ticker.tick() => {
                if !manager.is_dev_server_running() {
                    break true;
                }
            }
        }
    };

    let stopped = manager.stop_all();
    if exited {
        println!(
            "{} {}",
            style("✕").red().bold(),
            style("Dev server exited unexpectedly").red()
        );
        return super::finish(false, "Dev server");
    }

    println!(
        "\n{} Stopped {} process(es)",
        style("✓").green().bold(),
        stopped
    );
    Ok(())
}
