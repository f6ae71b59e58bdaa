use console::style;

use crate::config::AppConfig;
use crate::environment::PackageManager;
use crate::error::{LecternError, Result};
use crate::utils::format_size;

pub async fn show() -> Result<()> {
    let config_path = AppConfig::config_path()?;
    let config = AppConfig::load()?;

    println!("{}", style("Effective Configuration").bold().cyan());
    println!();
    println!("  Port:              {}", style(config.default_port).white());
    println!("  Host:              {}", style(&config.default_host).white());
    println!("  Tool version:      {}", style(&config.tool_version).white());
    println!(
        "  Package managers:  {}",
        style(config.package_managers.join(", ")).white()
    );
    println!("  Install timeout:   {}", style(&config.install_timeout).yellow());
    println!("  Build timeout:     {}", style(&config.build_timeout).yellow());
    println!("  Readiness timeout: {}", style(&config.readiness_timeout).yellow());
    println!(
        "  Output buffer:     {}",
        style(format_size(config.output_buffer_bytes())).white()
    );
    println!();

    if config_path.exists() {
        println!("Config file: {}", style(config_path.display()).dim());
    } else {
        println!(
            "{}",
            style(format!("No config file at {}, showing defaults", config_path.display())).dim()
        );
    }

    Ok(())
}

pub async fn set(key: String, value: String) -> Result<()> {
    let mut config = AppConfig::load().unwrap_or_default();

    match key.as_str() {
        "port" | "default_port" => {
            config.default_port = value
                .parse()
                .map_err(|_| LecternError::Config(format!("Invalid port: {}", value)))?
        }
        "host" | "default_host" => config.default_host = value.clone(),
        "tool_version" | "tool-version" => config.tool_version = value.clone(),
        "package_managers" | "package-managers" => {
            config.package_managers = value.split(',').map(|s| s.trim().to_string()).collect()
        }
        "install_timeout" | "install-timeout" => config.install_timeout = value.clone(),
        "build_timeout" | "build-timeout" => config.build_timeout = value.clone(),
        "readiness_timeout" | "readiness-timeout" => config.readiness_timeout = value.clone(),
        "output_buffer_mb" | "output-buffer-mb" => {
            config.output_buffer_mb = value
                .parse()
                .map_err(|_| LecternError::Config(format!("Invalid size: {}", value)))?
        }
        _ => {
            println!(
                "{} Unknown config key: {}",
                style("!").yellow().bold(),
                style(&key).red()
            );
            println!("\nAvailable keys:");
            println!("  port, host, tool_version, package_managers,");
            println!("  install_timeout, build_timeout, readiness_timeout, output_buffer_mb");
            println!(
                "\nSupported package managers: {}",
                PackageManager::supported_names().join(", ")
            );
            return Ok(());
        }
    }

    config.validate()?;
    config.save()?;

    println!(
        "{} Set {} = {}",
        style("✓").green().bold(),
        style(&key).cyan(),
        style(&value).white()
    );

    Ok(())
}
