pub mod commands;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::environment::InstallMode;
use crate::error::Result;

#[derive(Parser)]
#[command(name = "lectern")]
#[command(version)]
#[command(about = "Run, build and tear down lecture slide environments")]
#[command(long_about = "Prepare a lecture directory for the slide tool, install its dependencies,\nrun the dev server or build static output.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Use the slide tool found on PATH instead of the package manager's copy
    #[arg(long, global = true)]
    pub system_tool: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a lecture directory and write its package.json
    Init {
        /// Lecture directory
        path: String,
    },

    /// Install the lecture's dependencies
    Install {
        /// Lecture directory
        path: String,

        /// Install exactly what the lockfile records
        #[arg(long)]
        frozen: bool,

        /// Suppress installer output (frozen installs only)
        #[arg(long, requires = "frozen")]
        silent: bool,
    },

    /// Initialize and install in one step
    Setup {
        /// Lecture directory
        path: String,
    },

    /// Start the dev server and keep it running until Ctrl-C
    Dev {
        /// Lecture directory
        path: String,

        /// Port to listen on (default from config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind (default from config)
        #[arg(long)]
        host: Option<String>,

        /// Open a browser once the server is up
        #[arg(long)]
        open: bool,

        /// Extra arguments passed to the slide tool
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Build static output into dist/
    Build {
        /// Lecture directory
        path: String,

        /// Print build output as it arrives
        #[arg(long)]
        stream: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let system_tool = self.system_tool;
        match self.command {
            Commands::Init { path } => {
                let config = AppConfig::load()?;
                commands::init::execute(&config, &path, system_tool).await
            }
            Commands::Install {
                path,
                frozen,
                silent,
            } => {
                let config = AppConfig::load()?;
                let mode = if frozen {
                    InstallMode::Frozen { silent }
                } else {
                    InstallMode::Managed
                };
                commands::install::execute(&config, &path, mode, system_tool).await
            }
            Commands::Setup { path } => {
                let config = AppConfig::load()?;
                commands::setup::execute(&config, &path, system_tool).await
            }
            Commands::Dev {
                path,
                port,
                host,
                open,
                args,
            } => {
                let config = AppConfig::load()?;
                let options = crate::environment::DevServerOptions {
                    port,
                    host,
                    open,
                    args,
                };
                commands::dev::execute(&config, &path, options, system_tool).await
            }
            Commands::Build { path, stream } => {
                let config = AppConfig::load()?;
                commands::build::execute(&config, &path, stream, system_tool).await
            }
            Commands::Config { command } => match command {
                ConfigCommands::Show => commands::config::show().await,
                ConfigCommands::Set { key, value } => commands::config::set(key, value).await,
            },
        }
    }
}
