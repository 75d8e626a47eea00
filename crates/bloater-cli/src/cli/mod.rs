//! CLI for the bloater load generator.

mod commands;

use anyhow::Result;
use bloater_core::config::{self, BloaterConfig};
use bloater_core::logging;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use commands::{run_check, run_init, run_workload};

/// Top-level CLI for the bloater load generator.
#[derive(Debug, Parser)]
#[command(name = "bloater")]
#[command(about = "bloater: synthetic, time-varying HTTP load generator", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run every configured tenant's workload against its target.
    Run {
        /// Config file (default: ~/.config/bloater/config.toml, created if missing).
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
        /// Directory for the log file and per-metric CSV files (default: current directory).
        #[arg(long, value_name = "DIR")]
        data_dir: Option<PathBuf>,
    },

    /// Validate a config and print each tenant's stage plan.
    Check {
        /// Config file (default: ~/.config/bloater/config.toml).
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Write a default config file.
    Init {
        /// Where to write it (default: ~/.config/bloater/config.toml).
        path: Option<PathBuf>,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn load_config(path: Option<&Path>) -> Result<BloaterConfig> {
    match path {
        Some(p) => config::load_from_path(p),
        None => config::load_or_init(),
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Run { config, data_dir } => {
                let data_dir = match data_dir {
                    Some(dir) => dir,
                    None => std::env::current_dir()?,
                };
                if let Err(e) = logging::init_logging(Some(&data_dir)) {
                    logging::init_logging_stderr();
                    tracing::warn!("file logging unavailable, using stderr: {:#}", e);
                }
                let cfg = load_config(config.as_deref())?;
                tracing::debug!("loaded config: {:?}", cfg);
                run_workload(&cfg, &data_dir).await?;
            }
            CliCommand::Check { config } => {
                logging::init_logging_stderr();
                let cfg = load_config(config.as_deref())?;
                run_check(&cfg)?;
            }
            CliCommand::Init { path, force } => {
                logging::init_logging_stderr();
                let path = match path {
                    Some(p) => p,
                    None => config::config_path()?,
                };
                run_init(&path, force)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
