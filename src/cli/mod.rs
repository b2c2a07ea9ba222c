//! Command-line interface for the updater
//!
//! The binary is a thin host over [`UpdateService`]: every command prints the
//! operation's JSON payload on stdout and logs to stderr.
//!
//! # Commands
//!
//! - `status [--force]` - Report update status, re-checking once the cooldown expires
//! - `download` - Download and verify the newest release binary
//! - `apply` - Replace the running executable with the staged binary
//! - `instructions` - Print manual update steps
//!
//! # Global Options
//!
//! - `--verbose` - Enable debug logging
//! - `--quiet` - Disable logging
//! - `--config <PATH>` - Use a specific configuration file
//!
//! # Exit Status
//!
//! Zero when the payload reports success, one otherwise. `status` and
//! `instructions` always succeed unless the configuration cannot be loaded.

use crate::config::GlobalConfig;
use crate::update::service::UpdateService;
use crate::utils::progress::ProgressBar;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Keep a packaged application up to date from its GitHub releases.
#[derive(Parser, Debug)]
#[command(name = "upkeep", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging on stderr.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Disable logging.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration file.
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Report whether a newer release is available.
    Status {
        /// Query the registry even if the last check is recent.
        #[arg(long)]
        force: bool,
    },
    /// Download and verify the newest release binary.
    Download,
    /// Replace this application with the downloaded release and restart it.
    Apply,
    /// Print manual update steps.
    Instructions,
}

impl Cli {
    /// Log filter directive implied by the flags, `None` for no logging.
    #[must_use]
    pub fn log_level(&self) -> Option<&'static str> {
        if self.verbose {
            Some("debug")
        } else if self.quiet {
            None
        } else {
            Some("info")
        }
    }

    /// Run the command. Returns whether the printed payload reports success.
    pub async fn execute(self) -> Result<bool> {
        init_logging(self.log_level());

        let config = GlobalConfig::load_with_optional(self.config).await?;
        let service = UpdateService::builder(config.update.clone())
            .data_dir(config.data_dir()?)
            .build()
            .context("Failed to initialize the update service")?;

        match self.command {
            Commands::Status { force } => {
                let report = service.check(force).await?;
                print_json(&report)?;
                Ok(true)
            }
            Commands::Download => {
                let bar = ProgressBar::new_spinner();
                bar.set_message("Downloading update");
                let progress = bar.clone();
                let response = service
                    .download_with_progress(move |update| {
                        if let Some(total) = update.total {
                            progress.set_length(total);
                        }
                        progress.set_position(update.downloaded);
                    })
                    .await;
                bar.finish_and_clear();
                print_json(&response)?;
                Ok(response.success)
            }
            Commands::Apply => {
                let response = service.apply().await;
                print_json(&response)?;
                Ok(response.success)
            }
            Commands::Instructions => {
                print_json(&service.instructions())?;
                Ok(true)
            }
        }
    }
}

fn print_json<T: Serialize>(payload: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(payload).context("Failed to serialize response")?;
    println!("{json}");
    Ok(())
}

/// Install the stderr log subscriber.
///
/// `--verbose` and `--quiet` win over `RUST_LOG`; otherwise `RUST_LOG` is
/// used when set and `info` when not.
pub fn init_logging(level: Option<&str>) {
    let filter = match level {
        None => EnvFilter::new("off"),
        Some("debug") => EnvFilter::new("upkeep=debug"),
        Some(level) => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("upkeep={level}"))),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
