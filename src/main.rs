//! upkeep CLI entry point
//!
//! Parses arguments, runs one update operation and prints its JSON payload.
//! Exits with status 1 when the operation fails.

use anyhow::Result;
use clap::Parser;
use upkeep::cli;
use upkeep::core::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
