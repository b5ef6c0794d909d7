//! Binary crate for the `weather` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Interactive configuration
//! - Logging setup
//! - Human-friendly output formatting

use clap::Parser;
use weather_core::Config;

mod cli;
mod logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();
    let config = Config::load()?;
    let guards = logging::init(&config.log_dir()?, cmd.records_last_run())?;

    tracing::info!("Starting weather CLI");

    if let Err(e) = cmd.run(config).await {
        tracing::error!("{e:#}");
        // Flush the file writers before exiting.
        drop(guards);
        std::process::exit(1);
    }

    Ok(())
}
