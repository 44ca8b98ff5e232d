//! reap CLI - Offline maintenance for reap folder stores
//!
//! Runs tombstone collection against a stopped store, or hosts the periodic
//! scheduler in the foreground.

mod cli;
mod commands;
mod config;
mod error;
mod lock;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::folders::run_folders;
use crate::commands::maintenance::run_maintenance;
use crate::commands::serve::run_serve;
use crate::config::ReapConfig;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(error.exit_code());
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reap=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir)?;
    let config = ReapConfig::load(cli.config.as_deref(), &data_dir)?;

    match cli.command {
        Commands::Maintenance { delete_retention } => {
            run_maintenance(&data_dir, config.store_options(delete_retention)).await?;
        }
        Commands::Folders { json } => run_folders(&data_dir, json)?,
        Commands::Serve {
            interval,
            delete_retention,
        } => {
            run_serve(
                &data_dir,
                config.store_options(delete_retention),
                config.maintenance_config(interval),
            )
            .await?;
        }
    }

    Ok(())
}

fn resolve_data_dir(explicit: Option<PathBuf>) -> Result<PathBuf, CliError> {
    explicit
        .or_else(default_data_dir)
        .ok_or_else(|| {
            CliError::Config("could not resolve a data directory, pass --data-dir".into())
        })
}

fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("reap"))
}

#[cfg(test)]
mod tests;
