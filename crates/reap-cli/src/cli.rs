use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "reap")]
#[command(about = "Maintain reap folder stores")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Store directory (defaults to the platform data directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// JSON config file (defaults to reap.json in the store directory, if present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Collect expired tombstones once and exit
    ///
    /// The store must not be in use by another process.
    Maintenance {
        /// Age after which deleted records are removed (e.g. "48h"); 0 disables collection
        #[arg(long, value_parser = humantime::parse_duration)]
        delete_retention: Option<Duration>,
    },
    /// Show per-folder record counts and collection watermarks
    Folders {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the periodic maintenance scheduler until interrupted
    Serve {
        /// Time between maintenance passes (default 8h)
        #[arg(long, value_parser = humantime::parse_duration)]
        interval: Option<Duration>,
        /// Age after which deleted records are removed; 0 disables collection
        #[arg(long, value_parser = humantime::parse_duration)]
        delete_retention: Option<Duration>,
    },
}
