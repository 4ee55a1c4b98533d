// src/cli/log.rs
//! Remote command log commands

use clap::Subcommand;

#[derive(Subcommand)]
pub enum LogCommands {
    /// Show the most recent log entries
    Show {
        /// Path to the deployment configuration
        #[arg(short, long, default_value = "deploy.toml")]
        config: String,

        /// Number of lines to show
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,
    },

    /// Delete the log on the target host
    Clear {
        /// Path to the deployment configuration
        #[arg(short, long, default_value = "deploy.toml")]
        config: String,
    },
}
