// src/cli/mod.rs
//! CLI definitions for hoststack
//!
//! This module contains the command-line interface definitions using clap.
//! The command implementations are in the `commands` module.
//!
//! - `install` - Install the configured dependencies on the target
//! - `exec` - Run one command or script on the target
//! - `log` - Show or clear the remote command log
//! - `detect-os` - Show the OS profile for a blueprint

use clap::{Parser, Subcommand};

mod log;

pub use log::LogCommands;

#[derive(Parser)]
#[command(name = "hoststack")]
#[command(author = "Hoststack Contributors")]
#[command(version)]
#[command(about = "Provision application stacks on a cloud VM over SSH", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install every enabled dependency on the target host
    ///
    /// Checks connectivity first, then installs, configures and restarts
    /// services. Exits non-zero when every enabled dependency failed.
    Install {
        /// Path to the deployment configuration
        #[arg(short, long, default_value = "deploy.toml")]
        config: String,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,

        /// Show a progress bar instead of per-dependency log lines
        #[arg(long)]
        progress: bool,
    },

    /// Run a command or script on the target host
    Exec {
        /// Command or script text
        command: String,

        /// Path to the deployment configuration
        #[arg(short, long, default_value = "deploy.toml")]
        config: String,

        /// Stream output and step through `set -e` scripts
        #[arg(long)]
        live: bool,

        /// Per-attempt timeout in seconds (default: deployment.timeouts.command)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Remote command log
    #[command(subcommand)]
    Log(LogCommands),

    /// Show the OS profile detected for a blueprint
    DetectOs {
        /// Blueprint id, e.g. ubuntu_22_04
        blueprint_id: String,

        /// Blueprint display name
        blueprint_name: Option<String>,
    },
}
