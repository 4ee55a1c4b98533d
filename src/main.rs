// src/main.rs

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use cli::{Cli, Commands, LogCommands};

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Install {
            config,
            json,
            progress,
        } => commands::cmd_install(&config, json, progress),
        Commands::Exec {
            command,
            config,
            live,
            timeout,
        } => commands::cmd_exec(&config, &command, live, timeout),
        Commands::Log(LogCommands::Show { config, lines }) => commands::cmd_log_show(&config, lines),
        Commands::Log(LogCommands::Clear { config }) => commands::cmd_log_clear(&config),
        Commands::DetectOs {
            blueprint_id,
            blueprint_name,
        } => commands::cmd_detect_os(&blueprint_id, blueprint_name.as_deref()),
    }
}
