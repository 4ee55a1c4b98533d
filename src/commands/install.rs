// src/commands/install.rs

//! Install command: connectivity, dependencies, services, summary

use super::Target;
use anyhow::Result;
use hoststack::{
    CliProgress, CloudProvider, DependencyInstaller, InstallSummary, LogProgress, ProgressTracker,
};
use tracing::{info, warn};

/// Install every enabled dependency on the configured target
pub fn cmd_install(config_path: &str, json: bool, progress: bool) -> Result<()> {
    let target = Target::open(config_path)?;
    let instance = target.host.instance_name();

    let state = target.host.instance_state(instance)?;
    if state.is_fatal() {
        anyhow::bail!("Instance {} is {}, cannot install", instance, state);
    }

    let exec = target.executor();
    let retries = &target.config.deployment.retries;
    if !exec.check_connectivity(target.config.connectivity_timeout(), retries.connectivity) {
        anyhow::bail!("Cannot reach {} over SSH", target.config.target.host);
    }

    let tracker: Box<dyn ProgressTracker> = if progress {
        Box::new(CliProgress::new())
    } else {
        Box::new(LogProgress::new())
    };

    let mut installer = DependencyInstaller::new(&exec, target.profile.clone())
        .with_cloud(&target.host)
        .with_settings(target.config.install_settings())
        .with_progress(tracker);

    let summary = installer.install_dependencies(&target.config.dependencies);

    if !summary.installed.is_empty() {
        if !installer.configure_services() {
            warn!("Some services could not be configured");
        }
        if !installer.restart_services() {
            warn!("Some services could not be restarted");
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    if summary.total_enabled > 0 && summary.installed.is_empty() {
        anyhow::bail!("All {} dependencies failed to install", summary.total_enabled);
    }
    if !summary.success {
        info!("Installation completed with failures");
    }
    Ok(())
}

fn print_summary(summary: &InstallSummary) {
    println!("Installation summary");
    println!("  Enabled:   {}", summary.total_enabled);
    println!("  Installed: {}", summary.installed.join(", "));
    if !summary.skipped_already_present.is_empty() {
        println!("  Already present: {}", summary.skipped_already_present.join(", "));
    }
    if !summary.failed.is_empty() {
        println!("  Failed:    {}", summary.failed.join(", "));
    }
    println!("  Success rate: {:.1}%", summary.success_rate);
}
