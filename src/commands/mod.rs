// src/commands/mod.rs
//! Command handlers for the hoststack CLI

mod detect;
mod exec;
mod install;
mod log;

pub use detect::cmd_detect_os;
pub use exec::cmd_exec;
pub use install::cmd_install;
pub use log::{cmd_log_clear, cmd_log_show};

use anyhow::{Context, Result};
use hoststack::{
    detect, DeploymentConfig, OsProfile, RemoteExecutor, RuntimeContext, SshTransport, StaticHost,
    ThreadSleeper,
};
use std::path::Path;
use tracing::info;

/// Everything needed to talk to the configured target
pub(crate) struct Target {
    pub config: DeploymentConfig,
    pub profile: OsProfile,
    pub host: StaticHost,
    transport: SshTransport,
    sleeper: ThreadSleeper,
    ctx: RuntimeContext,
}

impl Target {
    pub fn open(config_path: &str) -> Result<Self> {
        let config = DeploymentConfig::load(Path::new(config_path))
            .with_context(|| format!("Failed to load {}", config_path))?;
        let profile = detect(&config.target.blueprint_id, &config.target.blueprint_name);
        let host = StaticHost::from_config(&config, profile.users.default_user);
        let ctx = RuntimeContext::from_env();
        let transport = SshTransport::new(ctx).context("ssh client not available")?;

        info!(
            "Target {} ({}) detected as {} using {}",
            config.target.instance_name,
            config.target.host,
            profile.distro.display_name(),
            profile.package_manager
        );
        if ctx.is_ci {
            info!("CI environment detected, using extended timeouts");
        }

        Ok(Self {
            config,
            profile,
            host,
            transport,
            sleeper: ThreadSleeper,
            ctx,
        })
    }

    pub fn executor(&self) -> RemoteExecutor<'_> {
        RemoteExecutor::new(&self.host, &self.transport, &self.sleeper, self.ctx)
            .with_probe_timeout(self.config.probe_timeout())
    }
}
