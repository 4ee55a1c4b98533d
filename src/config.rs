// src/config.rs

//! Deployment configuration
//!
//! Supports a TOML file with the following sections:
//! - [target] - Host, login and blueprint of the target instance
//! - [deployment.timeouts] - Command, probe, lock and connectivity bounds
//! - [deployment.retries] - Attempts per command, routine and connectivity check
//! - [dependencies.*] - Dependencies to install, in document order
//! - [managed_databases.*] - Connection details for managed databases
//!
//! Unknown keys in `target`, `deployment.*` and `managed_databases.*` are
//! rejected. Dependency tables are free-form; each routine reads its own
//! options from them.
//!
//! The raw document stays available through [`ConfigProvider`] for
//! dotted-path lookups.

use crate::error::{Error, Result};
use crate::install::{DependencySpec, InstallSettings};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Dotted-path access to configuration values
pub trait ConfigProvider {
    /// Value at `dot_path` (`deployment.timeouts.command`), if present
    fn get(&self, dot_path: &str) -> Option<&toml::Value>;

    fn get_str(&self, dot_path: &str) -> Option<&str> {
        self.get(dot_path).and_then(toml::Value::as_str)
    }

    fn get_integer(&self, dot_path: &str) -> Option<i64> {
        self.get(dot_path).and_then(toml::Value::as_integer)
    }

    fn get_bool(&self, dot_path: &str) -> Option<bool> {
        self.get(dot_path).and_then(toml::Value::as_bool)
    }
}

/// Walk `dot_path` through nested tables
pub fn lookup<'v>(root: &'v toml::Value, dot_path: &str) -> Option<&'v toml::Value> {
    dot_path
        .split('.')
        .try_fold(root, |value, key| value.as_table()?.get(key))
}

/// `[target]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSection {
    pub instance_name: String,
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// Login user; defaults to the detected distro's default user
    pub username: Option<String>,
    /// Path to the private key, `~` expanded
    pub private_key: String,
    /// Path to a signed certificate, if the host requires one
    pub certificate: Option<String>,
    #[serde(default)]
    pub blueprint_id: String,
    #[serde(default)]
    pub blueprint_name: String,
}

fn default_ssh_port() -> u16 {
    crate::remote::DEFAULT_SSH_PORT
}

/// `[deployment]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentSection {
    #[serde(default)]
    pub timeouts: TimeoutSection,
    #[serde(default)]
    pub retries: RetrySection,
}

/// `[deployment.timeouts]`, all in seconds
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutSection {
    pub command: u64,
    pub probe: u64,
    pub lock_wait: u64,
    pub connectivity: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            command: 300,
            probe: 10,
            lock_wait: 60,
            connectivity: 30,
        }
    }
}

/// `[deployment.retries]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    /// Attempts per remote command
    pub max_attempts: u32,
    /// Attempts per dependency routine
    pub routine_attempts: u32,
    /// Attempts for the initial connectivity check
    pub connectivity: u32,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            routine_attempts: 2,
            connectivity: 3,
        }
    }
}

/// `[managed_databases.<name>]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManagedDatabaseSection {
    pub endpoint: String,
    pub port: u16,
    /// `mysql` or `postgres`
    pub engine: String,
    pub username: String,
    /// Environment variable holding the password
    pub password_env: Option<String>,
    /// Database created with the resource
    #[serde(default)]
    pub database_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Document {
    target: TargetSection,
    #[serde(default)]
    deployment: DeploymentSection,
    #[serde(default)]
    dependencies: toml::Table,
    #[serde(default)]
    managed_databases: BTreeMap<String, ManagedDatabaseSection>,
}

/// Loaded deployment configuration
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    pub target: TargetSection,
    pub deployment: DeploymentSection,
    /// Every `[dependencies.*]` table, in document order
    pub dependencies: Vec<DependencySpec>,
    pub managed_databases: BTreeMap<String, ManagedDatabaseSection>,
    raw: toml::Value,
}

impl DeploymentConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::ConfigError(format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let raw: toml::Value = toml::from_str(content)?;
        let document: Document = raw.clone().try_into()?;

        let mut dependencies = Vec::with_capacity(document.dependencies.len());
        for (name, value) in &document.dependencies {
            let table = value.as_table().ok_or_else(|| {
                Error::ConfigError(format!("dependencies.{} must be a table", name))
            })?;
            dependencies.push(DependencySpec::from_table(name, table));
        }

        let config = Self {
            target: document.target,
            deployment: document.deployment,
            dependencies,
            managed_databases: document.managed_databases,
            raw,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.target.host.trim().is_empty() {
            return Err(Error::ConfigError("target.host must not be empty".to_string()));
        }
        if self.target.private_key.trim().is_empty() {
            return Err(Error::ConfigError("target.private_key must not be empty".to_string()));
        }
        let timeouts = &self.deployment.timeouts;
        if timeouts.command == 0 || timeouts.connectivity == 0 {
            return Err(Error::ConfigError(
                "deployment.timeouts.command and .connectivity must be positive".to_string(),
            ));
        }
        crate::install::validate(&self.dependencies)
    }

    /// Names of enabled dependencies, in document order
    pub fn enabled_dependencies(&self) -> Vec<String> {
        self.dependencies
            .iter()
            .filter(|d| d.enabled)
            .map(|d| d.name.clone())
            .collect()
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.deployment.timeouts.command)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.deployment.timeouts.probe)
    }

    pub fn connectivity_timeout(&self) -> Duration {
        Duration::from_secs(self.deployment.timeouts.connectivity)
    }

    /// Retry and wait bounds for the installer
    pub fn install_settings(&self) -> InstallSettings {
        InstallSettings {
            command_attempts: self.deployment.retries.max_attempts.max(1),
            routine_attempts: self.deployment.retries.routine_attempts.max(1),
            lock_timeout: Duration::from_secs(self.deployment.timeouts.lock_wait),
        }
    }
}

impl ConfigProvider for DeploymentConfig {
    fn get(&self, dot_path: &str) -> Option<&toml::Value> {
        lookup(&self.raw, dot_path)
    }
}
