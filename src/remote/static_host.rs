// src/remote/static_host.rs

//! Session and cloud lookups backed by the deployment configuration
//!
//! Key files are read again for every session so a rotated key is picked
//! up by the next attempt.

use super::{AccessDetails, SessionProvider};
use crate::cloud::{CloudProvider, InstanceState, ManagedDbConnection};
use crate::config::{DeploymentConfig, ManagedDatabaseSection};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// A host whose address and key live in the configuration
#[derive(Debug, Clone)]
pub struct StaticHost {
    instance_name: String,
    host: String,
    port: u16,
    username: String,
    private_key: PathBuf,
    certificate: Option<PathBuf>,
    databases: BTreeMap<String, ManagedDatabaseSection>,
}

impl StaticHost {
    /// Build from the `[target]` and `[managed_databases]` sections
    ///
    /// `default_user` is used when the target names no login user.
    pub fn from_config(config: &DeploymentConfig, default_user: &str) -> Self {
        let target = &config.target;
        Self {
            instance_name: target.instance_name.clone(),
            host: target.host.clone(),
            port: target.port,
            username: target
                .username
                .clone()
                .unwrap_or_else(|| default_user.to_string()),
            private_key: expand_home(&target.private_key),
            certificate: target.certificate.as_deref().map(expand_home),
            databases: config.managed_databases.clone(),
        }
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

fn read_key(path: &PathBuf, what: &str) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| Error::SessionError(format!("Failed to read {} {}: {}", what, path.display(), e)))
}

impl SessionProvider for StaticHost {
    fn open_session(&self) -> Result<AccessDetails> {
        debug!("Reading key material from {}", self.private_key.display());
        let key = read_key(&self.private_key, "private key")?;
        let mut access = AccessDetails::new(&self.username, &self.host, key).with_port(self.port);
        if let Some(cert_path) = &self.certificate {
            access = access.with_certificate(read_key(cert_path, "certificate")?);
        }
        Ok(access)
    }
}

impl CloudProvider for StaticHost {
    /// A configured host is assumed to be running
    fn instance_state(&self, instance_name: &str) -> Result<InstanceState> {
        if instance_name == self.instance_name {
            Ok(InstanceState::Running)
        } else {
            Err(Error::CloudError(format!("Unknown instance: {}", instance_name)))
        }
    }

    fn managed_db_connection(&self, database_name: &str) -> Result<ManagedDbConnection> {
        let db = self.databases.get(database_name).ok_or_else(|| {
            Error::CloudError(format!("Managed database not configured: {}", database_name))
        })?;

        let password = db.password_env.as_deref().and_then(|var| std::env::var(var).ok());
        Ok(ManagedDbConnection {
            endpoint: db.endpoint.clone(),
            port: db.port,
            username: db.username.clone(),
            password,
            engine: db.engine.clone(),
            database_name: db
                .database_name
                .clone()
                .unwrap_or_else(|| database_name.to_string()),
        })
    }
}
