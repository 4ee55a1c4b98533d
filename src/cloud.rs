// src/cloud.rs

//! Cloud resource lookups
//!
//! The installer only needs two things from the cloud: the lifecycle state
//! of the target instance and connection details for a managed database.

use crate::error::Result;
use serde::Serialize;
use std::fmt;

/// Lifecycle state of the target instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Pending,
    Running,
    Stopping,
    Stopped,
    Terminated,
    Unknown,
}

impl InstanceState {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            "terminated" => Self::Terminated,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Terminated => "terminated",
            Self::Unknown => "unknown",
        }
    }

    /// States from which the instance will not come back on its own
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Stopping | Self::Stopped | Self::Terminated)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection details for a managed database
#[derive(Clone, PartialEq, Eq)]
pub struct ManagedDbConnection {
    pub endpoint: String,
    pub port: u16,
    pub username: String,
    /// Absent when the secret could not be resolved
    pub password: Option<String>,
    /// Engine name, e.g. `mysql` or `postgres`
    pub engine: String,
    /// Database created with the resource
    pub database_name: String,
}

impl ManagedDbConnection {
    pub fn is_mysql(&self) -> bool {
        self.engine.to_lowercase().starts_with("mysql")
    }
}

impl fmt::Debug for ManagedDbConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedDbConnection")
            .field("endpoint", &self.endpoint)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("engine", &self.engine)
            .field("database_name", &self.database_name)
            .finish()
    }
}

/// Cloud resource lookups needed by the installer
pub trait CloudProvider {
    fn instance_state(&self, instance_name: &str) -> Result<InstanceState>;

    fn managed_db_connection(&self, database_name: &str) -> Result<ManagedDbConnection>;
}
