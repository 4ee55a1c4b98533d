// src/install/kind.rs

//! Dependency kinds and install ordering

use crate::os::{Component, OsProfile};
use std::str::FromStr;
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Every dependency the installer knows how to provision
///
/// Declaration order is install priority: tooling and the firewall first,
/// then web servers, databases, runtimes, caches, containers, TLS and
/// monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum DependencyKind {
    Git,
    Firewall,
    Apache,
    Nginx,
    Mysql,
    Postgresql,
    Php,
    Python,
    Nodejs,
    Redis,
    Memcached,
    Docker,
    SslCertificates,
    Monitoring,
}

impl DependencyKind {
    /// Parse a configuration name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::from_str(name).ok()
    }

    /// Position in the install order
    pub fn priority(&self) -> usize {
        *self as usize
    }

    pub fn is_web_server(&self) -> bool {
        matches!(self, Self::Apache | Self::Nginx)
    }

    pub fn is_database(&self) -> bool {
        matches!(self, Self::Mysql | Self::Postgresql)
    }

    /// Shell check that succeeds when the dependency is already present
    ///
    /// Kinds without a check are always installed.
    pub fn presence_check(&self, profile: &OsProfile) -> Option<String> {
        let is_active = profile.svc().is_active;
        let binary = |name: &str| format!("command -v {} >/dev/null 2>&1", name);

        match self {
            Self::Apache => {
                let service = profile.packages(Component::Apache).service_or("apache2");
                Some(format!("{} {}", is_active, service))
            }
            Self::Nginx => Some(format!("{} nginx", is_active)),
            Self::Mysql => Some(binary("mysql")),
            Self::Postgresql => Some(binary("psql")),
            Self::Php => Some(binary("php")),
            Self::Python => Some(binary("python3")),
            Self::Nodejs => Some(binary("node")),
            Self::Redis => {
                let service = profile.packages(Component::Redis).service_or("redis-server");
                Some(format!("{0} {1} || {0} redis", is_active, service))
            }
            Self::Git => Some(binary("git")),
            Self::Docker => Some(binary("docker")),
            Self::Firewall | Self::Memcached | Self::SslCertificates | Self::Monitoring => None,
        }
    }

    /// Service restarted after install, if the kind runs one
    pub fn service_name(&self, profile: &OsProfile) -> Option<&'static str> {
        match self {
            Self::Apache => Some(profile.packages(Component::Apache).service_or("apache2")),
            Self::Nginx => Some(profile.packages(Component::Nginx).service_or("nginx")),
            Self::Mysql => Some(profile.packages(Component::MysqlServer).service_or("mysql")),
            Self::Postgresql => Some(
                profile
                    .packages(Component::PostgresqlServer)
                    .service_or("postgresql"),
            ),
            Self::Redis => Some(profile.packages(Component::Redis).service_or("redis-server")),
            Self::Memcached => Some("memcached"),
            Self::Docker => Some("docker"),
            Self::Nodejs => Some("nodejs-app"),
            _ => None,
        }
    }
}

/// Sort enabled names by priority; unknown names keep their order at the end
pub fn install_order(enabled: &[String]) -> Vec<String> {
    let mut ordered: Vec<String> = DependencyKind::iter()
        .map(|kind| kind.to_string())
        .filter(|name| enabled.contains(name))
        .collect();

    for name in enabled {
        if !ordered.contains(name) {
            ordered.push(name.clone());
        }
    }
    ordered
}
