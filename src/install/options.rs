// src/install/options.rs

//! Typed options for each dependency routine
//!
//! A dependency's table in the configuration is free-form. Each routine
//! reads the fields it understands through one of these structs; every
//! field has a documented default and unrecognized fields are ignored.
//!
//! Options live either at the top of the table (`version`, `external`) or
//! in its nested `config` table:
//!
//! ```toml
//! [dependencies.php]
//! enabled = true
//! version = "8.2"
//! [dependencies.php.config]
//! extensions = ["pdo_mysql", "redis"]
//! ```

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Deserialize typed options from a raw dependency table
pub fn parse<T: DeserializeOwned>(name: &str, raw: &toml::Table) -> Result<T> {
    toml::Value::Table(raw.clone())
        .try_into()
        .map_err(|e| Error::ConfigError(format!("Invalid options for {}: {}", name, e)))
}

fn default_true() -> bool {
    true
}

fn default_document_root() -> String {
    "/var/www/html".to_string()
}

fn default_app_database() -> String {
    "app_db".to_string()
}

/// `[dependencies.apache]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApacheOptions {
    /// Append `ServerTokens Prod` / `ServerSignature Off`
    pub hide_version: bool,
    pub config: WebServerConfig,
}

impl Default for ApacheOptions {
    fn default() -> Self {
        Self {
            hide_version: true,
            config: WebServerConfig::default(),
        }
    }
}

/// `[dependencies.nginx]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NginxOptions {
    pub config: WebServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebServerConfig {
    pub document_root: String,
    /// apt only: `a2enmod rewrite`
    pub enable_rewrite: bool,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            document_root: default_document_root(),
            enable_rewrite: true,
        }
    }
}

/// `[dependencies.mysql]` and `[dependencies.postgresql]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseOptions {
    /// Use a managed database instead of a local engine
    pub external: bool,
    pub config: LocalDatabaseConfig,
    pub rds: ManagedDatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalDatabaseConfig {
    pub create_app_database: bool,
    pub database_name: String,
}

impl Default for LocalDatabaseConfig {
    fn default() -> Self {
        Self {
            create_app_database: true,
            database_name: default_app_database(),
        }
    }
}

/// Managed database settings (`[dependencies.<db>.rds]`)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManagedDatabaseConfig {
    /// Name of the managed database resource; required when `external`
    pub database_name: Option<String>,
    /// Database the application connects to
    pub master_database: String,
    /// Extra variables written to the environment file
    pub environment: BTreeMap<String, String>,
    /// Provision a local engine when the managed setup fails
    #[serde(default = "default_true")]
    pub fallback_to_local: bool,
}

impl Default for ManagedDatabaseConfig {
    fn default() -> Self {
        Self {
            database_name: None,
            master_database: default_app_database(),
            environment: BTreeMap::new(),
            fallback_to_local: true,
        }
    }
}

/// `[dependencies.php]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PhpOptions {
    pub version: String,
    pub config: PhpConfig,
}

impl Default for PhpOptions {
    fn default() -> Self {
        Self {
            version: "8.1".to_string(),
            config: PhpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PhpConfig {
    pub extensions: Vec<String>,
    pub enable_composer: bool,
}

impl Default for PhpConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["pdo".to_string(), "pdo_mysql".to_string()],
            enable_composer: true,
        }
    }
}

/// `[dependencies.python]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PythonOptions {
    pub version: String,
    pub config: PythonConfig,
}

impl Default for PythonOptions {
    fn default() -> Self {
        Self {
            version: "3.9".to_string(),
            config: PythonConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PythonConfig {
    pub virtual_env: bool,
    pub pip_packages: Vec<String>,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            virtual_env: true,
            pip_packages: Vec::new(),
        }
    }
}

/// `[dependencies.nodejs]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodejsOptions {
    pub version: String,
    pub config: NodejsConfig,
}

impl Default for NodejsOptions {
    fn default() -> Self {
        Self {
            version: "18".to_string(),
            config: NodejsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodejsConfig {
    /// `npm` or `yarn`
    pub package_manager: String,
    pub npm_packages: Vec<String>,
}

impl Default for NodejsConfig {
    fn default() -> Self {
        Self {
            package_manager: "npm".to_string(),
            npm_packages: Vec::new(),
        }
    }
}

/// `[dependencies.git]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GitOptions {
    pub config: GitConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// apt only
    pub install_lfs: bool,
}

/// `[dependencies.firewall]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FirewallOptions {
    pub config: FirewallConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FirewallConfig {
    /// Ports or `port/proto` entries; integers and strings are both accepted
    pub allowed_ports: Vec<PortSpec>,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            allowed_ports: vec![PortSpec::Number(22), PortSpec::Number(80), PortSpec::Number(443)],
        }
    }
}

impl FirewallConfig {
    /// Allowed ports with 22 guaranteed first
    pub fn ports_with_ssh(&self) -> Vec<String> {
        let mut ports: Vec<String> = self.allowed_ports.iter().map(PortSpec::to_string).collect();
        if !ports.iter().any(|p| p == "22") {
            ports.insert(0, "22".to_string());
        }
        ports
    }
}

/// A firewall port entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PortSpec {
    Number(u16),
    Text(String),
}

impl std::fmt::Display for PortSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s.trim()),
        }
    }
}

/// `[dependencies.ssl_certificates]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SslOptions {
    pub config: SslConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SslConfig {
    pub provider: String,
}

impl Default for SslConfig {
    fn default() -> Self {
        Self {
            provider: "letsencrypt".to_string(),
        }
    }
}

/// `[dependencies.monitoring]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MonitoringOptions {
    pub config: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub tools: Vec<String>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            tools: vec!["htop".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(src: &str) -> toml::Table {
        src.parse().unwrap()
    }

    #[test]
    fn test_defaults_from_empty_table() {
        let apache: ApacheOptions = parse("apache", &table("enabled = true")).unwrap();
        assert!(apache.hide_version);
        assert_eq!(apache.config.document_root, "/var/www/html");

        let php: PhpOptions = parse("php", &toml::Table::new()).unwrap();
        assert_eq!(php.version, "8.1");
        assert_eq!(php.config.extensions, vec!["pdo", "pdo_mysql"]);
    }

    #[test]
    fn test_nested_config_overrides() {
        let raw = table(
            r#"
            enabled = true
            version = "20"
            [config]
            package_manager = "yarn"
            npm_packages = ["pm2"]
            "#,
        );
        let node: NodejsOptions = parse("nodejs", &raw).unwrap();
        assert_eq!(node.version, "20");
        assert_eq!(node.config.package_manager, "yarn");
        assert_eq!(node.config.npm_packages, vec!["pm2"]);
    }

    #[test]
    fn test_firewall_always_allows_ssh() {
        let raw = table("[config]\nallowed_ports = [80, \"443\", \"8080/tcp\"]");
        let fw: FirewallOptions = parse("firewall", &raw).unwrap();
        assert_eq!(fw.config.ports_with_ssh(), vec!["22", "80", "443", "8080/tcp"]);

        let raw = table("[config]\nallowed_ports = [\"22\", 80]");
        let fw: FirewallOptions = parse("firewall", &raw).unwrap();
        assert_eq!(fw.config.ports_with_ssh(), vec!["22", "80"]);
    }

    #[test]
    fn test_managed_database_options() {
        let raw = table(
            r#"
            external = true
            [rds]
            database_name = "app-db"
            environment = { APP_ENV = "production" }
            "#,
        );
        let db: DatabaseOptions = parse("mysql", &raw).unwrap();
        assert!(db.external);
        assert_eq!(db.rds.database_name.as_deref(), Some("app-db"));
        assert_eq!(db.rds.master_database, "app_db");
        assert!(db.rds.fallback_to_local);
        assert_eq!(db.rds.environment.get("APP_ENV").map(String::as_str), Some("production"));
    }

    #[test]
    fn test_wrong_type_is_config_error() {
        let err = parse::<PhpOptions>("php", &table("version = 8")).unwrap_err();
        assert!(matches!(err, Error::ConfigError(ref m) if m.contains("php")));
    }
}
