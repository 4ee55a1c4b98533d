// src/install/database.rs

//! Database provisioning: local engines and managed databases
//!
//! With `external = true` the host only gets a client, a connectivity check
//! and an environment file pointing the application at the managed
//! database. When any required step of that setup fails, a local engine is
//! provisioned instead unless `rds.fallback_to_local` is switched off.

use super::kind::DependencyKind;
use super::options::DatabaseOptions;
use super::routines::{Routines, LOCAL_APP_PASSWORD, LOCAL_APP_USER};
use crate::cloud::{CloudProvider, ManagedDbConnection};
use crate::error::{Error, Result};
use crate::os::{Component, OsProfile};
use crate::remote::CommandRequest;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Environment file written for the application
pub const ENV_FILE: &str = "/opt/app/database.env";

const CONNECTIVITY_TIMEOUT_SECS: u64 = 45;

/// Where a database ended up after provisioning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Engine installed on the host
    Local,
    /// Client and environment file for a managed database
    Managed,
}

/// Provision `kind` (mysql or postgresql) according to its options
pub fn provision(
    routines: &Routines<'_, '_>,
    cloud: Option<&dyn CloudProvider>,
    kind: DependencyKind,
    opts: &DatabaseOptions,
    document_root: &str,
) -> Result<Placement> {
    if !opts.external {
        install_local(routines, kind, opts)?;
        return Ok(Placement::Local);
    }

    let managed = match cloud {
        Some(cloud) => setup_managed(routines, cloud, opts, document_root),
        None => Err(Error::CloudError("no cloud provider configured".to_string())),
    };

    match managed {
        Ok(()) => Ok(Placement::Managed),
        Err(e) if opts.rds.fallback_to_local => {
            warn!("Managed database setup failed: {}", e);
            warn!("Falling back to local {} installation", kind);
            install_local(routines, kind, opts)?;
            write_environment(routines, &local_environment(kind, opts), document_root)?;
            Ok(Placement::Local)
        }
        Err(e) => Err(e),
    }
}

fn install_local(routines: &Routines<'_, '_>, kind: DependencyKind, opts: &DatabaseOptions) -> Result<()> {
    match kind {
        DependencyKind::Postgresql => routines.postgresql(opts),
        _ => routines.mysql(opts),
    }
}

/// Client, connectivity check and environment file for a managed database
pub fn setup_managed(
    routines: &Routines<'_, '_>,
    cloud: &dyn CloudProvider,
    opts: &DatabaseOptions,
    document_root: &str,
) -> Result<()> {
    let name = opts
        .rds
        .database_name
        .as_deref()
        .ok_or_else(|| Error::ConfigError("rds.database_name is required for external databases".to_string()))?;

    info!("Configuring connection to managed database: {}", name);
    let conn = cloud.managed_db_connection(name)?;
    info!("Managed database endpoint: {}:{}", conn.endpoint, conn.port);

    let profile = routines.profile();
    let client = client_script(profile, conn.is_mysql());
    routines.step("Installing database client", &client, 300)?;

    if test_connectivity(routines, &conn, &opts.rds.master_database) {
        info!("Managed database connectivity verified");
    } else {
        warn!("Managed database connectivity test failed, continuing with configuration");
    }

    write_environment(routines, &environment(&conn, opts), document_root)?;
    info!("Managed database configured, environment written to {}", ENV_FILE);
    Ok(())
}

/// Narrate `vars` masked and write them to the environment file
fn write_environment(
    routines: &Routines<'_, '_>,
    vars: &BTreeMap<String, String>,
    document_root: &str,
) -> Result<()> {
    for (key, value) in masked(vars) {
        info!("  {}={}", key, value);
    }

    // The file carries the password, so it stays out of the audit log
    let mut request = CommandRequest::new(env_file_script(routines.profile(), vars, document_root))
        .with_timeout_secs(60)
        .unaudited();
    for secret in secret_values(vars) {
        request = request.redacting(secret);
    }
    routines
        .executor()
        .execute(&request)
        .into_result("Writing database environment file")?;
    Ok(())
}

/// Shell script installing only the database client
pub fn client_script(profile: &OsProfile, mysql: bool) -> String {
    let component = if mysql {
        Component::MysqlClient
    } else {
        Component::PostgresqlClient
    };
    format!(
        "set -e\necho \"Installing database client...\"\n{} {}\n",
        profile.pkg().install,
        profile.packages(component).joined()
    )
}

/// Connectivity check command, or `None` when there is no password
pub fn connectivity_command(conn: &ManagedDbConnection, database: &str) -> Option<String> {
    let password = conn.password.as_deref()?;
    let cmd = if conn.is_mysql() {
        format!(
            "timeout 30 mysql -h {} -P {} -u {} -p'{}' -e \"SELECT 1 as test_connection;\" {}",
            conn.endpoint, conn.port, conn.username, password, database
        )
    } else {
        format!(
            "PGPASSWORD='{}' timeout 30 psql -h {} -p {} -U {} -d {} -c \"SELECT 1 as test_connection;\"",
            password, conn.endpoint, conn.port, conn.username, database
        )
    };
    Some(cmd)
}

fn test_connectivity(routines: &Routines<'_, '_>, conn: &ManagedDbConnection, database: &str) -> bool {
    let Some(cmd) = connectivity_command(conn, database) else {
        warn!("No password available for managed database, skipping connectivity test");
        return false;
    };
    info!("Testing managed database connectivity...");
    let password = conn.password.clone().unwrap_or_default();
    routines
        .executor()
        .execute(
            &CommandRequest::new(cmd)
                .with_timeout_secs(CONNECTIVITY_TIMEOUT_SECS)
                .unaudited()
                .redacting(password),
        )
        .success
}

/// Variables written to the application environment file
pub fn environment(conn: &ManagedDbConnection, opts: &DatabaseOptions) -> BTreeMap<String, String> {
    let (db_type, scheme) = if conn.is_mysql() {
        ("MYSQL", "mysql")
    } else {
        ("POSTGRESQL", "postgresql")
    };
    let password = conn.password.clone().unwrap_or_default();
    let database = &opts.rds.master_database;

    let mut vars = BTreeMap::new();
    vars.insert("DB_TYPE".to_string(), db_type.to_string());
    vars.insert("DB_HOST".to_string(), conn.endpoint.clone());
    vars.insert("DB_PORT".to_string(), conn.port.to_string());
    vars.insert("DB_NAME".to_string(), database.clone());
    vars.insert("DB_USERNAME".to_string(), conn.username.clone());
    vars.insert("DB_PASSWORD".to_string(), password.clone());
    vars.insert("DB_CHARSET".to_string(), "utf8mb4".to_string());
    vars.insert("DB_EXTERNAL".to_string(), "true".to_string());
    vars.insert(
        "DATABASE_URL".to_string(),
        format!(
            "{}://{}:{}@{}:{}/{}",
            scheme, conn.username, password, conn.endpoint, conn.port, database
        ),
    );
    for (key, value) in &opts.rds.environment {
        vars.insert(key.clone(), value.clone());
    }
    vars
}

/// Variables for a local engine set up in place of a managed database
///
/// Credentials match the application account created by
/// `configure_services`.
pub fn local_environment(kind: DependencyKind, opts: &DatabaseOptions) -> BTreeMap<String, String> {
    let (db_type, scheme, port, charset) = match kind {
        DependencyKind::Postgresql => ("POSTGRESQL", "postgresql", 5432, "utf8"),
        _ => ("MYSQL", "mysql", 3306, "utf8mb4"),
    };
    let database = &opts.config.database_name;

    let mut vars = BTreeMap::new();
    vars.insert("DB_TYPE".to_string(), db_type.to_string());
    vars.insert("DB_HOST".to_string(), "localhost".to_string());
    vars.insert("DB_PORT".to_string(), port.to_string());
    vars.insert("DB_NAME".to_string(), database.clone());
    vars.insert("DB_USERNAME".to_string(), LOCAL_APP_USER.to_string());
    vars.insert("DB_PASSWORD".to_string(), LOCAL_APP_PASSWORD.to_string());
    vars.insert("DB_CHARSET".to_string(), charset.to_string());
    vars.insert("DB_EXTERNAL".to_string(), "false".to_string());
    vars.insert(
        "DATABASE_URL".to_string(),
        format!(
            "{}://{}:{}@localhost:{}/{}",
            scheme, LOCAL_APP_USER, LOCAL_APP_PASSWORD, port, database
        ),
    );
    for (key, value) in &opts.rds.environment {
        vars.insert(key.clone(), value.clone());
    }
    vars
}

fn is_secret(key: &str) -> bool {
    key.contains("PASSWORD") || key == "DATABASE_URL"
}

/// Non-empty values of secret variables
fn secret_values(vars: &BTreeMap<String, String>) -> Vec<String> {
    vars.iter()
        .filter(|(key, value)| is_secret(key) && !value.is_empty())
        .map(|(_, value)| value.clone())
        .collect()
}

/// Copy of `vars` safe to narrate
pub fn masked(vars: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    vars.iter()
        .map(|(key, value)| {
            let shown = if is_secret(key) {
                "***".to_string()
            } else {
                value.clone()
            };
            (key.clone(), shown)
        })
        .collect()
}

/// Write the environment file and a copy into the document root
pub fn env_file_script(profile: &OsProfile, vars: &BTreeMap<String, String>, document_root: &str) -> String {
    let users = &profile.users;
    let body: String = vars
        .iter()
        .map(|(key, value)| format!("{}={}\n", key, value))
        .collect();

    format!(
        r#"set -e
sudo mkdir -p /opt/app
cat << 'EOF' | sudo tee {env_file} > /dev/null
{body}EOF
sudo chmod 640 {env_file}
sudo chown root:{group} {env_file}
sudo mkdir -p {root}
sudo cp {env_file} {root}/.env
sudo chmod 640 {root}/.env
sudo chown {user}:{group} {root}/.env
echo "Database environment configured"
"#,
        env_file = ENV_FILE,
        body = body,
        root = document_root,
        user = users.web_user,
        group = users.web_group,
    )
}
