// src/install/mod.rs

//! Dependency installation on the target host
//!
//! A run moves through fixed phases:
//!
//! 1. Preflight: repair package-manager state and refresh the index once
//! 2. Ordering: enabled dependencies sorted by [`kind::install_order`]
//! 3. Batch: packages shared by several routines installed in one call
//! 4. Loop: for each dependency, wait out the package lock, probe whether it
//!    is already present, otherwise run its routine with bounded retries
//! 5. Summary: the installed/failed partition
//!
//! A failing dependency is recorded and the loop moves on; nothing in here
//! aborts the run. Deciding that the host itself is gone is the caller's job.

pub mod batch;
pub mod database;
pub mod kind;
pub mod options;
pub mod routines;

use crate::cloud::CloudProvider;
use crate::error::{Error, Result};
use crate::lock::{LockWaiter, DEFAULT_LOCK_TIMEOUT};
use crate::os::OsProfile;
use crate::progress::{DependencyStatus, LogProgress, ProgressTracker};
use crate::remote::{CommandRequest, RemoteExecutor};
use database::Placement;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

pub use kind::{install_order, DependencyKind};
use options::{
    ApacheOptions, DatabaseOptions, FirewallOptions, GitOptions, MonitoringOptions, NginxOptions,
    NodejsOptions, PhpOptions, PythonOptions, SslOptions,
};
use routines::Routines;

/// Document root used when no web server sets one
pub const DEFAULT_DOCUMENT_ROOT: &str = "/var/www/html";

const PREFLIGHT_TIMEOUT_SECS: u64 = 180;
const BATCH_TIMEOUT_SECS: u64 = 300;
const PRESENCE_TIMEOUT_SECS: u64 = 30;
const REPAIR_TIMEOUT_SECS: u64 = 60;

/// One entry of the `[dependencies]` table
#[derive(Debug, Clone, PartialEq)]
pub struct DependencySpec {
    pub name: String,
    pub enabled: bool,
    /// The dependency's whole table, read by its routine's options
    pub raw_config: toml::Table,
}

impl DependencySpec {
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            enabled,
            raw_config: toml::Table::new(),
        }
    }

    pub fn with_config(mut self, raw_config: toml::Table) -> Self {
        self.raw_config = raw_config;
        self
    }

    /// Build from a configuration table; `enabled` defaults to false
    pub fn from_table(name: &str, table: &toml::Table) -> Self {
        let enabled = table.get("enabled").and_then(toml::Value::as_bool).unwrap_or(false);
        Self {
            name: name.to_string(),
            enabled,
            raw_config: table.clone(),
        }
    }
}

/// Installed and failed dependency names for one run
///
/// Append-only. A name is recorded at most once and lands in exactly one list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallationLedger {
    installed: Vec<String>,
    failed: Vec<String>,
}

impl InstallationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the name was already recorded
    pub fn record_installed(&mut self, name: &str) -> bool {
        if self.contains(name) {
            return false;
        }
        self.installed.push(name.to_string());
        true
    }

    /// Returns false when the name was already recorded
    pub fn record_failed(&mut self, name: &str) -> bool {
        if self.contains(name) {
            return false;
        }
        self.failed.push(name.to_string());
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.is_installed(name) || self.failed.iter().any(|n| n == name)
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.installed.iter().any(|n| n == name)
    }

    pub fn installed(&self) -> &[String] {
        &self.installed
    }

    pub fn failed(&self) -> &[String] {
        &self.failed
    }
}

/// Result of a run, as printed by the CLI
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallSummary {
    /// True only when nothing failed
    pub success: bool,
    pub installed: Vec<String>,
    pub failed: Vec<String>,
    /// Installed names whose presence probe short-circuited the routine
    pub skipped_already_present: Vec<String>,
    pub total_enabled: usize,
    /// Percentage of enabled dependencies installed
    pub success_rate: f64,
}

/// Retry and wait bounds for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallSettings {
    /// Attempts per remote command
    pub command_attempts: u32,
    /// Attempts per dependency routine
    pub routine_attempts: u32,
    /// Bound on each package-lock wait
    pub lock_timeout: Duration,
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self {
            command_attempts: 3,
            routine_attempts: 2,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/// Installs configured dependencies on one host
pub struct DependencyInstaller<'e, 'a> {
    exec: &'e RemoteExecutor<'a>,
    profile: OsProfile,
    cloud: Option<&'e dyn CloudProvider>,
    progress: Box<dyn ProgressTracker + 'e>,
    settings: InstallSettings,
    ledger: InstallationLedger,
    skipped: Vec<String>,
    /// Where each provisioned database ended up
    placements: BTreeMap<String, Placement>,
    specs: Vec<DependencySpec>,
    total_enabled: usize,
}

impl<'e, 'a> DependencyInstaller<'e, 'a> {
    pub fn new(exec: &'e RemoteExecutor<'a>, profile: OsProfile) -> Self {
        Self {
            exec,
            profile,
            cloud: None,
            progress: Box::new(LogProgress::new()),
            settings: InstallSettings::default(),
            ledger: InstallationLedger::new(),
            skipped: Vec::new(),
            placements: BTreeMap::new(),
            specs: Vec::new(),
            total_enabled: 0,
        }
    }

    /// Needed for managed databases
    pub fn with_cloud(mut self, cloud: &'e dyn CloudProvider) -> Self {
        self.cloud = Some(cloud);
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressTracker + 'e>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_settings(mut self, settings: InstallSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn profile(&self) -> &OsProfile {
        &self.profile
    }

    pub fn ledger(&self) -> &InstallationLedger {
        &self.ledger
    }

    /// Install every enabled dependency and return the run summary
    pub fn install_dependencies(&mut self, deps: &[DependencySpec]) -> InstallSummary {
        let mut enabled: Vec<String> = Vec::new();
        for dep in deps.iter().filter(|d| d.enabled) {
            if !enabled.contains(&dep.name) {
                enabled.push(dep.name.clone());
            }
        }
        self.specs = deps.to_vec();
        self.total_enabled = enabled.len();

        if enabled.is_empty() {
            info!("No dependencies enabled");
            return self.summary();
        }

        info!(
            "Installing {} dependencies on {} ({})",
            enabled.len(),
            self.profile.distro.display_name(),
            self.profile.package_manager
        );

        self.preflight();

        let ordered = install_order(&enabled);
        info!("Installation order: {}", ordered.join(", "));

        self.batch_install(&ordered);

        let total = ordered.len() as u64;
        for (i, name) in ordered.iter().enumerate() {
            if self.ledger.contains(name) {
                continue;
            }
            self.progress.started(name, i as u64 + 1, total);
            let status = self.install_one(name);
            self.progress.finished(name, status);
        }

        let summary = self.summary();
        self.progress
            .done(summary.installed.len() as u64, summary.failed.len() as u64);
        if summary.success {
            info!("All dependencies installed successfully");
        } else {
            warn!("Failed to install: {}", summary.failed.join(", "));
        }
        summary
    }

    fn install_one(&mut self, name: &str) -> DependencyStatus {
        let Some(kind) = DependencyKind::from_name(name) else {
            warn!("Unknown dependency: {}", name);
            self.ledger.record_failed(name);
            return DependencyStatus::Failed;
        };

        let spec = self.spec(name);
        self.lock_waiter().await_release(self.settings.lock_timeout);

        if !self.is_external_database(kind, &spec) && self.is_present(kind) {
            info!("{} is already installed, skipping", name);
            self.ledger.record_installed(name);
            self.skipped.push(name.to_string());
            return DependencyStatus::AlreadyPresent;
        }

        match self.run_with_retries(kind, &spec) {
            Ok(placement) => {
                if let Some(placement) = placement {
                    self.placements.insert(name.to_string(), placement);
                }
                self.ledger.record_installed(name);
                DependencyStatus::Installed
            }
            Err(_) => {
                self.ledger.record_failed(name);
                DependencyStatus::Failed
            }
        }
    }

    /// Run the routine until it succeeds or the attempts run out
    ///
    /// Returns the database placement for database kinds.
    fn run_with_retries(&self, kind: DependencyKind, spec: &DependencySpec) -> Result<Option<Placement>> {
        let attempts = self.settings.routine_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.run_routine(kind, spec) {
                Ok(placement) => {
                    info!("{} installed successfully", kind);
                    return Ok(placement);
                }
                Err(e) if attempt < attempts => {
                    warn!("{} installation attempt {} failed: {}, retrying...", kind, attempt, e);
                }
                Err(e) => {
                    warn!("{} installation failed after {} attempts: {}", kind, attempts, e);
                    return Err(e);
                }
            }

            attempt += 1;
            info!("Retrying {} installation (attempt {}/{})", kind, attempt, attempts);
            self.lock_waiter().await_release(self.settings.lock_timeout);
            self.repair();
        }
    }

    /// Dispatch to the routine for `kind`
    fn run_routine(&self, kind: DependencyKind, spec: &DependencySpec) -> Result<Option<Placement>> {
        let routines = self.routines();
        let name = spec.name.as_str();
        let raw = &spec.raw_config;

        match kind {
            DependencyKind::Mysql | DependencyKind::Postgresql => {
                let opts = options::parse::<DatabaseOptions>(name, raw)?;
                let placement =
                    database::provision(&routines, self.cloud, kind, &opts, &self.document_root())?;
                return Ok(Some(placement));
            }
            DependencyKind::Apache => routines.apache(&options::parse::<ApacheOptions>(name, raw)?)?,
            DependencyKind::Nginx => routines.nginx(&options::parse::<NginxOptions>(name, raw)?)?,
            DependencyKind::Php => routines.php(&options::parse::<PhpOptions>(name, raw)?)?,
            DependencyKind::Python => routines.python(&options::parse::<PythonOptions>(name, raw)?)?,
            DependencyKind::Nodejs => routines.nodejs(&options::parse::<NodejsOptions>(name, raw)?)?,
            DependencyKind::Redis => routines.redis()?,
            DependencyKind::Memcached => routines.memcached()?,
            DependencyKind::Docker => routines.docker()?,
            DependencyKind::Git => routines.git(&options::parse::<GitOptions>(name, raw)?)?,
            DependencyKind::Firewall => routines.firewall(&options::parse::<FirewallOptions>(name, raw)?)?,
            DependencyKind::SslCertificates => {
                routines.ssl_certificates(&options::parse::<SslOptions>(name, raw)?)?
            }
            DependencyKind::Monitoring => {
                routines.monitoring(&options::parse::<MonitoringOptions>(name, raw)?)?
            }
        }
        Ok(None)
    }

    fn preflight(&self) {
        self.progress.phase("Checking package manager health...");
        let pkg = self.profile.pkg();
        let health = if self.profile.is_apt() {
            "if sudo dpkg --audit 2>&1 | grep -q \"broken\"; then sudo dpkg --configure -a; sudo apt-get install -f -y; fi"
                .to_string()
        } else {
            pkg.fix_broken.to_string()
        };
        let outcome = self.exec.execute(
            &CommandRequest::new(health)
                .with_timeout_secs(PREFLIGHT_TIMEOUT_SECS)
                .with_retries(self.settings.command_attempts),
        );
        if !outcome.success {
            warn!("Package manager health check failed: {}", outcome.output);
        }

        self.progress.phase("Updating package index...");
        self.lock_waiter().await_release(self.settings.lock_timeout);
        let update = if self.profile.is_apt() {
            "export DEBIAN_FRONTEND=noninteractive\n\
             sudo apt-get update -qq -o Acquire::Retries=2 -o Acquire::http::Timeout=30"
                .to_string()
        } else {
            pkg.update.to_string()
        };
        let outcome = self.exec.execute(
            &CommandRequest::new(update)
                .with_timeout_secs(PREFLIGHT_TIMEOUT_SECS)
                .with_retries(self.settings.command_attempts),
        );
        if outcome.success {
            info!("Package index updated");
        } else {
            warn!("Package index update failed, continuing: {}", outcome.output);
        }
    }

    fn batch_install(&self, ordered: &[String]) {
        let packages = batch::common_packages(ordered, self.profile.package_manager);
        if packages.is_empty() {
            return;
        }

        self.progress
            .phase(&format!("Installing common packages: {}", packages.join(" ")));
        self.lock_waiter().await_release(self.settings.lock_timeout);
        let script = batch::batch_script(self.profile.pkg().install, &packages, self.profile.package_manager);
        let outcome = self.exec.execute(
            &CommandRequest::new(script)
                .with_timeout_secs(BATCH_TIMEOUT_SECS)
                .with_retries(self.settings.command_attempts),
        );
        if !outcome.success {
            warn!("Batch installation failed, continuing with individual installs: {}", outcome.output);
        }
    }

    /// Authoritative presence probe; kinds without one are never present
    fn is_present(&self, kind: DependencyKind) -> bool {
        let Some(check) = kind.presence_check(&self.profile) else {
            return false;
        };
        self.exec
            .execute(
                &CommandRequest::new(check)
                    .with_timeout_secs(PRESENCE_TIMEOUT_SECS)
                    .with_retries(1),
            )
            .success
    }

    fn repair(&self) {
        let fix = self.profile.pkg().fix_broken;
        let outcome = self.exec.execute(
            &CommandRequest::new(fix)
                .with_timeout_secs(REPAIR_TIMEOUT_SECS)
                .with_retries(1),
        );
        if !outcome.success {
            warn!("Package manager repair failed: {}", outcome.output);
        }
    }

    /// Web root ownership and application database access
    pub fn configure_services(&self) -> bool {
        info!("Configuring installed services...");
        let routines = self.routines();
        let mut ok = true;

        if self.ledger.is_installed("apache") || self.ledger.is_installed("nginx") {
            ok &= routines.soft_step(
                "Configuring web server",
                &routines::web_server_config_script(&self.profile),
                60,
            );
        }

        for kind in [DependencyKind::Mysql, DependencyKind::Postgresql] {
            let name = kind.to_string();
            if !self.ledger.is_installed(&name) {
                continue;
            }
            let spec = self.spec(&name);
            let opts = match options::parse::<DatabaseOptions>(&name, &spec.raw_config) {
                Ok(opts) => opts,
                Err(e) => {
                    warn!("{}", e);
                    ok = false;
                    continue;
                }
            };
            if self.is_managed(&name) {
                info!("{} is managed externally, skipping local access setup", name);
                continue;
            }
            let script = match kind {
                DependencyKind::Mysql => routines::mysql_app_access_script(&opts.config.database_name),
                _ => routines::postgresql_app_access_script(&opts.config.database_name),
            };
            ok &= routines.soft_step(&format!("Configuring {} access", name), &script, 60);
        }

        ok
    }

    /// Restart installed services that run a daemon
    pub fn restart_services(&self) -> bool {
        info!("Restarting services...");
        let routines = self.routines();
        let mut ok = true;

        for name in self.ledger.installed() {
            let Some(kind) = DependencyKind::from_name(name) else {
                continue;
            };
            if self.is_managed(name) {
                continue;
            }
            let Some(service) = kind.service_name(&self.profile) else {
                continue;
            };
            ok &= routines.soft_step(
                &format!("Restarting {}", service),
                &routines::restart_service_script(&self.profile, service),
                60,
            );
        }

        ok
    }

    /// Summary of the run so far
    pub fn summary(&self) -> InstallSummary {
        let installed = self.ledger.installed().to_vec();
        let failed = self.ledger.failed().to_vec();
        let success_rate = installed.len() as f64 / self.total_enabled.max(1) as f64 * 100.0;

        InstallSummary {
            success: failed.is_empty(),
            installed,
            failed,
            skipped_already_present: self.skipped.clone(),
            total_enabled: self.total_enabled,
            success_rate,
        }
    }

    fn routines(&self) -> Routines<'_, 'a> {
        Routines::new(self.exec, &self.profile, self.settings.command_attempts)
    }

    fn lock_waiter(&self) -> LockWaiter<'_, 'a> {
        LockWaiter::new(self.exec, self.profile.package_manager)
    }

    fn spec(&self, name: &str) -> DependencySpec {
        self.specs
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .unwrap_or_else(|| DependencySpec::new(name, true))
    }

    /// True when `name` was provisioned as a managed database
    ///
    /// A database that fell back to a local engine is not managed.
    fn is_managed(&self, name: &str) -> bool {
        self.placements.get(name) == Some(&Placement::Managed)
    }

    fn is_external_database(&self, kind: DependencyKind, spec: &DependencySpec) -> bool {
        kind.is_database()
            && spec
                .raw_config
                .get("external")
                .and_then(toml::Value::as_bool)
                .unwrap_or(false)
    }

    /// Document root of the enabled web server, if any
    fn document_root(&self) -> String {
        for name in ["apache", "nginx"] {
            let Some(spec) = self.specs.iter().find(|s| s.name == name && s.enabled) else {
                continue;
            };
            let root = if name == "apache" {
                options::parse::<ApacheOptions>(name, &spec.raw_config).map(|o| o.config.document_root)
            } else {
                options::parse::<NginxOptions>(name, &spec.raw_config).map(|o| o.config.document_root)
            };
            if let Ok(root) = root {
                return root;
            }
        }
        DEFAULT_DOCUMENT_ROOT.to_string()
    }
}

/// Validate every enabled dependency's options up front
pub fn validate(deps: &[DependencySpec]) -> Result<()> {
    for dep in deps.iter().filter(|d| d.enabled) {
        let Some(kind) = DependencyKind::from_name(&dep.name) else {
            continue;
        };
        let name = dep.name.as_str();
        let raw = &dep.raw_config;
        match kind {
            DependencyKind::Apache => options::parse::<ApacheOptions>(name, raw).map(drop)?,
            DependencyKind::Nginx => options::parse::<NginxOptions>(name, raw).map(drop)?,
            DependencyKind::Mysql | DependencyKind::Postgresql => {
                let opts = options::parse::<DatabaseOptions>(name, raw)?;
                if opts.external && opts.rds.database_name.is_none() {
                    return Err(Error::ConfigError(format!(
                        "{}: rds.database_name is required when external = true",
                        name
                    )));
                }
            }
            DependencyKind::Php => options::parse::<PhpOptions>(name, raw).map(drop)?,
            DependencyKind::Python => options::parse::<PythonOptions>(name, raw).map(drop)?,
            DependencyKind::Nodejs => options::parse::<NodejsOptions>(name, raw).map(drop)?,
            DependencyKind::Git => options::parse::<GitOptions>(name, raw).map(drop)?,
            DependencyKind::Firewall => options::parse::<FirewallOptions>(name, raw).map(drop)?,
            DependencyKind::SslCertificates => options::parse::<SslOptions>(name, raw).map(drop)?,
            DependencyKind::Monitoring => options::parse::<MonitoringOptions>(name, raw).map(drop)?,
            DependencyKind::Redis | DependencyKind::Memcached | DependencyKind::Docker => {}
        }
    }
    Ok(())
}
