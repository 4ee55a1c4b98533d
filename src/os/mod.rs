// src/os/mod.rs

//! Operating system profiles for the target host
//!
//! A profile is resolved once per run from the instance blueprint and is read
//! by every other component. Detection matches the combined blueprint id and
//! display name against a fixed list of signatures; the first match wins.
//!
//! Unrecognized inputs never fail. Everything falls back to the Debian-like
//! defaults (apt, systemd, the `ubuntu` login user).

pub mod packages;

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

pub use packages::{packages_for, Component, ComponentPackages};

/// Broad OS family, decides which command dialect is used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OsFamily {
    DebianLike,
    RhelLike,
}

/// Concrete distribution detected from the blueprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Distro {
    Ubuntu,
    AmazonLinux,
    CentOs,
    Rhel,
    /// No signature matched; treated as Ubuntu-like
    Unknown,
}

impl Distro {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ubuntu => "ubuntu",
            Self::AmazonLinux => "amazon_linux",
            Self::CentOs => "centos",
            Self::Rhel => "rhel",
            Self::Unknown => "unknown",
        }
    }

    /// Human readable form used in narration ("amazon linux")
    pub fn display_name(&self) -> String {
        self.as_str().replace('_', " ")
    }
}

impl fmt::Display for Distro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Package manager on the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageManager {
    Apt,
    Yum,
    Dnf,
}

impl PackageManager {
    /// Parse a package manager name, falling back to apt
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "yum" => Self::Yum,
            "dnf" => Self::Dnf,
            _ => Self::Apt,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apt => "apt",
            Self::Yum => "yum",
            Self::Dnf => "dnf",
        }
    }

    /// True for the RPM-based managers (yum and dnf share one dialect)
    pub fn is_rpm_based(&self) -> bool {
        matches!(self, Self::Yum | Self::Dnf)
    }

    /// Lock files whose holders block installs
    pub fn lock_files(&self) -> &'static [&'static str] {
        match self {
            Self::Apt => &["/var/lib/dpkg/lock-frontend", "/var/lib/dpkg/lock"],
            Self::Yum | Self::Dnf => &["/var/run/yum.pid"],
        }
    }

    /// Process names killed when a lock is never released
    pub fn lock_holders(&self) -> &'static [&'static str] {
        match self {
            Self::Apt => &["apt", "apt-get", "dpkg"],
            Self::Yum | Self::Dnf => &["yum", "dnf"],
        }
    }

    /// Name shown while waiting on the lock ("dpkg lock", "yum lock")
    pub fn lock_label(&self) -> &'static str {
        match self {
            Self::Apt => "dpkg",
            Self::Yum => "yum",
            Self::Dnf => "dnf",
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service manager on the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceManager {
    Systemd,
}

impl ServiceManager {
    /// Parse a service manager name; every modern target runs systemd
    pub fn from_name(_name: &str) -> Self {
        Self::Systemd
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Systemd => "systemd",
        }
    }
}

/// Login and web-server accounts for a distro
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub default_user: &'static str,
    pub web_user: &'static str,
    pub web_group: &'static str,
}

/// Resolved OS conventions for the target host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OsProfile {
    pub distro: Distro,
    pub family: OsFamily,
    pub package_manager: PackageManager,
    pub service_manager: ServiceManager,
    pub users: UserInfo,
}

impl OsProfile {
    /// Build the profile for a known distro
    pub fn for_distro(distro: Distro) -> Self {
        let (family, package_manager) = match distro {
            Distro::Ubuntu | Distro::Unknown => (OsFamily::DebianLike, PackageManager::Apt),
            Distro::AmazonLinux | Distro::CentOs | Distro::Rhel => {
                (OsFamily::RhelLike, PackageManager::Yum)
            }
        };

        Self {
            distro,
            family,
            package_manager,
            service_manager: ServiceManager::Systemd,
            users: user_info(distro),
        }
    }

    pub fn pkg(&self) -> PackageManagerCommands {
        package_manager_commands(self.package_manager)
    }

    pub fn svc(&self) -> ServiceCommands {
        service_commands(self.service_manager)
    }

    pub fn is_apt(&self) -> bool {
        self.package_manager == PackageManager::Apt
    }

    /// OS-specific package names and service for a component
    pub fn packages(&self, component: Component) -> ComponentPackages {
        packages_for(self.package_manager, component)
    }
}

impl Default for OsProfile {
    fn default() -> Self {
        Self::for_distro(Distro::Unknown)
    }
}

/// Blueprint signatures in priority order
static SIGNATURES: LazyLock<Vec<(Distro, Regex)>> = LazyLock::new(|| {
    let table: &[(Distro, &str)] = &[
        (Distro::Ubuntu, r"(?i)ubuntu"),
        (Distro::AmazonLinux, r"(?i)amazon.*linux|amzn"),
        (Distro::CentOs, r"(?i)centos"),
        (Distro::Rhel, r"(?i)rhel|red.*hat|redhat"),
    ];
    table
        .iter()
        .map(|(distro, pattern)| (*distro, Regex::new(pattern).unwrap()))
        .collect()
});

/// Detect the OS profile from blueprint information
///
/// Examples: `ubuntu_22_04`, `amazon_linux_2023`, `centos_7_2009_01`.
pub fn detect(blueprint_id: &str, blueprint_name: &str) -> OsProfile {
    let search_text = format!("{} {}", blueprint_id, blueprint_name);

    let distro = SIGNATURES
        .iter()
        .find(|(_, re)| re.is_match(&search_text))
        .map(|(distro, _)| *distro)
        .unwrap_or(Distro::Unknown);

    OsProfile::for_distro(distro)
}

/// Package manager command prefixes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManagerCommands {
    pub update: &'static str,
    pub install: &'static str,
    pub remove: &'static str,
    pub fix_broken: &'static str,
    pub search: &'static str,
    pub info: &'static str,
    pub check_installed: &'static str,
}

/// Command prefixes for a package manager
pub fn package_manager_commands(pm: PackageManager) -> PackageManagerCommands {
    match pm {
        PackageManager::Apt => PackageManagerCommands {
            update: "sudo apt-get update -qq",
            install: "sudo DEBIAN_FRONTEND=noninteractive apt-get install -y",
            remove: "sudo apt-get remove -y",
            fix_broken: "sudo dpkg --configure -a && sudo apt-get install -f -y",
            search: "apt-cache search",
            info: "apt-cache show",
            check_installed: "dpkg -l | grep -q",
        },
        // Amazon Linux 2023 aliases yum to dnf
        PackageManager::Yum | PackageManager::Dnf => PackageManagerCommands {
            update: "sudo yum update -y",
            install: "sudo yum install -y",
            remove: "sudo yum remove -y",
            fix_broken: "sudo yum clean all && sudo yum makecache",
            search: "yum search",
            info: "yum info",
            check_installed: "rpm -q",
        },
    }
}

/// Service manager command prefixes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCommands {
    pub start: &'static str,
    pub stop: &'static str,
    pub restart: &'static str,
    pub enable: &'static str,
    pub disable: &'static str,
    pub status: &'static str,
    pub is_active: &'static str,
    pub reload: &'static str,
}

/// Command prefixes for a service manager
pub fn service_commands(sm: ServiceManager) -> ServiceCommands {
    match sm {
        ServiceManager::Systemd => ServiceCommands {
            start: "sudo systemctl start",
            stop: "sudo systemctl stop",
            restart: "sudo systemctl restart",
            enable: "sudo systemctl enable",
            disable: "sudo systemctl disable",
            status: "sudo systemctl status",
            is_active: "systemctl is-active --quiet",
            reload: "sudo systemctl daemon-reload",
        },
    }
}

/// Login and web accounts for a distro
pub fn user_info(distro: Distro) -> UserInfo {
    match distro {
        Distro::Ubuntu | Distro::Unknown => UserInfo {
            default_user: "ubuntu",
            web_user: "www-data",
            web_group: "www-data",
        },
        Distro::AmazonLinux | Distro::Rhel => UserInfo {
            default_user: "ec2-user",
            web_user: "nginx",
            web_group: "nginx",
        },
        Distro::CentOs => UserInfo {
            default_user: "centos",
            web_user: "nginx",
            web_group: "nginx",
        },
    }
}
