// src/os/packages.rs

//! Static package-name table
//!
//! Maps a generic component ("apache", "mysql_server") to the package names
//! and service unit used by each package manager family.

use super::PackageManager;

/// Generic component whose package names differ between distros
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Apache,
    Nginx,
    MysqlServer,
    MysqlClient,
    PostgresqlServer,
    PostgresqlClient,
    Php,
    Python,
    Nodejs,
    Redis,
    Git,
    Curl,
    Wget,
    Unzip,
    Firewall,
}

/// Packages and optional service unit for a component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentPackages {
    pub packages: &'static [&'static str],
    pub service: Option<&'static str>,
}

impl ComponentPackages {
    const fn new(packages: &'static [&'static str], service: Option<&'static str>) -> Self {
        Self { packages, service }
    }

    /// Space-joined package list for an install command
    pub fn joined(&self) -> String {
        self.packages.join(" ")
    }

    /// Service unit, or the given fallback when the component has none
    pub fn service_or(&self, fallback: &'static str) -> &'static str {
        self.service.unwrap_or(fallback)
    }
}

/// Look up packages for a component under a package manager
pub fn packages_for(pm: PackageManager, component: Component) -> ComponentPackages {
    use Component::*;

    if pm.is_rpm_based() {
        return match component {
            Apache => ComponentPackages::new(&["httpd"], Some("httpd")),
            Nginx => ComponentPackages::new(&["nginx"], Some("nginx")),
            MysqlServer => ComponentPackages::new(&["mysql-server"], Some("mysqld")),
            MysqlClient => ComponentPackages::new(&["mysql"], None),
            PostgresqlServer => ComponentPackages::new(
                &["postgresql-server", "postgresql-contrib"],
                Some("postgresql"),
            ),
            PostgresqlClient => ComponentPackages::new(&["postgresql"], None),
            Php => ComponentPackages::new(&["php", "php-fpm"], Some("php-fpm")),
            Python => ComponentPackages::new(&["python3", "python3-pip"], None),
            // NodeSource provides the packages
            Nodejs => ComponentPackages::new(&[], None),
            Redis => ComponentPackages::new(&["redis"], Some("redis")),
            Git => ComponentPackages::new(&["git"], None),
            Curl => ComponentPackages::new(&["curl"], None),
            Wget => ComponentPackages::new(&["wget"], None),
            Unzip => ComponentPackages::new(&["unzip"], None),
            Firewall => ComponentPackages::new(&["firewalld"], Some("firewalld")),
        };
    }

    match component {
        Apache => ComponentPackages::new(&["apache2"], Some("apache2")),
        Nginx => ComponentPackages::new(&["nginx"], Some("nginx")),
        MysqlServer => ComponentPackages::new(&["mysql-server"], Some("mysql")),
        MysqlClient => ComponentPackages::new(&["mysql-client"], None),
        PostgresqlServer => ComponentPackages::new(
            &["postgresql", "postgresql-contrib"],
            Some("postgresql"),
        ),
        PostgresqlClient => ComponentPackages::new(&["postgresql-client"], None),
        Php => ComponentPackages::new(&["php", "php-fpm"], Some("php8.1-fpm")),
        Python => ComponentPackages::new(&["python3", "python3-pip", "python3-venv"], None),
        Nodejs => ComponentPackages::new(&[], None),
        Redis => ComponentPackages::new(&["redis-server"], Some("redis-server")),
        Git => ComponentPackages::new(&["git"], None),
        Curl => ComponentPackages::new(&["curl"], None),
        Wget => ComponentPackages::new(&["wget"], None),
        Unzip => ComponentPackages::new(&["unzip"], None),
        Firewall => ComponentPackages::new(&["ufw"], Some("ufw")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apache_names_differ_by_family() {
        let apt = packages_for(PackageManager::Apt, Component::Apache);
        let yum = packages_for(PackageManager::Yum, Component::Apache);
        assert_eq!(apt.packages, &["apache2"]);
        assert_eq!(yum.service, Some("httpd"));
    }

    #[test]
    fn test_dnf_matches_yum() {
        for component in [Component::Redis, Component::MysqlServer, Component::Firewall] {
            assert_eq!(
                packages_for(PackageManager::Dnf, component),
                packages_for(PackageManager::Yum, component)
            );
        }
    }

    #[test]
    fn test_joined_and_service_fallback() {
        let pg = packages_for(PackageManager::Apt, Component::PostgresqlServer);
        assert_eq!(pg.joined(), "postgresql postgresql-contrib");

        let git = packages_for(PackageManager::Apt, Component::Git);
        assert_eq!(git.service_or("none"), "none");
    }
}
