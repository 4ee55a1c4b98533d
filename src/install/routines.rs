// src/install/routines.rs

//! Per-dependency install routines
//!
//! Each routine is a short sequence of executor calls: install packages,
//! enable the service, apply settings, start it. Script text is built by
//! free functions so it can be checked without a host; [`Routines`] runs
//! it and turns the first failing step into an [`Error::InstallError`].

use super::options::{
    ApacheOptions, DatabaseOptions, FirewallOptions, GitOptions, MonitoringOptions, NginxOptions,
    NodejsOptions, PhpOptions, PythonOptions, SslOptions,
};
use crate::error::Result;
use crate::os::{Component, OsProfile, PackageManager};
use crate::remote::{CommandRequest, RemoteExecutor};
use tracing::{info, warn};

/// Runs install routines against one host
pub struct Routines<'r, 'a> {
    exec: &'r RemoteExecutor<'a>,
    profile: &'r OsProfile,
    /// Attempts per remote command
    command_attempts: u32,
}

impl<'r, 'a> Routines<'r, 'a> {
    pub fn new(exec: &'r RemoteExecutor<'a>, profile: &'r OsProfile, command_attempts: u32) -> Self {
        Self {
            exec,
            profile,
            command_attempts,
        }
    }

    pub fn profile(&self) -> &OsProfile {
        self.profile
    }

    pub fn executor(&self) -> &RemoteExecutor<'a> {
        self.exec
    }

    /// Run a required step; failure aborts the routine
    pub fn step(&self, what: &str, script: &str, timeout_secs: u64) -> Result<String> {
        self.exec
            .execute(
                &CommandRequest::new(script)
                    .with_timeout_secs(timeout_secs)
                    .with_retries(self.command_attempts),
            )
            .into_result(what)
    }

    /// Run an optional step; failure is only narrated
    pub fn soft_step(&self, what: &str, script: &str, timeout_secs: u64) -> bool {
        match self.step(what, script, timeout_secs) {
            Ok(_) => true,
            Err(e) => {
                warn!("{} failed, but continuing... ({})", what, e);
                false
            }
        }
    }

    pub fn apache(&self, opts: &ApacheOptions) -> Result<()> {
        let profile = self.profile;
        let pkg = profile.pkg();
        let svc = profile.svc();
        let apache = profile.packages(Component::Apache);
        let service = apache.service_or("apache2");
        let root = &opts.config.document_root;
        let users = &profile.users;

        info!("Installing Apache web server on {}...", profile.distro);

        self.step("Installing Apache packages", &format!("{} {}", pkg.install, apache.joined()), 300)?;
        self.step("Enabling Apache service", &format!("{} {}", svc.enable, service), 60)?;
        self.step("Creating document root", &format!("sudo mkdir -p {}", root), 60)?;
        self.step(
            "Setting document root ownership",
            &format!("sudo chown -R {}:{} {}", users.web_user, users.web_group, root),
            60,
        )?;
        self.step("Setting document root permissions", &format!("sudo chmod -R 755 {}", root), 60)?;

        if opts.config.enable_rewrite && profile.is_apt() {
            self.soft_step("Enabling mod_rewrite", "sudo a2enmod rewrite", 60);
        }
        if opts.hide_version {
            self.soft_step("Configuring security settings", &apache_security_script(profile.package_manager), 60);
        }

        self.step("Starting Apache", &format!("{} {}", svc.start, service), 60)?;
        self.step("Reloading Apache configuration", &format!("{} {}", svc.restart, service), 60)?;
        Ok(())
    }

    pub fn nginx(&self, opts: &NginxOptions) -> Result<()> {
        self.step("Installing Nginx", &nginx_script(self.profile, opts), 420)?;
        Ok(())
    }

    /// Local database engine
    pub fn mysql(&self, opts: &DatabaseOptions) -> Result<()> {
        info!("Installing local MySQL database server on {}...", self.profile.distro);
        let outcome = self
            .exec
            .execute_live(&mysql_script(self.profile, opts), std::time::Duration::from_secs(300));
        outcome.into_result("Installing MySQL")?;
        Ok(())
    }

    /// Local database engine
    pub fn postgresql(&self, opts: &DatabaseOptions) -> Result<()> {
        info!("Installing local PostgreSQL database server on {}...", self.profile.distro);
        self.step("Installing PostgreSQL", &postgresql_script(self.profile, opts), 300)?;
        Ok(())
    }

    pub fn php(&self, opts: &PhpOptions) -> Result<()> {
        self.step("Installing PHP", &php_script(self.profile, opts), 300)?;
        Ok(())
    }

    pub fn python(&self, opts: &PythonOptions) -> Result<()> {
        self.step("Installing Python", &python_script(self.profile, opts), 300)?;
        if !opts.config.pip_packages.is_empty() {
            self.step("Installing Python packages", &pip_script(opts), 420)?;
        }
        Ok(())
    }

    pub fn nodejs(&self, opts: &NodejsOptions) -> Result<()> {
        self.step("Installing Node.js", &nodejs_script(self.profile, opts), 300)?;
        if !opts.config.npm_packages.is_empty() {
            self.step("Installing Node.js packages", &npm_script(opts), 420)?;
        }
        Ok(())
    }

    pub fn redis(&self) -> Result<()> {
        let redis = self.profile.packages(Component::Redis);
        let script = service_package_script(
            self.profile,
            "Redis",
            &redis.joined(),
            redis.service_or("redis-server"),
        );
        self.step("Installing Redis", &script, 420)?;
        Ok(())
    }

    pub fn memcached(&self) -> Result<()> {
        let script = service_package_script(self.profile, "Memcached", "memcached", "memcached");
        self.step("Installing Memcached", &script, 420)?;
        Ok(())
    }

    pub fn docker(&self) -> Result<()> {
        self.step("Installing Docker", &docker_script(self.profile), 240)?;
        Ok(())
    }

    pub fn git(&self, opts: &GitOptions) -> Result<()> {
        self.step("Installing Git", &git_script(self.profile, opts), 420)?;
        Ok(())
    }

    pub fn firewall(&self, opts: &FirewallOptions) -> Result<()> {
        self.step("Configuring firewall", &firewall_script(self.profile, opts), 120)?;
        Ok(())
    }

    pub fn ssl_certificates(&self, opts: &SslOptions) -> Result<()> {
        match ssl_script(self.profile, opts) {
            Some(script) => {
                self.step("Installing Certbot", &script, 420)?;
            }
            None => warn!("SSL provider '{}' not implemented, skipping", opts.config.provider),
        }
        Ok(())
    }

    pub fn monitoring(&self, opts: &MonitoringOptions) -> Result<()> {
        let install = self.profile.pkg().install;
        let script = format!(
            "set -e\necho \"Installing monitoring tools...\"\n{} {}\necho \"Monitoring tools installed\"\n",
            install,
            opts.config.tools.join(" ")
        );
        self.step("Installing monitoring tools", &script, 420)?;
        Ok(())
    }
}

/// Hide server version details in Apache responses
pub fn apache_security_script(pm: PackageManager) -> String {
    if pm == PackageManager::Apt {
        "echo \"ServerTokens Prod\" | sudo tee -a /etc/apache2/conf-available/security.conf\n\
         echo \"ServerSignature Off\" | sudo tee -a /etc/apache2/conf-available/security.conf\n\
         sudo a2enconf security 2>/dev/null || true\n"
            .to_string()
    } else {
        "echo \"ServerTokens Prod\" | sudo tee -a /etc/httpd/conf/httpd.conf\n\
         echo \"ServerSignature Off\" | sudo tee -a /etc/httpd/conf/httpd.conf\n"
            .to_string()
    }
}

pub fn nginx_script(profile: &OsProfile, opts: &NginxOptions) -> String {
    let nginx = profile.packages(Component::Nginx);
    let service = nginx.service_or("nginx");
    let svc = profile.svc();
    let users = &profile.users;

    format!(
        r#"set -e
echo "Installing Nginx web server on {distro}..."
{install} {packages}
{enable} {service}
DOCUMENT_ROOT="{root}"
sudo mkdir -p "$DOCUMENT_ROOT"
sudo chown -R {user}:{group} "$DOCUMENT_ROOT"
sudo chmod -R 755 "$DOCUMENT_ROOT"
{start} {service}
echo "Nginx installation completed"
"#,
        distro = profile.distro,
        install = profile.pkg().install,
        packages = nginx.joined(),
        enable = svc.enable,
        start = svc.start,
        service = service,
        root = opts.config.document_root,
        user = users.web_user,
        group = users.web_group,
    )
}

pub fn mysql_script(profile: &OsProfile, opts: &DatabaseOptions) -> String {
    let mysql = profile.packages(Component::MysqlServer);
    let service = mysql.service_or("mysql");
    let svc = profile.svc();

    let mut script = String::from("set -e\necho \"Installing MySQL database server...\"\n");
    if profile.is_apt() {
        script.push_str("export DEBIAN_FRONTEND=noninteractive\n");
    }
    script.push_str(&format!(
        "{install} {packages}\n{enable} {service}\n{start} {service}\n",
        install = profile.pkg().install,
        packages = mysql.joined(),
        enable = svc.enable,
        start = svc.start,
        service = service,
    ));
    script.push_str(
        "sudo mysql -e \"ALTER USER 'root'@'localhost' IDENTIFIED WITH mysql_native_password BY 'root123';\" || true\n",
    );
    if opts.config.create_app_database {
        script.push_str(&format!(
            "sudo mysql -u root -proot123 -e \"CREATE DATABASE IF NOT EXISTS {};\" || true\n",
            opts.config.database_name
        ));
    }
    script.push_str("echo \"MySQL installation completed\"\n");
    script
}

pub fn postgresql_script(profile: &OsProfile, opts: &DatabaseOptions) -> String {
    let pg = profile.packages(Component::PostgresqlServer);
    let service = pg.service_or("postgresql");
    let svc = profile.svc();

    let mut script = format!(
        "set -e\necho \"Installing PostgreSQL database server...\"\n{install} {packages}\n",
        install = profile.pkg().install,
        packages = pg.joined(),
    );
    if profile.package_manager.is_rpm_based() {
        script.push_str("sudo postgresql-setup --initdb 2>/dev/null || true\n");
    }
    script.push_str(&format!(
        "{enable} {service}\n{start} {service}\n",
        enable = svc.enable,
        start = svc.start,
        service = service,
    ));
    if opts.config.create_app_database {
        script.push_str(&format!(
            "sudo -u postgres createdb \"{}\" || true\n",
            opts.config.database_name
        ));
    }
    script.push_str("echo \"PostgreSQL installation completed\"\n");
    script
}

/// Distro packages for the requested PHP extensions
pub fn php_extension_packages(extensions: &[String], version: &str, pm: PackageManager) -> Vec<String> {
    let apt = pm == PackageManager::Apt;
    let mut packages = Vec::new();

    for ext in extensions {
        match ext.as_str() {
            // Built into php-common / PHP 8
            "pdo" | "json" => {}
            "pdo_mysql" | "mysql" if apt => {
                packages.push("php-mysql".to_string());
                packages.push(format!("php{}-mysql", version));
            }
            "pdo_mysql" | "mysql" => packages.push("php-mysqlnd".to_string()),
            "pdo_pgsql" | "pgsql" if apt => {
                packages.push("php-pgsql".to_string());
                packages.push(format!("php{}-pgsql", version));
            }
            "pdo_pgsql" | "pgsql" => packages.push("php-pgsql".to_string()),
            "redis" if apt => {
                packages.push("php-redis".to_string());
                packages.push(format!("php{}-redis", version));
            }
            other => packages.push(format!("php-{}", other)),
        }
    }
    packages
}

pub fn php_script(profile: &OsProfile, opts: &PhpOptions) -> String {
    let pkg = profile.pkg();
    let svc = profile.svc();
    let version = &opts.version;
    let apache_service = profile.packages(Component::Apache).service_or("apache2");
    let extensions = php_extension_packages(&opts.config.extensions, version, profile.package_manager).join(" ");

    let composer = if opts.config.enable_composer {
        "curl -sS https://getcomposer.org/installer | php\n\
         sudo mv composer.phar /usr/local/bin/composer\n\
         sudo chmod +x /usr/local/bin/composer\n"
    } else {
        ""
    };

    if profile.is_apt() {
        format!(
            r#"set -e
echo "Installing PHP {version}..."
if ! grep -q "ondrej/php" /etc/apt/sources.list /etc/apt/sources.list.d/* 2>/dev/null; then
    {install} software-properties-common
    sudo add-apt-repository -y ppa:ondrej/php
    {update}
fi
{install} php{version} php{version}-fpm {extensions}
{composer}if {is_active} {apache}; then
    {install} libapache2-mod-php{version}
    sudo a2enmod php{version}
    {restart} {apache}
fi
echo "PHP {version} installation completed"
"#,
            version = version,
            install = pkg.install,
            update = pkg.update,
            extensions = extensions,
            composer = composer,
            is_active = svc.is_active,
            restart = svc.restart,
            apache = apache_service,
        )
    } else {
        format!(
            r#"set -e
echo "Installing PHP {version}..."
if ! rpm -q epel-release >/dev/null 2>&1; then
    {install} epel-release
fi
{install} php php-fpm {extensions}
{composer}if {is_active} {apache}; then
    {restart} {apache}
fi
echo "PHP installation completed"
"#,
            version = version,
            install = pkg.install,
            extensions = extensions,
            composer = composer,
            is_active = svc.is_active,
            restart = svc.restart,
            apache = apache_service,
        )
    }
}

/// Application account created on local database engines
pub const LOCAL_APP_USER: &str = "app";
pub const LOCAL_APP_PASSWORD: &str = "app123";

/// Location of the application virtualenv
pub const VENV_PATH: &str = "/opt/python-venv/app";

fn uses_system_python(version: &str) -> bool {
    version == "3" || version == "3.10"
}

pub fn python_script(profile: &OsProfile, opts: &PythonOptions) -> String {
    let install = profile.pkg().install;
    let version = &opts.version;
    let users = &profile.users;

    let mut script = format!("set -e\necho \"Installing Python {}...\"\n", version);

    let interpreter = if profile.is_apt() {
        let system = format!("{} python3 python3-pip python3-dev python3.10-venv", install);
        if uses_system_python(version) {
            script.push_str(&system);
            script.push('\n');
            "python3".to_string()
        } else {
            script.push_str(&format!(
                "{install} python{v} python{v}-venv python{v}-dev || {system}\n",
                install = install,
                v = version,
                system = system,
            ));
            format!("python{}", version)
        }
    } else {
        script.push_str(&format!(
            "{} {}\n",
            install,
            profile.packages(Component::Python).joined()
        ));
        "python3".to_string()
    };

    if opts.config.virtual_env {
        script.push_str("sudo mkdir -p /opt/python-venv\n");
        if interpreter == "python3" {
            script.push_str(&format!("sudo python3 -m venv {}\n", VENV_PATH));
        } else {
            script.push_str(&format!(
                "sudo {} -m venv {venv} || sudo python3 -m venv {venv}\n",
                interpreter,
                venv = VENV_PATH
            ));
        }
        script.push_str(&format!(
            "sudo chown -R {}:{} /opt/python-venv\n",
            users.web_user, users.web_group
        ));
    }

    script.push_str("echo \"Python installation completed\"\n");
    script
}

pub fn pip_script(opts: &PythonOptions) -> String {
    let packages = opts.config.pip_packages.join(" ");
    format!(
        r#"set -e
echo "Installing Python packages: {packages}"
if [ -d "{venv}" ]; then
    sudo {venv}/bin/pip install --upgrade pip
    sudo {venv}/bin/pip install {packages}
else
    sudo pip3 install {packages}
fi
echo "Python packages installed"
"#,
        packages = packages,
        venv = VENV_PATH,
    )
}

pub fn nodejs_script(profile: &OsProfile, opts: &NodejsOptions) -> String {
    let pkg = profile.pkg();
    let version = &opts.version;
    let yarn = opts.config.package_manager == "yarn";

    let mut script = format!("set -e\necho \"Installing Node.js {}...\"\n", version);
    if profile.is_apt() {
        script.push_str(&format!(
            "curl -fsSL https://deb.nodesource.com/setup_{}.x | sudo -E bash -\n{} nodejs\n",
            version, pkg.install
        ));
        if yarn {
            script.push_str(&format!(
                "curl -sS https://dl.yarnpkg.com/debian/pubkey.gpg | sudo apt-key add -\n\
                 echo \"deb https://dl.yarnpkg.com/debian/ stable main\" | sudo tee /etc/apt/sources.list.d/yarn.list\n\
                 {}\n{} yarn\n",
                pkg.update, pkg.install
            ));
        }
    } else {
        script.push_str(&format!(
            "curl -fsSL https://rpm.nodesource.com/setup_{}.x | sudo bash -\n{} nodejs\n",
            version, pkg.install
        ));
        if yarn {
            script.push_str(&format!(
                "curl -sL https://dl.yarnpkg.com/rpm/yarn.repo | sudo tee /etc/yum.repos.d/yarn.repo\n{} yarn\n",
                pkg.install
            ));
        }
    }
    script.push_str("echo \"Node.js installation completed\"\n");
    script
}

pub fn npm_script(opts: &NodejsOptions) -> String {
    let packages = opts.config.npm_packages.join(" ");
    format!(
        "set -e\necho \"Installing Node.js packages: {packages}\"\nsudo {pm} install -g {packages}\necho \"Node.js packages installed\"\n",
        packages = packages,
        pm = opts.config.package_manager,
    )
}

/// Install a package, enable and start its service
pub fn service_package_script(profile: &OsProfile, label: &str, packages: &str, service: &str) -> String {
    let svc = profile.svc();
    format!(
        "set -e\necho \"Installing {label}...\"\n{install} {packages}\n{enable} {service}\n{start} {service}\necho \"{label} installation completed\"\n",
        label = label,
        install = profile.pkg().install,
        packages = packages,
        enable = svc.enable,
        start = svc.start,
        service = service,
    )
}

pub fn docker_script(profile: &OsProfile) -> String {
    let svc = profile.svc();
    if profile.is_apt() {
        format!(
            r#"set -e
echo "Installing Docker..."
sudo apt-get remove -y docker docker-engine docker.io containerd runc 2>/dev/null || true
{install} ca-certificates curl gnupg lsb-release
sudo install -m 0755 -d /etc/apt/keyrings
curl -fsSL https://download.docker.com/linux/ubuntu/gpg | sudo gpg --dearmor -o /etc/apt/keyrings/docker.gpg --yes
sudo chmod a+r /etc/apt/keyrings/docker.gpg
echo "deb [arch=$(dpkg --print-architecture) signed-by=/etc/apt/keyrings/docker.gpg] https://download.docker.com/linux/ubuntu $(lsb_release -cs) stable" | sudo tee /etc/apt/sources.list.d/docker.list > /dev/null
{update}
{install} docker-ce docker-ce-cli containerd.io docker-buildx-plugin docker-compose-plugin
{start} docker
{enable} docker
docker --version
echo "Docker installation completed"
"#,
            install = profile.pkg().install,
            update = profile.pkg().update,
            start = svc.start,
            enable = svc.enable,
        )
    } else {
        format!(
            r#"set -e
echo "Installing Docker..."
{install} docker
{start} docker
{enable} docker
docker --version
echo "Docker installation completed"
"#,
            install = profile.pkg().install,
            start = svc.start,
            enable = svc.enable,
        )
    }
}

pub fn git_script(profile: &OsProfile, opts: &GitOptions) -> String {
    let install = profile.pkg().install;
    let mut script = format!(
        "set -e\necho \"Installing Git...\"\n{} {}\n",
        install,
        profile.packages(Component::Git).joined()
    );
    if opts.config.install_lfs && profile.is_apt() {
        script.push_str(&format!(
            "curl -s https://packagecloud.io/install/repositories/github/git-lfs/script.deb.sh | sudo bash\n{} git-lfs\n",
            install
        ));
    }
    script.push_str("echo \"Git installation completed\"\n");
    script
}

pub fn firewall_script(profile: &OsProfile, opts: &FirewallOptions) -> String {
    let install = profile.pkg().install;
    let ports = opts.config.ports_with_ssh();
    let svc = profile.svc();

    if profile.is_apt() {
        let mut script = format!(
            r#"set -e
echo "Configuring UFW firewall..."
if ! command -v ufw >/dev/null 2>&1; then
    {install} {packages}
fi
sudo ufw --force disable
sudo ufw --force reset
sudo ufw default deny incoming
sudo ufw default allow outgoing
sudo ufw allow 22/tcp
"#,
            install = install,
            packages = profile.packages(Component::Firewall).joined(),
        );
        for port in ports.iter().filter(|p| p.as_str() != "22") {
            script.push_str(&format!("sudo ufw allow {}\n", port));
        }
        script.push_str("sudo ufw --force enable\n");
        script.push_str("sudo ufw status | grep 22 || echo \"Warning: SSH port may not be properly configured\"\n");
        script
    } else {
        let mut script = format!(
            r#"set -e
echo "Configuring firewalld..."
if ! command -v firewall-cmd >/dev/null 2>&1; then
    {install} firewalld
fi
{enable} firewalld
{start} firewalld
"#,
            install = install,
            enable = svc.enable,
            start = svc.start,
        );
        for port in &ports {
            let spec = if port.contains('/') { port.clone() } else { format!("{}/tcp", port) };
            script.push_str(&format!("sudo firewall-cmd --permanent --add-port={}\n", spec));
        }
        script.push_str("sudo firewall-cmd --reload\n");
        script.push_str("sudo firewall-cmd --list-ports | grep 22 || echo \"Warning: SSH port may not be properly configured\"\n");
        script
    }
}

/// Certbot install script, or `None` for providers without one
pub fn ssl_script(profile: &OsProfile, opts: &SslOptions) -> Option<String> {
    if opts.config.provider != "letsencrypt" {
        return None;
    }
    Some(format!(
        "set -e\necho \"Installing Certbot for Let's Encrypt...\"\n{} certbot python3-certbot-apache\necho \"Run 'sudo certbot --apache' to obtain certificates\"\n",
        profile.pkg().install
    ))
}

/// Web root ownership after install
pub fn web_server_config_script(profile: &OsProfile) -> String {
    let users = &profile.users;
    format!(
        r#"set -e
echo "Configuring web server..."
sudo mkdir -p /var/www/html
sudo chown -R {user}:{group} /var/www/html
sudo chmod -R 755 /var/www/html
sudo rm -f /var/www/html/index.nginx-debian.html
echo "Web server configuration completed"
"#,
        user = users.web_user,
        group = users.web_group,
    )
}

/// Application user for a local MySQL engine
pub fn mysql_app_access_script(database: &str) -> String {
    format!(
        r#"set -e
echo "Configuring MySQL for application access..."
mysql -u root -proot123 -e "CREATE USER IF NOT EXISTS '{user}'@'localhost' IDENTIFIED BY '{password}';" || true
mysql -u root -proot123 -e "GRANT ALL PRIVILEGES ON {db}.* TO '{user}'@'localhost';" || true
mysql -u root -proot123 -e "FLUSH PRIVILEGES;" || true
echo "MySQL application access configured"
"#,
        db = database,
        user = LOCAL_APP_USER,
        password = LOCAL_APP_PASSWORD,
    )
}

/// Application role for a local PostgreSQL engine
pub fn postgresql_app_access_script(database: &str) -> String {
    format!(
        r#"set -e
echo "Configuring PostgreSQL for application access..."
sudo -u postgres psql -c "CREATE USER {user} WITH PASSWORD '{password}';" || true
sudo -u postgres psql -c "GRANT ALL PRIVILEGES ON DATABASE {db} TO {user};" || true
echo "PostgreSQL application access configured"
"#,
        db = database,
        user = LOCAL_APP_USER,
        password = LOCAL_APP_PASSWORD,
    )
}

/// Restart and re-enable a service if its unit exists
pub fn restart_service_script(profile: &OsProfile, service: &str) -> String {
    let svc = profile.svc();
    format!(
        r#"set -e
if {status} {service} >/dev/null 2>&1 || systemctl list-unit-files | grep -q "^{service}.service"; then
    {restart} {service}
    {enable} {service}
    sleep 2
    if {is_active} {service}; then
        echo "{service} restarted and running"
    else
        echo "{service} restarted but not active"
        {status} {service} --no-pager || true
    fi
else
    echo "{service} service not found, skipping"
fi
"#,
        status = svc.status,
        restart = svc.restart,
        enable = svc.enable,
        is_active = svc.is_active,
        service = service,
    )
}
