// src/install/batch.rs

//! Shared packages installed in one call before the per-dependency loop

use crate::os::PackageManager;

/// Packages needed by more than one routine, de-duplicated in first-seen order
pub fn common_packages(enabled: &[String], pm: PackageManager) -> Vec<String> {
    let has = |name: &str| enabled.iter().any(|e| e == name);
    let apt = pm == PackageManager::Apt;
    let mut packages: Vec<&str> = Vec::new();

    if has("apache") || has("nginx") || has("php") {
        packages.extend(["curl", "wget", "unzip"]);
    }
    if has("git") {
        packages.push("git");
    }
    if has("nodejs") {
        packages.push("curl");
        if apt {
            packages.push("software-properties-common");
        }
    }
    if has("python") {
        packages.extend(["python3", "python3-pip"]);
        if apt {
            packages.push("python3-venv");
        }
    }
    if has("php") && apt {
        packages.push("software-properties-common");
    }

    let mut unique: Vec<String> = Vec::with_capacity(packages.len());
    for pkg in packages {
        if !unique.iter().any(|u| u == pkg) {
            unique.push(pkg.to_string());
        }
    }
    unique
}

/// Script installing the batch with the profile's install command
pub fn batch_script(install_cmd: &str, packages: &[String], pm: PackageManager) -> String {
    let mut script = String::from("set -e\n");
    if pm == PackageManager::Apt {
        script.push_str("export DEBIAN_FRONTEND=noninteractive\n");
    }
    script.push_str("echo \"Installing common packages in batch...\"\n");
    script.push_str(&format!("{} {}\n", install_cmd, packages.join(" ")));
    script.push_str("echo \"Common packages installed\"\n");
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_web_stack_on_apt() {
        let pkgs = common_packages(&names(&["apache", "php", "nodejs"]), PackageManager::Apt);
        assert_eq!(
            pkgs,
            vec!["curl", "wget", "unzip", "software-properties-common"]
        );
    }

    #[test]
    fn test_python_on_yum_skips_venv() {
        let pkgs = common_packages(&names(&["python", "git"]), PackageManager::Yum);
        assert_eq!(pkgs, vec!["git", "python3", "python3-pip"]);
    }

    #[test]
    fn test_nothing_shared() {
        assert!(common_packages(&names(&["redis", "docker"]), PackageManager::Apt).is_empty());
    }

    #[test]
    fn test_batch_script() {
        let script = batch_script(
            "sudo yum install -y",
            &names(&["curl", "git"]),
            PackageManager::Yum,
        );
        assert!(script.contains("sudo yum install -y curl git\n"));
        assert!(!script.contains("DEBIAN_FRONTEND"));
    }
}
