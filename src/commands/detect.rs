// src/commands/detect.rs

use anyhow::Result;

/// Show the OS profile detected for a blueprint
pub fn cmd_detect_os(blueprint_id: &str, blueprint_name: Option<&str>) -> Result<()> {
    let profile = hoststack::detect(blueprint_id, blueprint_name.unwrap_or(""));
    let pkg = profile.pkg();
    let svc = profile.svc();

    println!("Distro:          {}", profile.distro.display_name());
    println!("Family:          {:?}", profile.family);
    println!("Package manager: {}", profile.package_manager);
    println!("Service manager: {}", profile.service_manager.as_str());
    println!("Default user:    {}", profile.users.default_user);
    println!("Web user/group:  {}:{}", profile.users.web_user, profile.users.web_group);
    println!();
    println!("Install:  {} <packages>", pkg.install);
    println!("Update:   {}", pkg.update);
    println!("Restart:  {} <service>", svc.restart);
    Ok(())
}
