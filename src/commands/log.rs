// src/commands/log.rs

//! Remote command log commands

use super::Target;
use anyhow::Result;

/// Print the last `lines` entries of the remote command log
pub fn cmd_log_show(config_path: &str, lines: usize) -> Result<()> {
    let target = Target::open(config_path)?;
    let tail = target.executor().command_log(lines)?;
    println!("{}", tail);
    Ok(())
}

/// Delete the remote command log
pub fn cmd_log_clear(config_path: &str) -> Result<()> {
    let target = Target::open(config_path)?;
    target.executor().clear_command_log()?;
    println!("Command log cleared.");
    Ok(())
}
