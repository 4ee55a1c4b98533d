// src/commands/exec.rs

use super::Target;
use anyhow::Result;
use hoststack::CommandRequest;
use std::time::Duration;

/// Run a command or script on the target host
pub fn cmd_exec(config_path: &str, command: &str, live: bool, timeout: Option<u64>) -> Result<()> {
    let target = Target::open(config_path)?;
    let exec = target.executor();
    let timeout = timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| target.config.command_timeout());

    let outcome = if live {
        exec.execute_live(command, timeout)
    } else {
        exec.execute(
            &CommandRequest::new(command)
                .with_timeout(timeout)
                .with_retries(target.config.deployment.retries.max_attempts),
        )
    };

    if !outcome.success {
        anyhow::bail!("Command failed after {} attempt(s): {}", outcome.attempts, outcome.output);
    }
    if !outcome.output.is_empty() {
        println!("{}", outcome.output);
    }
    Ok(())
}
