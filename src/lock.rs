// src/lock.rs

//! Waiting out package-manager locks on the target host
//!
//! Background jobs such as unattended-upgrades hold the dpkg (or yum) lock
//! for minutes after boot. Installing while the lock is held fails, so the
//! installer waits here first. The wait is bounded; once the bound is hit
//! the known package-manager processes are killed and the run proceeds.
//!
//! Polling is driven locally. Elapsed time is counted as the sum of poll
//! sleeps so the bound holds no matter how slow each probe round-trip is.

use crate::os::PackageManager;
use crate::remote::{CommandRequest, RemoteExecutor};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Interval between lock probes
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Interval between progress lines while waiting
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// Pause after killing lock holders
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Default bound on the wait
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

const PROBE_TIMEOUT_SECS: u64 = 30;

/// How the wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// Free at the first probe
    Free,
    /// Released while waiting
    Released,
    /// Still held at the bound; holders were killed
    Forced,
}

/// Summary of one wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockWaitReport {
    pub outcome: LockOutcome,
    /// Time spent in poll sleeps, excluding the settle delay
    pub waited: Duration,
    /// Elapsed seconds at which progress was reported
    pub checkpoints: Vec<u64>,
}

/// Shell probe printing `held` or `free`
pub fn probe_command(pm: PackageManager) -> String {
    let checks: Vec<String> = pm
        .lock_files()
        .iter()
        .map(|file| format!("sudo fuser {} >/dev/null 2>&1", file))
        .collect();
    format!("if {}; then echo held; else echo free; fi", checks.join(" || "))
}

/// Shell command killing known lock holders
pub fn kill_command(pm: PackageManager) -> String {
    format!("sudo killall {} 2>/dev/null || true", pm.lock_holders().join(" "))
}

/// Waits for the package-manager lock to be released
pub struct LockWaiter<'e, 'a> {
    exec: &'e RemoteExecutor<'a>,
    package_manager: PackageManager,
}

impl<'e, 'a> LockWaiter<'e, 'a> {
    pub fn new(exec: &'e RemoteExecutor<'a>, package_manager: PackageManager) -> Self {
        Self {
            exec,
            package_manager,
        }
    }

    /// True only when the probe ran and reported the lock as held
    ///
    /// A probe that fails to run counts as free.
    pub fn is_held(&self) -> bool {
        let outcome = self.exec.execute(
            &CommandRequest::new(probe_command(self.package_manager))
                .with_timeout_secs(PROBE_TIMEOUT_SECS)
                .unaudited(),
        );
        if !outcome.success {
            debug!("Lock probe failed: {}", outcome.output);
            return false;
        }
        outcome.output.trim() == "held"
    }

    /// Block until the lock is free, or force it free after `timeout`
    pub fn await_release(&self, timeout: Duration) -> LockWaitReport {
        let label = self.package_manager.lock_label();

        if !self.is_held() {
            debug!("{} lock is available", label);
            return LockWaitReport {
                outcome: LockOutcome::Free,
                waited: Duration::ZERO,
                checkpoints: Vec::new(),
            };
        }

        info!("Waiting for {} lock (max {}s)...", label, timeout.as_secs());
        let sleeper = self.exec.sleeper();
        let mut elapsed = Duration::ZERO;
        let mut checkpoints = Vec::new();

        while elapsed < timeout {
            let step = POLL_INTERVAL.min(timeout - elapsed);
            sleeper.sleep(step);
            elapsed += step;

            if !self.is_held() {
                info!("{} lock released after {}s", label, elapsed.as_secs());
                return LockWaitReport {
                    outcome: LockOutcome::Released,
                    waited: elapsed,
                    checkpoints,
                };
            }

            if elapsed.as_secs() > 0 && elapsed.as_secs() % PROGRESS_INTERVAL.as_secs() == 0 {
                info!("Still waiting... ({}s)", elapsed.as_secs());
                checkpoints.push(elapsed.as_secs());
            }
        }

        warn!(
            "{} still locked after {}s, killing lock holders and proceeding anyway",
            label,
            timeout.as_secs()
        );
        let kill = self.exec.execute(
            &CommandRequest::new(kill_command(self.package_manager)).with_timeout_secs(PROBE_TIMEOUT_SECS),
        );
        if !kill.success {
            warn!("Failed to kill lock holders: {}", kill.output);
        }
        sleeper.sleep(SETTLE_DELAY);

        LockWaitReport {
            outcome: LockOutcome::Forced,
            waited: elapsed,
            checkpoints,
        }
    }
}
