// src/context.rs

//! Runtime tuning shared by the executor and the lock waiter
//!
//! CI runners get shorter retry delays than interactive runs. Detection
//! happens once in `main` and the resulting context is passed down.
//!
//! All blocking waits go through a [`Sleeper`] so tests can record the
//! requested delays instead of actually sleeping.

use std::sync::Mutex;
use std::time::Duration;

/// Environment variables whose presence marks a CI runner
const CI_MARKERS: &[&str] = &["CI", "GITHUB_ACTIONS"];

/// Retry and timing parameters for the current run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeContext {
    pub is_ci: bool,
    backoff_base: u64,
    backoff_step: u64,
    backoff_cap: u64,
}

impl RuntimeContext {
    /// Interactive run: longer waits between attempts
    pub fn local() -> Self {
        Self {
            is_ci: false,
            backoff_base: 15,
            backoff_step: 10,
            backoff_cap: 60,
        }
    }

    /// CI run: short waits, runners are billed by the minute
    pub fn ci() -> Self {
        Self {
            is_ci: true,
            backoff_base: 5,
            backoff_step: 5,
            backoff_cap: 20,
        }
    }

    /// Detect from the process environment
    pub fn from_env() -> Self {
        let is_ci = CI_MARKERS.iter().any(|var| {
            std::env::var(var)
                .map(|v| !v.is_empty() && v != "false" && v != "0")
                .unwrap_or(false)
        });
        if is_ci { Self::ci() } else { Self::local() }
    }

    /// Delay before the retry following zero-based attempt `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let secs = self.backoff_base + self.backoff_step * u64::from(attempt);
        Duration::from_secs(secs.min(self.backoff_cap))
    }

    /// SSH connect timeout; CI runners reach hosts over slower links
    pub fn connect_timeout_secs(&self) -> u64 {
        if self.is_ci { 60 } else { 30 }
    }

    /// SSH keepalive interval
    pub fn keepalive_interval_secs(&self) -> u64 {
        if self.is_ci { 30 } else { 10 }
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::local()
    }
}

/// Blocking delay source
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested delays without sleeping
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    calls: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delay requested so far, in order
    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Sum of all requested delays
    pub fn total(&self) -> Duration {
        self.calls().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_backoff_schedule() {
        let ctx = RuntimeContext::local();
        let secs: Vec<u64> = (0..6).map(|a| ctx.backoff(a).as_secs()).collect();
        assert_eq!(secs, vec![15, 25, 35, 45, 55, 60]);
    }

    #[test]
    fn test_ci_backoff_schedule() {
        let ctx = RuntimeContext::ci();
        let secs: Vec<u64> = (0..5).map(|a| ctx.backoff(a).as_secs()).collect();
        assert_eq!(secs, vec![5, 10, 15, 20, 20]);
    }

    #[test]
    fn test_ssh_timing_by_context() {
        assert_eq!(RuntimeContext::local().connect_timeout_secs(), 30);
        assert_eq!(RuntimeContext::ci().keepalive_interval_secs(), 30);
    }

    #[test]
    fn test_recording_sleeper() {
        let sleeper = RecordingSleeper::new();
        sleeper.sleep(Duration::from_secs(2));
        sleeper.sleep(Duration::from_secs(3));
        assert_eq!(sleeper.calls().len(), 2);
        assert_eq!(sleeper.total(), Duration::from_secs(5));
    }
}
