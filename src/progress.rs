// src/progress.rs

//! Progress reporting for installation runs
//!
//! The installer reports phases and per-dependency results through the
//! `ProgressTracker` trait. Implementations:
//! - `CliProgress`: an indicatif bar over the enabled dependencies
//! - `LogProgress`: tracing lines only
//! - `SilentProgress`: counts, nothing else
//! - `CallbackProgress`: forwards `InstallEvent`s to a closure
//!
//! Every implementation keeps its counters in relaxed atomics; progress is
//! advisory and never read for control flow.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// How a dependency ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyStatus {
    Installed,
    AlreadyPresent,
    Failed,
}

impl DependencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::AlreadyPresent => "already installed",
            Self::Failed => "FAILED",
        }
    }
}

/// Event delivered to a `CallbackProgress`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallEvent {
    Phase(String),
    Started { name: String, index: u64, total: u64 },
    Finished { name: String, status: DependencyStatus },
    Done { installed: u64, failed: u64 },
}

/// Receives progress from the installer
pub trait ProgressTracker: Send + Sync {
    /// A run-level phase began (preflight, batch install, ...)
    fn phase(&self, message: &str);

    /// Dependency `index` (1-based) of `total` is starting
    fn started(&self, name: &str, index: u64, total: u64);

    fn finished(&self, name: &str, status: DependencyStatus);

    /// The loop is over
    fn done(&self, installed: u64, failed: u64);

    /// Dependencies finished so far
    fn completed(&self) -> u64;
}

/// Counts progress without reporting it
#[derive(Debug, Default)]
pub struct SilentProgress {
    completed: AtomicU64,
    done: AtomicBool,
}

impl SilentProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Relaxed)
    }
}

impl ProgressTracker for SilentProgress {
    fn phase(&self, _message: &str) {}

    fn started(&self, _name: &str, _index: u64, _total: u64) {}

    fn finished(&self, _name: &str, _status: DependencyStatus) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    fn done(&self, _installed: u64, _failed: u64) {
        self.done.store(true, Ordering::Relaxed);
    }

    fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

/// Reports progress as tracing lines
#[derive(Debug, Default)]
pub struct LogProgress {
    completed: AtomicU64,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressTracker for LogProgress {
    fn phase(&self, message: &str) {
        info!("{}", message);
    }

    fn started(&self, name: &str, index: u64, total: u64) {
        info!("[{}/{}] Installing {}...", index, total, name);
    }

    fn finished(&self, name: &str, status: DependencyStatus) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        match status {
            DependencyStatus::Failed => warn!("{}: {}", name, status.as_str()),
            _ => info!("{}: {}", name, status.as_str()),
        }
    }

    fn done(&self, installed: u64, failed: u64) {
        info!("Installation finished: {} installed, {} failed", installed, failed);
    }

    fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

/// Forwards every event to a closure
pub struct CallbackProgress<F>
where
    F: Fn(InstallEvent) + Send + Sync,
{
    callback: F,
    completed: AtomicU64,
}

impl<F> CallbackProgress<F>
where
    F: Fn(InstallEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            completed: AtomicU64::new(0),
        }
    }
}

impl<F> ProgressTracker for CallbackProgress<F>
where
    F: Fn(InstallEvent) + Send + Sync,
{
    fn phase(&self, message: &str) {
        (self.callback)(InstallEvent::Phase(message.to_string()));
    }

    fn started(&self, name: &str, index: u64, total: u64) {
        (self.callback)(InstallEvent::Started {
            name: name.to_string(),
            index,
            total,
        });
    }

    fn finished(&self, name: &str, status: DependencyStatus) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        (self.callback)(InstallEvent::Finished {
            name: name.to_string(),
            status,
        });
    }

    fn done(&self, installed: u64, failed: u64) {
        (self.callback)(InstallEvent::Done { installed, failed });
    }

    fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

/// Terminal progress bar over the enabled dependencies
pub struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} ({pos}/{len}) [{bar:40.green/dim}]")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }
}

impl Default for CliProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker for CliProgress {
    fn phase(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn started(&self, name: &str, _index: u64, total: u64) {
        self.bar.set_length(total);
        self.bar.set_message(format!("Installing {}", name));
    }

    fn finished(&self, name: &str, status: DependencyStatus) {
        self.bar.inc(1);
        self.bar.println(format!("  {} [{}]", name, status.as_str()));
    }

    fn done(&self, installed: u64, failed: u64) {
        self.bar
            .finish_with_message(format!("{} installed, {} failed", installed, failed));
    }

    fn completed(&self) -> u64 {
        self.bar.position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_silent_progress_counts() {
        let progress = SilentProgress::new();
        progress.started("git", 1, 2);
        progress.finished("git", DependencyStatus::Installed);
        progress.finished("redis", DependencyStatus::Failed);
        assert_eq!(progress.completed(), 2);
        assert!(!progress.is_done());
        progress.done(1, 1);
        assert!(progress.is_done());
    }

    #[test]
    fn test_callback_progress_events() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let progress = CallbackProgress::new(move |event| sink.lock().unwrap().push(event));

        progress.phase("Preflight");
        progress.started("nginx", 1, 1);
        progress.finished("nginx", DependencyStatus::AlreadyPresent);
        progress.done(1, 0);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[2],
            InstallEvent::Finished {
                name: "nginx".to_string(),
                status: DependencyStatus::AlreadyPresent
            }
        );
        assert_eq!(progress.completed(), 1);
    }

    #[test]
    fn test_log_progress_counts() {
        let progress = LogProgress::new();
        progress.finished("php", DependencyStatus::Installed);
        assert_eq!(progress.completed(), 1);
    }
}
