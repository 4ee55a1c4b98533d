// tests/lock_waiter.rs

//! Package-manager lock waiting against a fake host.

mod common;

use common::{FakeHost, FakeSession, Reply};
use hoststack::lock::{kill_command, probe_command, DEFAULT_LOCK_TIMEOUT};
use hoststack::{LockOutcome, LockWaiter, PackageManager, RecordingSleeper, RemoteExecutor, RuntimeContext};
use std::time::Duration;

#[test]
fn test_free_lock_returns_immediately() {
    let host = FakeHost::new();
    host.on_exact(&probe_command(PackageManager::Apt), vec![Reply::ok("free\n")]);
    let session = FakeSession::new();
    let sleeper = RecordingSleeper::new();
    let exec = RemoteExecutor::new(&session, &host, &sleeper, RuntimeContext::local());

    let report = LockWaiter::new(&exec, PackageManager::Apt).await_release(DEFAULT_LOCK_TIMEOUT);

    assert_eq!(report.outcome, LockOutcome::Free);
    assert_eq!(report.waited, Duration::ZERO);
    assert!(sleeper.calls().is_empty());
    assert_eq!(host.count_exact(&probe_command(PackageManager::Apt)), 1);
}

#[test]
fn test_released_while_waiting() {
    let host = FakeHost::new();
    host.on_exact(
        &probe_command(PackageManager::Apt),
        vec![Reply::ok("held"), Reply::ok("held"), Reply::ok("held"), Reply::ok("free")],
    );
    let session = FakeSession::new();
    let sleeper = RecordingSleeper::new();
    let exec = RemoteExecutor::new(&session, &host, &sleeper, RuntimeContext::local());

    let report = LockWaiter::new(&exec, PackageManager::Apt).await_release(DEFAULT_LOCK_TIMEOUT);

    assert_eq!(report.outcome, LockOutcome::Released);
    assert_eq!(report.waited, Duration::from_secs(6));
    assert!(report.checkpoints.is_empty());
    assert_eq!(host.count(&kill_command(PackageManager::Apt)), 0);
}

#[test]
fn test_held_lock_is_forced_after_bound() {
    let host = FakeHost::new();
    let probe = probe_command(PackageManager::Apt);
    host.on_exact(&probe, vec![Reply::ok("held")]);
    let session = FakeSession::new();
    let sleeper = RecordingSleeper::new();
    let exec = RemoteExecutor::new(&session, &host, &sleeper, RuntimeContext::local());

    let report = LockWaiter::new(&exec, PackageManager::Apt).await_release(Duration::from_secs(60));

    assert_eq!(report.outcome, LockOutcome::Forced);
    assert_eq!(report.waited, Duration::from_secs(60));
    assert_eq!(report.checkpoints, vec![10, 20, 30, 40, 50, 60]);

    // One probe up front, one per two-second poll
    assert_eq!(host.count_exact(&probe), 31);
    assert_eq!(host.count_exact(&kill_command(PackageManager::Apt)), 1);

    // 30 polls plus the settle delay after the kill
    let calls = sleeper.calls();
    assert_eq!(calls.len(), 31);
    assert_eq!(calls.last(), Some(&Duration::from_secs(2)));
    assert_eq!(sleeper.total(), Duration::from_secs(62));
}

#[test]
fn test_failed_probe_counts_as_free() {
    let host = FakeHost::new();
    host.on_exact(&probe_command(PackageManager::Apt), vec![Reply::fail("sudo: fuser: command not found")]);
    let session = FakeSession::new();
    let sleeper = RecordingSleeper::new();
    let exec = RemoteExecutor::new(&session, &host, &sleeper, RuntimeContext::local());

    let report = LockWaiter::new(&exec, PackageManager::Apt).await_release(DEFAULT_LOCK_TIMEOUT);
    assert_eq!(report.outcome, LockOutcome::Free);
}

#[test]
fn test_yum_lock_kills_yum_processes() {
    let host = FakeHost::new();
    host.on_exact(&probe_command(PackageManager::Yum), vec![Reply::ok("held")]);
    let session = FakeSession::new();
    let sleeper = RecordingSleeper::new();
    let exec = RemoteExecutor::new(&session, &host, &sleeper, RuntimeContext::ci());

    let report = LockWaiter::new(&exec, PackageManager::Yum).await_release(Duration::from_secs(10));

    assert_eq!(report.outcome, LockOutcome::Forced);
    assert_eq!(report.checkpoints, vec![10]);
    assert_eq!(host.count("killall yum dnf"), 1);
}

#[test]
fn test_lock_probes_are_not_audited() {
    let host = FakeHost::new();
    let session = FakeSession::new();
    let sleeper = RecordingSleeper::new();
    let exec = RemoteExecutor::new(&session, &host, &sleeper, RuntimeContext::local());

    LockWaiter::new(&exec, PackageManager::Apt).await_release(DEFAULT_LOCK_TIMEOUT);
    assert!(host.log_lines().is_empty());
}
