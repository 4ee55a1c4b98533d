// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.
//!
//! `FakeHost` stands in for the target machine: it keeps the remote audit
//! log in memory, records every other command it is asked to run and
//! answers them from scripted rules.

#![allow(dead_code)]

use hoststack::audit::LOG_PATH;
use hoststack::cloud::{CloudProvider, InstanceState, ManagedDbConnection};
use hoststack::{AccessDetails, CommandResult, Error, Result, SessionProvider, Transport};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

/// Scripted reply to one command
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(String),
    Exit(i32, String),
    Timeout(u64),
    Transport(String),
}

impl Reply {
    pub fn ok(stdout: &str) -> Self {
        Self::Ok(stdout.to_string())
    }

    pub fn fail(stderr: &str) -> Self {
        Self::Exit(1, stderr.to_string())
    }

    pub fn connection(message: &str) -> Self {
        Self::Transport(message.to_string())
    }

    fn into_result(self) -> Result<CommandResult> {
        match self {
            Self::Ok(stdout) => Ok(CommandResult::new(0, stdout, "")),
            Self::Exit(code, stderr) => Ok(CommandResult::new(code, "", stderr)),
            Self::Timeout(secs) => Err(Error::Timeout(secs)),
            Self::Transport(message) => Err(Error::TransportError(message)),
        }
    }
}

enum Matcher {
    Exact(String),
    Contains(String),
}

impl Matcher {
    fn matches(&self, command: &str) -> bool {
        match self {
            Self::Exact(s) => command == s,
            Self::Contains(s) => command.contains(s.as_str()),
        }
    }
}

/// Replies are consumed in order; the last one repeats
struct Rule {
    matcher: Matcher,
    replies: VecDeque<Reply>,
}

impl Rule {
    fn next(&mut self) -> Reply {
        if self.replies.len() > 1 {
            self.replies.pop_front().unwrap()
        } else {
            self.replies.front().cloned().unwrap()
        }
    }
}

const APPEND_PREFIX: &str = "sudo mkdir -p /var/log && echo '";

/// In-memory target host
pub struct FakeHost {
    log: Mutex<Vec<String>>,
    commands: Mutex<Vec<String>>,
    rules: Mutex<Vec<Rule>>,
    reachable: AtomicBool,
    probes: AtomicU32,
    fail_log_writes: AtomicBool,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            log: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
            rules: Mutex::new(Vec::new()),
            reachable: AtomicBool::new(true),
            probes: AtomicU32::new(0),
            fail_log_writes: AtomicBool::new(false),
        }
    }

    /// Reply to commands containing `pattern`
    pub fn on(&self, pattern: &str, replies: Vec<Reply>) -> &Self {
        self.push_rule(Matcher::Contains(pattern.to_string()), replies);
        self
    }

    /// Reply to exactly `command`
    pub fn on_exact(&self, command: &str, replies: Vec<Reply>) -> &Self {
        self.push_rule(Matcher::Exact(command.to_string()), replies);
        self
    }

    fn push_rule(&self, matcher: Matcher, replies: Vec<Reply>) {
        assert!(!replies.is_empty());
        self.rules.lock().unwrap().push(Rule {
            matcher,
            replies: replies.into(),
        });
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn fail_log_writes(&self) {
        self.fail_log_writes.store(true, Ordering::SeqCst);
    }

    /// Lines currently in the remote audit log
    pub fn log_lines(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Every non-log command run so far, in order
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Number of commands containing `pattern`
    pub fn count(&self, pattern: &str) -> usize {
        self.commands().iter().filter(|c| c.contains(pattern)).count()
    }

    /// Number of commands equal to `command`
    pub fn count_exact(&self, command: &str) -> usize {
        self.commands().iter().filter(|c| c.as_str() == command).count()
    }

    pub fn probes(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }

    fn append(&self, command: &str) -> Result<CommandResult> {
        if self.fail_log_writes.load(Ordering::SeqCst) {
            return Ok(CommandResult::new(1, "", "tee: Permission denied"));
        }
        let suffix = format!("' | sudo tee -a {} > /dev/null", LOG_PATH);
        let entry = command
            .strip_prefix(APPEND_PREFIX)
            .and_then(|rest| rest.strip_suffix(suffix.as_str()))
            .map(|escaped| escaped.replace(r#"'"'"'"#, "'"))
            .unwrap_or_else(|| panic!("unexpected log write: {}", command));
        self.log.lock().unwrap().push(entry);
        Ok(CommandResult::new(0, "", ""))
    }

    fn tail(&self, command: &str) -> Result<CommandResult> {
        let lines: usize = command
            .split_whitespace()
            .skip_while(|w| *w != "-n")
            .nth(1)
            .and_then(|n| n.parse().ok())
            .unwrap_or(50);
        let log = self.log.lock().unwrap();
        if log.is_empty() {
            return Ok(CommandResult::new(0, "No command log found\n", ""));
        }
        let start = log.len().saturating_sub(lines);
        Ok(CommandResult::new(0, format!("{}\n", log[start..].join("\n")), ""))
    }

    fn scripted(&self, command: &str) -> Option<Reply> {
        let mut rules = self.rules.lock().unwrap();
        rules
            .iter_mut()
            .find(|rule| rule.matcher.matches(command))
            .map(Rule::next)
    }
}

/// Single-line presence probes fail unless a rule says otherwise
fn is_presence_probe(command: &str) -> bool {
    !command.contains('\n')
        && (command.starts_with("command -v ") || command.starts_with("systemctl is-active"))
}

impl Transport for FakeHost {
    fn run(&self, _access: &AccessDetails, command: &str, _timeout: Duration) -> Result<CommandResult> {
        if command.contains(LOG_PATH) {
            if command.contains("tee -a") {
                return self.append(command);
            }
            if command.contains("tail -n") {
                return self.tail(command);
            }
            if command.contains("rm -f") {
                self.log.lock().unwrap().clear();
                return Ok(CommandResult::new(0, "Command log cleared\n", ""));
            }
        }

        self.commands.lock().unwrap().push(command.to_string());

        match self.scripted(command) {
            Some(reply) => reply.into_result(),
            None if is_presence_probe(command) => Ok(CommandResult::new(1, "", "")),
            None => Ok(CommandResult::new(0, "", "")),
        }
    }

    fn probe(&self, _host: &str, _port: u16, _timeout: Duration) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.reachable.load(Ordering::SeqCst)
    }
}

/// Session provider counting how often credentials were fetched
pub struct FakeSession {
    opened: AtomicU32,
    fail: AtomicBool,
}

impl Default for FakeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSession {
    pub fn new() -> Self {
        Self {
            opened: AtomicU32::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        let session = Self::new();
        session.fail.store(true, Ordering::SeqCst);
        session
    }

    pub fn opened(&self) -> u32 {
        self.opened.load(Ordering::SeqCst)
    }
}

impl SessionProvider for FakeSession {
    fn open_session(&self) -> Result<AccessDetails> {
        let n = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::CloudError("access details unavailable".to_string()));
        }
        Ok(AccessDetails::new("ubuntu", "203.0.113.10", format!("KEY-{}", n)))
    }
}

/// Cloud provider with at most one managed database
pub struct FakeCloud {
    pub connection: Option<ManagedDbConnection>,
}

impl FakeCloud {
    pub fn empty() -> Self {
        Self { connection: None }
    }

    pub fn mysql(password: &str) -> Self {
        Self {
            connection: Some(ManagedDbConnection {
                endpoint: "app-db.internal".to_string(),
                port: 3306,
                username: "admin".to_string(),
                password: Some(password.to_string()),
                engine: "mysql".to_string(),
                database_name: "app_db".to_string(),
            }),
        }
    }
}

impl CloudProvider for FakeCloud {
    fn instance_state(&self, _instance_name: &str) -> Result<InstanceState> {
        Ok(InstanceState::Running)
    }

    fn managed_db_connection(&self, database_name: &str) -> Result<ManagedDbConnection> {
        self.connection
            .clone()
            .ok_or_else(|| Error::CloudError(format!("database {} not found", database_name)))
    }
}

/// In-memory sink for formatted tracing output
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with tracing output captured; returns its value and the log text
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let value = tracing::subscriber::with_default(subscriber, f);
    (value, buffer.contents())
}
