// src/remote/mod.rs

//! Remote execution against the target host
//!
//! The executor never talks to the network directly. It goes through two
//! collaborators:
//!
//! - [`SessionProvider`] hands out short-lived [`AccessDetails`] for each
//!   attempt (keys may rotate between attempts, so nothing is cached)
//! - [`Transport`] runs one command with those details and reports the exit
//!   status and captured output
//!
//! [`ssh::SshTransport`] is the production transport; tests substitute
//! in-memory fakes.

pub mod credentials;
pub mod executor;
pub mod ssh;
pub mod static_host;

use crate::error::Result;
use std::fmt;
use std::time::Duration;

pub use executor::{ExecOutcome, RemoteExecutor};
pub use ssh::SshTransport;
pub use static_host::StaticHost;

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default per-attempt timeout for a command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Short-lived access to the target host
#[derive(Clone, PartialEq, Eq)]
pub struct AccessDetails {
    pub username: String,
    pub host: String,
    pub port: u16,
    /// Private key material (PEM)
    pub private_key: String,
    /// Signed certificate, when the host requires one
    pub cert_key: Option<String>,
}

impl AccessDetails {
    pub fn new(username: impl Into<String>, host: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            private_key: private_key.into(),
            cert_key: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_certificate(mut self, cert: impl Into<String>) -> Self {
        self.cert_key = Some(cert.into());
        self
    }

    /// `user@host` destination string
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }
}

impl fmt::Debug for AccessDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessDetails")
            .field("username", &self.username)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("private_key", &"<redacted>")
            .field("cert_key", &self.cert_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Source of fresh credentials for each attempt
pub trait SessionProvider {
    fn open_session(&self) -> Result<AccessDetails>;
}

/// Captured result of one remote command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn new(exit_status: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            success: exit_status == 0,
            exit_status,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Error text for a failed command: trimmed stderr, or the exit code
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("Command failed with exit code {}", self.exit_status)
        } else {
            stderr.to_string()
        }
    }
}

/// Runs commands on the target host
pub trait Transport {
    /// Run one command, bounded by `timeout`
    ///
    /// Returns `Err` only when no exit status was obtained (spawn failure,
    /// timeout). A non-zero exit is an `Ok` result with `success == false`.
    fn run(&self, access: &AccessDetails, command: &str, timeout: Duration) -> Result<CommandResult>;

    /// Raw reachability check on the execution port
    fn probe(&self, host: &str, port: u16, timeout: Duration) -> bool;
}

/// One set of access details bound to a transport
///
/// Used for side-channel writes (audit log entries) that reuse the
/// credentials of the attempt they belong to.
pub struct RemoteSession<'a> {
    pub transport: &'a dyn Transport,
    pub access: &'a AccessDetails,
}

impl<'a> RemoteSession<'a> {
    pub fn new(transport: &'a dyn Transport, access: &'a AccessDetails) -> Self {
        Self { transport, access }
    }

    pub fn run(&self, command: &str, timeout: Duration) -> Result<CommandResult> {
        self.transport.run(self.access, command, timeout)
    }
}

/// A command to run through the executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub script: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub verbose: bool,
    /// Record the command in the remote audit log
    pub audit: bool,
    /// Values shown as `***` wherever the request is narrated
    pub secrets: Vec<String>,
}

impl CommandRequest {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
            max_retries: 1,
            verbose: false,
            audit: true,
            secrets: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_timeout_secs(self, secs: u64) -> Self {
        self.with_timeout(Duration::from_secs(secs))
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// Skip the remote audit log (high-frequency probes)
    pub fn unaudited(mut self) -> Self {
        self.audit = false;
        self
    }

    /// Mask `secret` in narrated script text and output; empty values are ignored
    pub fn redacting(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secrets.push(secret);
        }
        self
    }

    /// `text` with every registered secret replaced by `***`
    pub fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), "***"))
    }

    /// Attempts actually made; zero retries still means one attempt
    pub fn attempt_limit(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Error text fragments that indicate a transport-level failure
const CONNECTION_SIGNATURES: &[&str] = &[
    "broken pipe",
    "connection refused",
    "connection timed out",
    "network is unreachable",
    "network unreachable",
    "host is unreachable",
    "host unreachable",
    "no route to host",
    "connection reset",
    "connection closed by remote host",
    "ssh_exchange_identification",
    "connection lost",
    "connection aborted",
    "operation timed out",
    "connect to host",
    "timed out after",
];

/// True when the error text looks like a connectivity problem
pub fn is_connection_error(text: &str) -> bool {
    let lower = text.to_lowercase();
    CONNECTION_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_result_success_tracks_exit_status() {
        assert!(CommandResult::new(0, "ok", "").success);
        let failed = CommandResult::new(2, "", "");
        assert!(!failed.success);
        assert_eq!(failed.error_text(), "Command failed with exit code 2");
        assert_eq!(CommandResult::new(1, "", "  boom \n").error_text(), "boom");
    }

    #[test]
    fn test_command_request_defaults() {
        let req = CommandRequest::new("uptime");
        assert_eq!(req.timeout, Duration::from_secs(300));
        assert_eq!(req.max_retries, 1);
        assert!(req.audit);
        assert!(!req.verbose);

        let probe = CommandRequest::new("true").with_retries(0).unaudited();
        assert_eq!(probe.attempt_limit(), 1);
        assert!(!probe.audit);
    }

    #[test]
    fn test_redact_masks_every_secret() {
        let req = CommandRequest::new("mysql -p'pw1' && echo tok")
            .redacting("pw1")
            .redacting("")
            .redacting("tok");
        assert_eq!(req.secrets, vec!["pw1", "tok"]);
        assert_eq!(req.redact(&req.script), "mysql -p'***' && echo ***");
        assert_eq!(CommandRequest::new("uptime").redact("uptime"), "uptime");
    }

    #[test]
    fn test_is_connection_error() {
        assert!(is_connection_error("ssh: connect to host 1.2.3.4 port 22: Connection refused"));
        assert!(is_connection_error("Command timed out after 30 seconds"));
        assert!(is_connection_error("kex_exchange_identification / ssh_exchange_identification: read"));
        assert!(is_connection_error("client_loop: send disconnect: Broken pipe"));
        assert!(!is_connection_error("E: Unable to locate package foo"));
        assert!(!is_connection_error(""));
    }

    #[test]
    fn test_access_details_debug_redacts_keys() {
        let access = AccessDetails::new("ubuntu", "10.0.0.1", "-----BEGIN SECRET-----")
            .with_certificate("ssh-rsa-cert AAAA");
        let debug = format!("{:?}", access);
        assert!(!debug.contains("BEGIN SECRET"));
        assert!(!debug.contains("AAAA"));
        assert!(debug.contains("10.0.0.1"));
        assert_eq!(access.destination(), "ubuntu@10.0.0.1");
    }
}
