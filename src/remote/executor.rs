// src/remote/executor.rs

//! Retrying remote command executor
//!
//! Every attempt fetches fresh credentials, records the command in the
//! remote audit log and runs it through the transport under a hard
//! timeout. Failures of any kind are retried up to the request's limit
//! with a growing delay; connection-class failures are called out as such
//! and followed by a reachability probe before the next attempt.
//!
//! The executor never returns an error. Callers get an [`ExecOutcome`]
//! carrying either the trimmed stdout or the last attempt's error text.

use super::{
    is_connection_error, CommandRequest, CommandResult, RemoteSession, SessionProvider, Transport,
};
use crate::audit::{self, CommandLogger, LogTail};
use crate::context::{RuntimeContext, Sleeper};
use crate::error::{Error, Result};
use crate::script;
use std::cell::RefCell;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timeout for each statement of a decomposed script
pub const STEP_TIMEOUT: Duration = Duration::from_secs(60);

/// Default timeout for the reachability probe between retries
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Scripts longer than this are narrated with line numbers
const NUMBERED_NARRATION_THRESHOLD: usize = 3;

/// Result of [`RemoteExecutor::execute`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    pub success: bool,
    /// Trimmed stdout on success, error text on failure
    pub output: String,
    /// Attempts actually made
    pub attempts: u32,
}

impl ExecOutcome {
    fn succeeded(output: String, attempts: u32) -> Self {
        Self {
            success: true,
            output,
            attempts,
        }
    }

    fn failed(output: String, attempts: u32) -> Self {
        Self {
            success: false,
            output,
            attempts,
        }
    }

    /// Convert to a `Result`, prefixing failures with `context`
    pub fn into_result(self, context: &str) -> Result<String> {
        if self.success {
            Ok(self.output)
        } else {
            Err(Error::InstallError(format!("{}: {}", context, self.output)))
        }
    }
}

/// A single failed attempt
struct AttemptFailure {
    message: String,
    connection: bool,
}

impl AttemptFailure {
    fn from_result(result: &CommandResult) -> Self {
        let message = result.error_text();
        Self {
            connection: is_connection_error(&message),
            message,
        }
    }

    fn from_error(err: Error) -> Self {
        let connection = matches!(
            err,
            Error::SessionError(_) | Error::TransportError(_) | Error::Timeout(_)
        );
        let message = match err {
            // Report a timeout in the same words the operator sees elsewhere
            Error::Timeout(secs) => format!("Command timed out after {} seconds", secs),
            other => other.to_string(),
        };
        Self {
            connection: connection || is_connection_error(&message),
            message,
        }
    }

    fn redacted(self, request: &CommandRequest) -> Self {
        Self {
            message: request.redact(&self.message),
            connection: self.connection,
        }
    }
}

/// Runs commands on the target host with retries
pub struct RemoteExecutor<'a> {
    session: &'a dyn SessionProvider,
    transport: &'a dyn Transport,
    sleeper: &'a dyn Sleeper,
    ctx: RuntimeContext,
    logger: CommandLogger,
    probe_timeout: Duration,
    /// Host and port of the most recent session, for reachability probes
    last_target: RefCell<Option<(String, u16)>>,
}

impl<'a> RemoteExecutor<'a> {
    pub fn new(
        session: &'a dyn SessionProvider,
        transport: &'a dyn Transport,
        sleeper: &'a dyn Sleeper,
        ctx: RuntimeContext,
    ) -> Self {
        Self {
            session,
            transport,
            sleeper,
            ctx,
            logger: CommandLogger::new(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            last_target: RefCell::new(None),
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.ctx
    }

    pub fn sleeper(&self) -> &dyn Sleeper {
        self.sleeper
    }

    /// Run a request, retrying failed attempts
    pub fn execute(&self, request: &CommandRequest) -> ExecOutcome {
        let limit = request.attempt_limit();
        let mut last_error = String::from("Max retries exceeded");

        for attempt in 0..limit {
            if attempt > 0 {
                info!("Retry attempt {}/{}", attempt + 1, limit);
                let delay = self.ctx.backoff(attempt);
                info!("Waiting {} seconds before retry...", delay.as_secs());
                self.sleeper.sleep(delay);

                if !self.probe_target() {
                    warn!("Network connectivity still failing, continuing retry...");
                }
            }

            let failure = match self.attempt(request) {
                Ok(result) if result.success => {
                    info!("SUCCESS (exit code: 0)");
                    let output = result.stdout.trim_end().to_string();
                    return ExecOutcome::succeeded(output, attempt + 1);
                }
                Ok(result) => {
                    warn!("FAILED (exit code: {})", result.exit_status);
                    AttemptFailure::from_result(&result)
                }
                Err(e) => AttemptFailure::from_error(e),
            }
            .redacted(request);

            let retrying = attempt + 1 < limit;
            if failure.connection {
                warn!("Connection issue detected: {}", failure.message);
            } else {
                warn!("Error: {}", failure.message);
            }
            if retrying {
                info!("Will retry...");
            }
            last_error = failure.message;
        }

        ExecOutcome::failed(last_error, limit)
    }

    /// Convenience wrapper for a script with a timeout in seconds
    pub fn run(&self, script: &str, timeout_secs: u64, max_retries: u32) -> ExecOutcome {
        self.execute(
            &CommandRequest::new(script)
                .with_timeout_secs(timeout_secs)
                .with_retries(max_retries),
        )
    }

    fn attempt(&self, request: &CommandRequest) -> Result<CommandResult> {
        let access = self
            .session
            .open_session()
            .map_err(|e| Error::SessionError(e.to_string()))?;
        self.last_target
            .replace(Some((access.host.clone(), access.port)));

        info!("Sending command to {}:", access.destination());
        narrate_command(&request.redact(&request.script));

        if request.audit {
            let session = RemoteSession::new(self.transport, &access);
            let _ = self
                .logger
                .log(&session, &request.script)
                .inspect_err(|e| debug!("Command log entry not written: {}", e));
        }

        info!("Executing on remote host...");
        let result = self.transport.run(&access, &request.script, request.timeout)?;

        if request.verbose || !result.success {
            narrate_output(request, &result);
        }
        Ok(result)
    }

    /// Raw TCP check against the most recently used host
    ///
    /// Opens a session to learn the host when no attempt has run yet.
    pub fn probe_target(&self) -> bool {
        let target = match self.last_target.borrow().clone() {
            Some(target) => target,
            None => match self.session.open_session() {
                Ok(access) => (access.host, access.port),
                Err(e) => {
                    warn!("Network connectivity test error: {}", e);
                    return false;
                }
            },
        };

        info!("Testing network connectivity to {}...", target.0);
        let reachable = self.transport.probe(&target.0, target.1, self.probe_timeout);
        if reachable {
            info!("Network connectivity to SSH port successful");
        } else {
            warn!("Network connectivity test failed for {}:{}", target.0, target.1);
        }
        reachable
    }

    /// Run a `set -e` script one statement at a time
    ///
    /// Stops at the first failing statement, reporting it as
    /// `Command {i} failed: {error}`.
    pub fn execute_stepwise(&self, script_text: &str) -> ExecOutcome {
        let statements = script::decompose(script_text);
        info!("Breaking down script into {} individual commands", statements.len());

        let mut outputs = Vec::with_capacity(statements.len());
        let mut attempts = 0;

        for (i, statement) in statements.iter().enumerate() {
            let step = i + 1;
            info!("Step {}/{}: executing individual command", step, statements.len());

            let outcome = self.execute(&CommandRequest::new(statement.as_str()).with_timeout(STEP_TIMEOUT));
            attempts += outcome.attempts;

            if !outcome.success {
                warn!("Command {} failed", step);
                return ExecOutcome::failed(format!("Command {} failed: {}", step, outcome.output), attempts);
            }
            info!("Command {} completed successfully", step);
            outputs.push(outcome.output);
        }

        ExecOutcome::succeeded(outputs.join("\n"), attempts)
    }

    /// Run with live narration, stepping through `set -e` scripts
    pub fn execute_live(&self, script_text: &str, timeout: Duration) -> ExecOutcome {
        if script_text.contains("set -e") && script_text.contains('\n') {
            self.execute_stepwise(script_text)
        } else {
            self.execute(&CommandRequest::new(script_text).with_timeout(timeout).verbose())
        }
    }

    /// End-to-end check that commands can be run on the host
    pub fn check_connectivity(&self, timeout: Duration, max_retries: u32) -> bool {
        info!("Testing SSH connectivity...");
        let outcome = self.execute(
            &CommandRequest::new("echo 'SSH test successful'")
                .with_timeout(timeout)
                .with_retries(max_retries),
        );
        if outcome.success {
            info!("SSH connectivity confirmed");
        } else {
            warn!("SSH connectivity failed: {}", outcome.output);
        }
        outcome.success
    }

    /// Last `lines` entries of the remote command log
    pub fn command_log(&self, lines: usize) -> Result<LogTail> {
        info!("Retrieving last {} commands from instance log...", lines);
        let outcome = self.execute(
            &CommandRequest::new(audit::read_command(lines))
                .with_timeout_secs(30)
                .unaudited(),
        );
        if outcome.success {
            Ok(LogTail::from_output(&outcome.output))
        } else {
            Err(Error::TransportError(format!(
                "Failed to retrieve command log: {}",
                outcome.output
            )))
        }
    }

    /// Delete the remote command log
    pub fn clear_command_log(&self) -> Result<()> {
        info!("Clearing command log on instance...");
        let outcome = self.execute(
            &CommandRequest::new(audit::clear_command())
                .with_timeout_secs(30)
                .unaudited(),
        );
        if outcome.success {
            info!("Command log cleared");
            Ok(())
        } else {
            Err(Error::TransportError(format!(
                "Failed to clear command log: {}",
                outcome.output
            )))
        }
    }
}

fn narrate_command(script_text: &str) {
    let lines: Vec<&str> = script_text.split('\n').collect();
    if lines.len() > NUMBERED_NARRATION_THRESHOLD {
        for (i, line) in lines.iter().enumerate() {
            info!("{:2}: {}", i + 1, line);
        }
    } else {
        info!("{}", script_text);
    }
}

fn narrate_output(request: &CommandRequest, result: &CommandResult) {
    for line in result.stdout.lines() {
        info!("[stdout] {}", request.redact(line));
    }
    for line in result.stderr.lines() {
        warn!("[stderr] {}", request.redact(line));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RecordingSleeper;
    use crate::remote::AccessDetails;
    use std::cell::Cell;

    struct FixedSession;

    impl SessionProvider for FixedSession {
        fn open_session(&self) -> Result<AccessDetails> {
            Ok(AccessDetails::new("ubuntu", "10.0.0.9", "KEY"))
        }
    }

    /// Replays scripted results for non-audit commands
    struct Scripted {
        results: RefCell<Vec<Result<CommandResult>>>,
        calls: Cell<u32>,
    }

    impl Scripted {
        fn new(results: Vec<Result<CommandResult>>) -> Self {
            Self {
                results: RefCell::new(results),
                calls: Cell::new(0),
            }
        }
    }

    impl Transport for Scripted {
        fn run(&self, _access: &AccessDetails, command: &str, _timeout: Duration) -> Result<CommandResult> {
            if command.contains(audit::LOG_PATH) && command.contains("tee -a") {
                return Ok(CommandResult::new(0, "", ""));
            }
            self.calls.set(self.calls.get() + 1);
            let mut results = self.results.borrow_mut();
            if results.is_empty() {
                Ok(CommandResult::new(0, "", ""))
            } else {
                results.remove(0)
            }
        }

        fn probe(&self, _host: &str, _port: u16, _timeout: Duration) -> bool {
            true
        }
    }

    #[test]
    fn test_success_trims_trailing_whitespace() {
        let sleeper = RecordingSleeper::new();
        let transport = Scripted::new(vec![Ok(CommandResult::new(0, "hello\n\n", ""))]);
        let exec = RemoteExecutor::new(&FixedSession, &transport, &sleeper, RuntimeContext::local());

        let outcome = exec.execute(&CommandRequest::new("echo hello"));
        assert_eq!(outcome, ExecOutcome::succeeded("hello".to_string(), 1));
        assert!(sleeper.calls().is_empty());
    }

    #[test]
    fn test_timeout_is_retried_and_reported() {
        let sleeper = RecordingSleeper::new();
        let transport = Scripted::new(vec![Err(Error::Timeout(5)), Err(Error::Timeout(5))]);
        let exec = RemoteExecutor::new(&FixedSession, &transport, &sleeper, RuntimeContext::ci());

        let outcome = exec.execute(&CommandRequest::new("sleep 100").with_retries(2));
        assert!(!outcome.success);
        assert_eq!(outcome.output, "Command timed out after 5 seconds");
        assert_eq!(outcome.attempts, 2);
        assert_eq!(transport.calls.get(), 2);
        assert_eq!(sleeper.calls(), vec![Duration::from_secs(10)]);
    }

    #[test]
    fn test_stepwise_stops_at_first_failure() {
        let sleeper = RecordingSleeper::new();
        let transport = Scripted::new(vec![
            Ok(CommandResult::new(0, "one", "")),
            Ok(CommandResult::new(1, "", "E: broken")),
        ]);
        let exec = RemoteExecutor::new(&FixedSession, &transport, &sleeper, RuntimeContext::local());

        let outcome = exec.execute_stepwise("set -e\necho one\nfalse\necho never");
        assert!(!outcome.success);
        assert_eq!(outcome.output, "Command 2 failed: E: broken");
        assert_eq!(transport.calls.get(), 2);
    }

    #[test]
    fn test_into_result() {
        assert_eq!(ExecOutcome::succeeded("x".into(), 1).into_result("ctx").unwrap(), "x");
        let err = ExecOutcome::failed("boom".into(), 2).into_result("Installing nginx").unwrap_err();
        assert_eq!(err.to_string(), "Install error: Installing nginx: boom");
    }
}
