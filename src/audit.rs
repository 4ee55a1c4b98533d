// src/audit.rs

//! Remote command audit log
//!
//! Every command the executor sends is also appended to a plain-text log on
//! the target host, one entry per line:
//!
//! ```text
//! [2024-05-01 12:00:00 UTC] COMMAND: sudo apt-get update -qq
//! [2024-05-01 12:00:01 UTC] SCRIPT_START: Installing Apache
//! [2024-05-01 12:00:01 UTC] CMD_01: sudo apt-get install -y apache2
//! [2024-05-01 12:00:02 UTC] SCRIPT_END: Installing Apache (executed 1 commands)
//! ```
//!
//! Other tooling reads this file, so the format is fixed. Writes are
//! diagnostic only: a failed write never affects the command it describes.

use crate::error::{Error, Result};
use crate::remote::RemoteSession;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

/// Log file on the target host
pub const LOG_PATH: &str = "/var/log/deployment-commands.log";

/// Timeout for a single entry write
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(15);

/// Sentinel printed by the read command when the file is missing
pub const NO_LOG_SENTINEL: &str = "No command log found";

/// Description used when a script has no descriptive echo
pub const DEFAULT_DESCRIPTION: &str = "Multi-line script";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Kind of audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Command,
    ScriptStart,
    /// One line of a multi-line script, numbered from 1
    Step(u32),
    ScriptEnd,
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command => f.write_str("COMMAND"),
            Self::ScriptStart => f.write_str("SCRIPT_START"),
            Self::Step(n) => write!(f, "CMD_{:02}", n),
            Self::ScriptEnd => f.write_str("SCRIPT_END"),
        }
    }
}

impl FromStr for LogKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "COMMAND" => Ok(Self::Command),
            "SCRIPT_START" => Ok(Self::ScriptStart),
            "SCRIPT_END" => Ok(Self::ScriptEnd),
            other => other
                .strip_prefix("CMD_")
                .and_then(|n| n.parse().ok())
                .map(Self::Step)
                .ok_or_else(|| Error::ParseError(format!("Unknown log entry kind: {}", other))),
        }
    }
}

/// One timestamped audit entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: LogKind,
    pub text: String,
}

impl LogEntry {
    /// Entry stamped with the current time
    pub fn now(kind: LogKind, text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            text: text.into(),
        }
    }

    /// Shell command appending this entry to the remote log
    pub fn append_command(&self) -> String {
        format!(
            "sudo mkdir -p /var/log && echo '{}' | sudo tee -a {} > /dev/null",
            escape_single_quotes(&self.to_string()),
            LOG_PATH
        )
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} UTC] {}: {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.kind,
            self.text
        )
    }
}

/// Close, escape and reopen a single-quoted shell string around each `'`
pub fn escape_single_quotes(s: &str) -> String {
    s.replace('\'', r#"'"'"'"#)
}

/// Human readable description of a script
///
/// Taken from the first `echo` line that carries a quoted message, with
/// quotes and leading decorative symbols removed.
pub fn script_description(script: &str) -> String {
    for line in script.lines() {
        let line = line.trim();
        let Some(message) = line.strip_prefix("echo ") else {
            continue;
        };
        if !line.contains('"') && !line.contains('\'') {
            continue;
        }

        let message = message.trim_start();
        let message = if message.starts_with('"') {
            message.replace('"', "")
        } else if message.starts_with('\'') {
            message.replace('\'', "")
        } else {
            message.to_string()
        };

        let cleaned = message.trim_start_matches(|c: char| !c.is_alphanumeric()).trim();
        if !cleaned.is_empty() {
            return cleaned.to_string();
        }
    }
    DEFAULT_DESCRIPTION.to_string()
}

/// Script lines that get their own step entry
pub fn loggable_steps(script: &str) -> Vec<&str> {
    script
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && *line != "set -e")
        .collect()
}

/// Entries describing one command, in write order
pub fn plan_entries(command: &str) -> Vec<(LogKind, String)> {
    if !command.contains('\n') {
        return vec![(LogKind::Command, command.to_string())];
    }

    let description = script_description(command);
    let steps = loggable_steps(command);
    let count = steps.len();

    let mut entries = Vec::with_capacity(count + 2);
    entries.push((LogKind::ScriptStart, description.clone()));
    for (i, step) in steps.into_iter().enumerate() {
        entries.push((LogKind::Step(i as u32 + 1), step.to_string()));
    }
    entries.push((
        LogKind::ScriptEnd,
        format!("{} (executed {} commands)", description, count),
    ));
    entries
}

/// Writes audit entries to the remote log
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandLogger;

impl CommandLogger {
    pub fn new() -> Self {
        Self
    }

    /// Append the entries for `command`
    ///
    /// Each entry is stamped when it is written and goes out as its own
    /// remote call. All entries are attempted; the first failure is
    /// returned so callers can discard it explicitly.
    pub fn log(&self, session: &RemoteSession<'_>, command: &str) -> Result<()> {
        let mut first_error = None;

        for (kind, text) in plan_entries(command) {
            let entry = LogEntry::now(kind, text);
            if let Err(e) = write_entry(session, &entry) {
                debug!("Audit write for {} failed: {}", entry.kind, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn write_entry(session: &RemoteSession<'_>, entry: &LogEntry) -> Result<()> {
    let result = session.run(&entry.append_command(), WRITE_TIMEOUT)?;
    if result.success {
        Ok(())
    } else {
        Err(Error::TransportError(format!(
            "Audit log write failed: {}",
            result.error_text()
        )))
    }
}

/// Command printing the last `lines` entries, or the sentinel
pub fn read_command(lines: usize) -> String {
    format!(
        "sudo tail -n {} {} 2>/dev/null || echo '{}'",
        lines, LOG_PATH, NO_LOG_SENTINEL
    )
}

/// Command deleting the log file
pub fn clear_command() -> String {
    format!("sudo rm -f {} && echo 'Command log cleared'", LOG_PATH)
}

/// Result of reading the remote log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTail {
    Entries(String),
    /// The log file does not exist yet
    Empty,
}

impl LogTail {
    pub fn from_output(output: &str) -> Self {
        if output.contains(NO_LOG_SENTINEL) || output.trim().is_empty() {
            Self::Empty
        } else {
            Self::Entries(output.to_string())
        }
    }

    pub fn lines(&self) -> Vec<&str> {
        match self {
            Self::Entries(text) => text.lines().collect(),
            Self::Empty => Vec::new(),
        }
    }
}

impl fmt::Display for LogTail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entries(text) => f.write_str(text),
            Self::Empty => f.write_str("No commands logged yet"),
        }
    }
}

static LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}) UTC\] ([A-Z_0-9]+): (.*)$").unwrap()
});

/// A log line split back into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLogLine {
    pub timestamp: DateTime<Utc>,
    pub kind: LogKind,
    pub text: String,
}

impl ParsedLogLine {
    pub fn parse(line: &str) -> Result<Self> {
        let caps = LINE_RE
            .captures(line.trim_end())
            .ok_or_else(|| Error::ParseError(format!("Malformed log line: {}", line)))?;

        let naive = NaiveDateTime::parse_from_str(&caps[1], TIMESTAMP_FORMAT)
            .map_err(|e| Error::ParseError(format!("Bad timestamp {}: {}", &caps[1], e)))?;

        Ok(Self {
            timestamp: naive.and_utc(),
            kind: caps[2].parse()?,
            text: caps[3].to_string(),
        })
    }
}
