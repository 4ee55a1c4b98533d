// tests/command_log.rs

//! Remote command log written by the executor and read back.

mod common;

use common::{FakeHost, FakeSession};
use hoststack::audit::{LogKind, LogTail, ParsedLogLine};
use hoststack::{CommandRequest, RecordingSleeper, RemoteExecutor, RuntimeContext};

fn kinds(host: &FakeHost) -> Vec<(LogKind, String)> {
    host.log_lines()
        .iter()
        .map(|line| {
            let parsed = ParsedLogLine::parse(line).unwrap();
            (parsed.kind, parsed.text)
        })
        .collect()
}

#[test]
fn test_single_and_multi_line_entries() {
    let host = FakeHost::new();
    let session = FakeSession::new();
    let sleeper = RecordingSleeper::new();
    let exec = RemoteExecutor::new(&session, &host, &sleeper, RuntimeContext::local());

    exec.execute(&CommandRequest::new("uptime"));
    exec.execute(&CommandRequest::new(
        "set -e\necho \"Installing nginx...\"\n\nsudo apt-get install -y nginx",
    ));

    assert_eq!(
        kinds(&host),
        vec![
            (LogKind::Command, "uptime".to_string()),
            (LogKind::ScriptStart, "Installing nginx...".to_string()),
            (LogKind::Step(1), "echo \"Installing nginx...\"".to_string()),
            (LogKind::Step(2), "sudo apt-get install -y nginx".to_string()),
            (
                LogKind::ScriptEnd,
                "Installing nginx... (executed 2 commands)".to_string()
            ),
        ]
    );
}

#[test]
fn test_single_quotes_survive_the_round_trip() {
    let host = FakeHost::new();
    let session = FakeSession::new();
    let sleeper = RecordingSleeper::new();
    let exec = RemoteExecutor::new(&session, &host, &sleeper, RuntimeContext::local());

    exec.execute(&CommandRequest::new("echo 'it is done'"));

    assert_eq!(kinds(&host), vec![(LogKind::Command, "echo 'it is done'".to_string())]);
}

#[test]
fn test_read_tail_and_clear() {
    let host = FakeHost::new();
    let session = FakeSession::new();
    let sleeper = RecordingSleeper::new();
    let exec = RemoteExecutor::new(&session, &host, &sleeper, RuntimeContext::local());

    assert_eq!(exec.command_log(50).unwrap(), LogTail::Empty);
    assert_eq!(exec.command_log(50).unwrap().to_string(), "No commands logged yet");

    for cmd in ["uptime", "hostname", "whoami"] {
        exec.execute(&CommandRequest::new(cmd));
    }

    let tail = exec.command_log(2).unwrap();
    let lines = tail.lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("COMMAND: hostname"));
    assert!(lines[1].ends_with("COMMAND: whoami"));

    // Reading and clearing are not themselves logged
    assert_eq!(host.log_lines().len(), 3);

    exec.clear_command_log().unwrap();
    assert_eq!(exec.command_log(50).unwrap(), LogTail::Empty);
}
