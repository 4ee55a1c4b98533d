// src/remote/ssh.rs

//! SSH transport using the system `ssh` binary
//!
//! Each command is base64-encoded locally and decoded on the host into
//! `bash`, so arbitrary scripts survive the remote shell untouched. The
//! child process is bounded by a wall-clock timeout and killed when it
//! expires; the remote side may keep running.

use super::credentials::CredentialFiles;
use super::{AccessDetails, CommandResult, Transport};
use crate::context::RuntimeContext;
use crate::error::{Error, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::debug;
use wait_timeout::ChildExt;

/// Wrap a script so the remote shell decodes and runs it verbatim
pub fn encode_remote_command(script: &str) -> String {
    format!("echo '{}' | base64 -d | bash", BASE64.encode(script.as_bytes()))
}

/// Transport backed by OpenSSH
#[derive(Debug, Clone)]
pub struct SshTransport {
    ssh_binary: PathBuf,
    ctx: RuntimeContext,
}

impl SshTransport {
    /// Locate `ssh` on PATH
    pub fn new(ctx: RuntimeContext) -> Result<Self> {
        let ssh_binary = which::which("ssh")
            .map_err(|e| Error::TransportError(format!("ssh binary not found: {}", e)))?;
        Ok(Self { ssh_binary, ctx })
    }

    /// Use an explicit ssh binary
    pub fn with_binary(ssh_binary: impl Into<PathBuf>, ctx: RuntimeContext) -> Self {
        Self {
            ssh_binary: ssh_binary.into(),
            ctx,
        }
    }

    /// Option arguments for one invocation, excluding destination and command
    pub fn build_args(&self, access: &AccessDetails, key_path: &Path, cert_path: Option<&Path>) -> Vec<String> {
        let mut args = vec!["-i".to_string(), key_path.display().to_string()];

        if let Some(cert) = cert_path {
            args.push("-o".to_string());
            args.push(format!("CertificateFile={}", cert.display()));
        }

        let mut options = vec![
            "StrictHostKeyChecking=no".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            format!("ConnectTimeout={}", self.ctx.connect_timeout_secs()),
            format!("ServerAliveInterval={}", self.ctx.keepalive_interval_secs()),
        ];
        if self.ctx.is_ci {
            options.extend([
                "ServerAliveCountMax=6".to_string(),
                "ConnectionAttempts=3".to_string(),
                "TCPKeepAlive=yes".to_string(),
                "PreferredAuthentications=publickey".to_string(),
            ]);
        } else {
            options.push("ServerAliveCountMax=3".to_string());
        }
        options.extend([
            "IdentitiesOnly=yes".to_string(),
            "BatchMode=yes".to_string(),
            "LogLevel=ERROR".to_string(),
        ]);

        for opt in options {
            args.push("-o".to_string());
            args.push(opt);
        }

        args.push("-p".to_string());
        args.push(access.port.to_string());
        args
    }
}

impl Transport for SshTransport {
    fn run(&self, access: &AccessDetails, command: &str, timeout: Duration) -> Result<CommandResult> {
        // Dropped at the end of this call, whatever the outcome
        let creds = CredentialFiles::write(&access.private_key, access.cert_key.as_deref())?;

        let mut cmd = Command::new(&self.ssh_binary);
        cmd.args(self.build_args(access, creds.key_path(), creds.cert_path()))
            .arg(access.destination())
            .arg(encode_remote_command(command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("Running ssh to {} (timeout {}s)", access.destination(), timeout.as_secs());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::TransportError(format!("Failed to spawn ssh: {}", e)))?;

        // Drain pipes concurrently so a chatty command cannot fill them and stall
        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);

        match child.wait_timeout(timeout)? {
            Some(status) => {
                let stdout = stdout_reader.map(join_reader).unwrap_or_default();
                let stderr = stderr_reader.map(join_reader).unwrap_or_default();
                // ssh exits 255 on its own errors; a signal death has no code
                let code = status.code().unwrap_or(-1);
                Ok(CommandResult::new(code, stdout, stderr))
            }
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(Error::Timeout(timeout.as_secs()))
            }
        }
    }

    fn probe(&self, host: &str, port: u16, timeout: Duration) -> bool {
        let addrs = match (host, port).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                debug!("Could not resolve {}: {}", host, e);
                return false;
            }
        };

        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, timeout).is_ok())
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_encode_remote_command() {
        let encoded = encode_remote_command("echo 'hi'");
        assert_eq!(encoded, "echo 'ZWNobyAnaGkn' | base64 -d | bash");
    }

    #[test]
    fn test_build_args_local() {
        let transport = SshTransport::with_binary("/usr/bin/ssh", RuntimeContext::local());
        let access = AccessDetails::new("ec2-user", "10.0.0.5", "KEY").with_port(2222);
        let args = transport.build_args(&access, Path::new("/tmp/k"), Some(Path::new("/tmp/k-cert.pub")));

        assert_eq!(&args[..2], &["-i", "/tmp/k"]);
        assert!(args.contains(&"CertificateFile=/tmp/k-cert.pub".to_string()));
        assert!(args.contains(&"ConnectTimeout=30".to_string()));
        assert!(args.contains(&"ServerAliveInterval=10".to_string()));
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert_eq!(&args[args.len() - 2..], &["-p", "2222"]);
    }

    #[test]
    fn test_build_args_ci_without_cert() {
        let transport = SshTransport::with_binary("ssh", RuntimeContext::ci());
        let access = AccessDetails::new("ubuntu", "h", "KEY");
        let args = transport.build_args(&access, Path::new("/k"), None);

        assert!(args.contains(&"ConnectTimeout=60".to_string()));
        assert!(args.contains(&"ServerAliveInterval=30".to_string()));
        assert!(args.contains(&"ConnectionAttempts=3".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("CertificateFile")));
    }

    #[test]
    fn test_probe_open_and_closed_ports() {
        let transport = SshTransport::with_binary("ssh", RuntimeContext::local());
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(transport.probe("127.0.0.1", port, Duration::from_secs(2)));

        drop(listener);
        assert!(!transport.probe("host.invalid", 22, Duration::from_millis(200)));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_times_out_and_kills_child() {
        use std::os::unix::fs::PermissionsExt;

        // A fake "ssh" that ignores its arguments and hangs
        let dir = tempfile::TempDir::new().unwrap();
        let fake = dir.path().join("ssh");
        std::fs::write(&fake, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let transport = SshTransport::with_binary(&fake, RuntimeContext::local());
        let access = AccessDetails::new("ubuntu", "127.0.0.1", "KEY");
        let err = transport.run(&access, "true", Duration::from_millis(300)).unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_captures_exit_status_and_output() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let fake = dir.path().join("ssh");
        std::fs::write(&fake, "#!/bin/sh\necho out\necho err >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let transport = SshTransport::with_binary(&fake, RuntimeContext::local());
        let access = AccessDetails::new("ubuntu", "127.0.0.1", "KEY");
        let result = transport.run(&access, "true", Duration::from_secs(10)).unwrap();
        assert_eq!(result.exit_status, 3);
        assert!(!result.success);
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
    }
}
