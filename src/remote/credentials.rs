// src/remote/credentials.rs

//! Per-attempt credential files
//!
//! `ssh` reads identities from disk, so each attempt materializes the key
//! (and certificate) into a private temporary directory. The directory is
//! removed when [`CredentialFiles`] is dropped, on every exit path.

use crate::error::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Key and certificate files for one attempt
#[derive(Debug)]
pub struct CredentialFiles {
    dir: TempDir,
    key_path: PathBuf,
    cert_path: Option<PathBuf>,
}

impl CredentialFiles {
    /// Write key material to a fresh temporary directory
    pub fn write(private_key: &str, cert_key: Option<&str>) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("hoststack-ssh-")
            .tempdir()
            .map_err(|e| Error::IoError(format!("Failed to create credential directory: {}", e)))?;

        let key_path = dir.path().join("id_key");
        write_private(&key_path, private_key)?;

        // ssh finds the certificate next to the key as <key>-cert.pub
        let cert_path = match cert_key {
            Some(cert) => {
                let path = dir.path().join("id_key-cert.pub");
                write_private(&path, &normalize_certificate(cert))?;
                Some(path)
            }
            None => None,
        };

        Ok(Self {
            dir,
            key_path,
            cert_path,
        })
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    pub fn cert_path(&self) -> Option<&Path> {
        self.cert_path.as_deref()
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Keep `<type> <base64>` from a certificate line, dropping the comment
pub fn normalize_certificate(cert: &str) -> String {
    let parts: Vec<&str> = cert.split_whitespace().collect();
    if parts.len() >= 2 {
        format!("{} {}\n", parts[0], parts[1])
    } else {
        format!("{}\n", cert.trim())
    }
}

fn write_private(path: &Path, contents: &str) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .map_err(|e| Error::IoError(format!("Failed to create {}: {}", path.display(), e)))?;
    file.write_all(contents.as_bytes())?;
    if !contents.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_removed_on_drop() {
        let creds = CredentialFiles::write("KEY", Some("ssh-ed25519-cert-v01@openssh.com AAAAC3 comment")).unwrap();
        let dir = creds.dir().to_path_buf();
        assert!(creds.key_path().exists());
        let cert = fs::read_to_string(creds.cert_path().unwrap()).unwrap();
        assert_eq!(cert, "ssh-ed25519-cert-v01@openssh.com AAAAC3\n");

        drop(creds);
        assert!(!dir.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let creds = CredentialFiles::write("KEY\n", None).unwrap();
        let mode = fs::metadata(creds.key_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(creds.cert_path().is_none());
        assert_eq!(fs::read_to_string(creds.key_path()).unwrap(), "KEY\n");
    }

    #[test]
    fn test_normalize_certificate_single_token() {
        assert_eq!(normalize_certificate("  token  "), "token\n");
    }
}
