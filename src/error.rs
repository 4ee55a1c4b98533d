// src/error.rs

//! Error types for hoststack
//!
//! The remote executor and the dependency installer never surface these
//! across their public boundary: they convert every error into an outcome.
//! Everything below them (transports, session providers, config loading,
//! cloud lookups) returns `Result<T>`.

use thiserror::Error;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by hoststack components
#[derive(Error, Debug)]
pub enum Error {
    /// Local I/O failure (temp files, reading key material)
    #[error("I/O error: {0}")]
    IoError(String),

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Fresh session credentials could not be obtained
    #[error("Session error: {0}")]
    SessionError(String),

    /// The remote transport failed before the command produced an exit status
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The attempt exceeded its wall-clock budget
    #[error("Command timed out after {0} seconds")]
    Timeout(u64),

    /// Cloud resource lookup failed
    #[error("Cloud provider error: {0}")]
    CloudError(String),

    /// A dependency installation routine failed
    #[error("Install error: {0}")]
    InstallError(String),

    /// Malformed input (log lines, option values)
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}
