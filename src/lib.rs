// src/lib.rs

//! Hoststack
//!
//! Provisions an application stack on a single cloud VM over SSH.
//!
//! # Architecture
//!
//! - OS-aware: one `OsProfile` per run picks the package manager, service
//!   manager and account names every script is written against
//! - Retrying execution: every remote command goes through `RemoteExecutor`,
//!   which fetches fresh credentials per attempt and backs off between tries
//! - Audited: commands are appended to a log file on the target host
//! - Partial-failure tolerant: a failing dependency is recorded and the
//!   install loop moves on

pub mod audit;
pub mod cloud;
pub mod config;
pub mod context;
mod error;
pub mod install;
pub mod lock;
pub mod os;
pub mod progress;
pub mod remote;
pub mod script;

pub use cloud::{CloudProvider, InstanceState, ManagedDbConnection};
pub use config::{ConfigProvider, DeploymentConfig};
pub use context::{RecordingSleeper, RuntimeContext, Sleeper, ThreadSleeper};
pub use error::{Error, Result};
pub use install::{
    DependencyInstaller, DependencyKind, DependencySpec, InstallSettings, InstallSummary,
    InstallationLedger,
};
pub use lock::{LockOutcome, LockWaitReport, LockWaiter};
pub use os::{detect, OsFamily, OsProfile, PackageManager, ServiceManager};
pub use progress::{
    CallbackProgress, CliProgress, DependencyStatus, InstallEvent, LogProgress, ProgressTracker,
    SilentProgress,
};
pub use remote::{
    AccessDetails, CommandRequest, CommandResult, ExecOutcome, RemoteExecutor, SessionProvider,
    SshTransport, StaticHost, Transport,
};
