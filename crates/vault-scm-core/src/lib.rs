//! vault-scm Core Library
//!
//! Drives the SourceGear Vault command-line client for a CI host: locating
//! the client, fetching a repository folder into a workspace, polling for
//! changes since a previous build, and recording and parsing changelogs.
//! Every client invocation in the process is serialized through one
//! execution gate.

pub mod changelog;
pub mod checkout;
pub mod command;
pub mod config;
pub mod detector;
pub mod domain;
pub mod executor;
pub mod fakes;
pub mod gate;
pub mod host;
pub mod locator;
pub mod obs;
pub mod report;
pub mod scm;
pub mod session;
pub mod telemetry;

pub use domain::{
    format_vault_date, Author, ChangeLogSet, ChangeRecord, ConnectionProfile, EditType,
    FetchPolicy, FileTimePolicy, HistoryWindow, MergeStrategy, Password, PollOutcome,
    RepositoryPath, Result, RevisionMarker, ScmSettings, User, VaultScmError, PLACEHOLDER_PATH,
    REDACTED, VAULT_DATE_FORMAT,
};

pub use changelog::{capture_changelog, parse_changelog};
pub use checkout::{ChangelogStatus, CheckoutOutcome};
pub use command::{CommandBuilder, CommandLine};
pub use config::ScmConfig;
pub use detector::{determine_change_count, poll_changes};
pub use executor::SerializedExecutor;
pub use gate::{ExecutionGate, GatePermit, GATE_ACQUIRE_TIMEOUT};
pub use host::local::{LocalFs, LocalLauncher, SystemClock, TracingListener};
pub use host::{
    BuildContext, Clock, Launcher, ListenerWriter, NodeFs, StaticToolRegistry,
    StaticUserDirectory, TaskListener, ToolInstallation, ToolRegistry, UserDirectory,
    BUILT_IN_NODE,
};
pub use locator::{ExecutableLocator, DEFAULT_CLIENT_PATH, DEFAULT_CLIENT_PATH_X86};
pub use report::{HistoryItem, HistoryReport};
pub use scm::{HostServices, ScmOptions, VaultScm};
pub use session::Session;

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
