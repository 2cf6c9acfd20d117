//! Domain-level error taxonomy for vault-scm.

use std::path::PathBuf;
use std::time::Duration;

/// vault-scm errors.
///
/// Messages are safe to show in a build log: nothing here ever carries the
/// connection password, and commands are only rendered in redacted form.
#[derive(Debug, thiserror::Error)]
pub enum VaultScmError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid repository path {0:?}: must start with '$'")]
    InvalidRepositoryPath(String),

    #[error("unknown {field} option {value:?} (expected one of: {expected})")]
    UnknownOption {
        field: &'static str,
        value: String,
        expected: String,
    },

    #[error("Failed to find Vault path: {0}")]
    ToolNotFound(String),

    #[error("Failed to acquire semaphore after {}s", .0.as_secs())]
    GateTimeout(Duration),

    #[error("execution gate closed")]
    GateClosed,

    #[error("vault client timed out after {}s: {command}", .limit.as_secs())]
    ProcessTimeout { command: String, limit: Duration },

    #[error("Failed to pull vault contents (exit code {exit_code})")]
    FetchFailed { exit_code: i32 },

    #[error("history report parse error: {0}")]
    ReportParse(String),

    #[error("failed to remove temporary report {}: {source}", .path.display())]
    TempFileCleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultScmError {
    /// Whether this error came from contention on the execution gate.
    pub fn is_gate_timeout(&self) -> bool {
        matches!(self, VaultScmError::GateTimeout(_))
    }
}

/// Result type for vault-scm operations.
pub type Result<T> = std::result::Result<T, VaultScmError>;
