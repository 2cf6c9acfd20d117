//! Domain models for vault-scm.
//!
//! Canonical definitions for the core entities:
//! - `ConnectionProfile` / `FetchPolicy`: immutable per-invocation settings
//! - `Password`: credential that only ever prints redacted
//! - `RevisionMarker` / `PollOutcome` / `HistoryWindow`: change detection inputs and outputs
//! - `ChangeRecord` / `ChangeLogSet`: parsed changelog entries

pub mod change;
pub mod error;
pub mod profile;
pub mod revision;
pub mod secret;

// Re-export main types and errors
pub use change::{Author, ChangeLogSet, ChangeRecord, EditType, User, PLACEHOLDER_PATH};
pub use error::{Result, VaultScmError};
pub use profile::{
    ConnectionProfile, FetchPolicy, FileTimePolicy, MergeStrategy, RepositoryPath, ScmSettings,
};
pub use revision::{format_vault_date, HistoryWindow, PollOutcome, RevisionMarker, VAULT_DATE_FORMAT};
pub use secret::{Password, REDACTED};
