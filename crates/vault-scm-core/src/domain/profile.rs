//! Connection profile and fetch policy.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::error::{Result, VaultScmError};
use super::secret::Password;

/// How to reach the Vault server.
///
/// Every string field may be empty, in which case the matching flag is left
/// off the command line and the client uses its remembered login.
#[derive(Debug, Clone, Default)]
pub struct ConnectionProfile {
    /// Server host name (`-host`).
    pub server: String,

    /// Login user (`-user`).
    pub user: String,

    /// Login password (`-password`), never logged.
    pub password: Password,

    /// Repository name (`-repository`).
    pub repository: String,

    /// Connect over SSL (`-ssl`).
    pub ssl: bool,
}

/// Path inside the Vault repository, always rooted at `$`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RepositoryPath(String);

impl RepositoryPath {
    /// Marker every repository path starts with.
    pub const ROOT: char = '$';

    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if !path.starts_with(Self::ROOT) {
            return Err(VaultScmError::InvalidRepositoryPath(path));
        }
        Ok(RepositoryPath(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepositoryPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RepositoryPath {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        RepositoryPath::new(raw).map_err(serde::de::Error::custom)
    }
}

/// `-merge` behaviour for files changed both locally and in the repository.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    Automatic,
    #[default]
    Overwrite,
    Later,
}

impl MergeStrategy {
    pub const ALL: [MergeStrategy; 3] = [
        MergeStrategy::Automatic,
        MergeStrategy::Overwrite,
        MergeStrategy::Later,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::Automatic => "automatic",
            MergeStrategy::Overwrite => "overwrite",
            MergeStrategy::Later => "later",
        }
    }

    /// Parse an optional configured value; blank means the default.
    pub fn from_setting(value: Option<&str>) -> Result<Self> {
        match value.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some(v) => v.parse(),
        }
    }
}

impl FromStr for MergeStrategy {
    type Err = VaultScmError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| VaultScmError::UnknownOption {
                field: "merge",
                value: s.to_string(),
                expected: option_list(Self::ALL.iter().map(|m| m.as_str())),
            })
    }
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `-setfiletime` behaviour for fetched files.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileTimePolicy {
    Checkin,
    Current,
    #[default]
    Modification,
}

impl FileTimePolicy {
    pub const ALL: [FileTimePolicy; 3] = [
        FileTimePolicy::Checkin,
        FileTimePolicy::Current,
        FileTimePolicy::Modification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileTimePolicy::Checkin => "checkin",
            FileTimePolicy::Current => "current",
            FileTimePolicy::Modification => "modification",
        }
    }

    /// Parse an optional configured value; blank means the default.
    pub fn from_setting(value: Option<&str>) -> Result<Self> {
        match value.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some(v) => v.parse(),
        }
    }
}

impl FromStr for FileTimePolicy {
    type Err = VaultScmError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| VaultScmError::UnknownOption {
                field: "file time",
                value: s.to_string(),
                expected: option_list(Self::ALL.iter().map(|t| t.as_str())),
            })
    }
}

impl std::fmt::Display for FileTimePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn option_list<'a>(options: impl Iterator<Item = &'a str>) -> String {
    options.collect::<Vec<_>>().join(", ")
}

/// What to fetch and how to lay it down in the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Repository folder to fetch.
    pub path: RepositoryPath,

    pub merge: MergeStrategy,

    pub file_time: FileTimePolicy,

    /// Fetch into a non-working folder (`-nonworkingfolder`) instead of
    /// binding the workspace as the working folder.
    pub use_non_working_folder: bool,

    /// Leave fetched files writable (`-makewritable`).
    pub make_writable: bool,

    /// Ask the client for verbose output (`-verbose`).
    pub verbose: bool,
}

impl FetchPolicy {
    /// A policy with default merge and file-time handling and all toggles off.
    pub fn new(path: RepositoryPath) -> Self {
        Self {
            path,
            merge: MergeStrategy::default(),
            file_time: FileTimePolicy::default(),
            use_non_working_folder: false,
            make_writable: false,
            verbose: false,
        }
    }
}

/// Everything one poll or checkout needs to know about the job's Vault setup.
#[derive(Debug, Clone)]
pub struct ScmSettings {
    pub profile: ConnectionProfile,

    pub policy: FetchPolicy,

    /// Name of the configured client installation, if any.
    pub installation: Option<String>,
}

impl ScmSettings {
    /// Revision key reported to the host: the installation name.
    pub fn key(&self) -> Option<&str> {
        self.installation.as_deref()
    }
}
