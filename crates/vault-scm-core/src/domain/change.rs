//! Change records parsed from a persisted changelog.

use serde::{Deserialize, Serialize};

/// Path reported for every change; the history report is not per-file.
pub const PLACEHOLDER_PATH: &str = "user defined path";

/// A user known to the host's user directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Stable identifier (the Vault login name).
    pub id: String,

    /// Name shown in build pages.
    pub display_name: String,
}

/// Who made a change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Author {
    Known(User),
    Unknown,
}

impl Author {
    pub fn display_name(&self) -> &str {
        match self {
            Author::Known(user) => &user.display_name,
            Author::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EditType {
    Add,
    Edit,
    Delete,
}

/// One item of a Vault history report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeRecord {
    pub comment: String,

    pub version: String,

    /// Date exactly as the client reported it.
    pub date: String,

    pub author: Author,
}

impl ChangeRecord {
    /// One-line summary shown in change lists.
    pub fn msg(&self) -> String {
        format!("Changed:  Version: {} Comment: {}", self.version, self.comment)
    }

    pub fn affected_paths(&self) -> Vec<&'static str> {
        vec![PLACEHOLDER_PATH]
    }

    pub fn edit_type(&self) -> EditType {
        EditType::Edit
    }
}

/// The changes recorded for one build, in report order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeLogSet {
    entries: Vec<ChangeRecord>,
}

impl ChangeLogSet {
    pub fn new(entries: Vec<ChangeRecord>) -> Self {
        Self { entries }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChangeRecord> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for ChangeLogSet {
    type Item = ChangeRecord;
    type IntoIter = std::vec::IntoIter<ChangeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a ChangeLogSet {
    type Item = &'a ChangeRecord;
    type IntoIter = std::slice::Iter<'a, ChangeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
