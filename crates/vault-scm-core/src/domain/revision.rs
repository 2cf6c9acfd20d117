//! Revision markers, polling outcomes and history windows.

use std::path::Path;

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::error::Result;

/// Timestamp format the Vault client accepts for `-begindate`/`-enddate`.
pub const VAULT_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Baseline for "what changed since": the time a build ran.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct RevisionMarker {
    /// When the build this marker belongs to was started.
    pub built_at: DateTime<Utc>,
}

impl RevisionMarker {
    pub fn new(built_at: DateTime<Utc>) -> Self {
        Self { built_at }
    }

    /// Baseline used when there has never been a build.
    pub fn epoch() -> Self {
        Self {
            built_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Baseline from an optional previous build time.
    pub fn from_previous(previous: Option<DateTime<Utc>>) -> Self {
        previous.map(Self::new).unwrap_or_else(Self::epoch)
    }

    /// Persist as JSON so the next poll can use it as its baseline.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

/// Result of comparing the repository against a baseline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PollOutcome {
    NoChanges,
    BuildNow,
}

impl PollOutcome {
    /// Derive the outcome from the number of reported history items.
    pub fn from_item_count(count: usize) -> Self {
        if count == 0 {
            PollOutcome::NoChanges
        } else {
            PollOutcome::BuildNow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PollOutcome::NoChanges => "NO_CHANGES",
            PollOutcome::BuildNow => "BUILD_NOW",
        }
    }
}

impl std::fmt::Display for PollOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time range passed to `VERSIONHISTORY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl HistoryWindow {
    pub fn new(begin: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { begin, end }
    }

    pub fn since(baseline: &RevisionMarker, now: DateTime<Utc>) -> Self {
        Self::new(baseline.built_at, now)
    }

    /// `-begindate` value, in the host's local time zone.
    pub fn begin_arg(&self) -> String {
        format_vault_date(&self.begin, &Local)
    }

    /// `-enddate` value, in the host's local time zone.
    pub fn end_arg(&self) -> String {
        format_vault_date(&self.end, &Local)
    }
}

/// Render a timestamp in [`VAULT_DATE_FORMAT`] for the given zone.
pub fn format_vault_date<Tz>(at: &DateTime<Utc>, zone: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    at.with_timezone(zone).format(VAULT_DATE_FORMAT).to_string()
}
