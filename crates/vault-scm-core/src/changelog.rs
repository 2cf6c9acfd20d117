//! Capturing the history report as a build's changelog and reading it back.

use std::path::Path;

use tracing::{debug, warn};

use crate::domain::{Author, ChangeLogSet, ChangeRecord, HistoryWindow, Result};
use crate::host::UserDirectory;
use crate::report::{HistoryItem, HistoryReport};
use crate::session::Session;

/// Write the history report for `window` to `destination`.
///
/// Returns `Ok(false)` when the client cannot be found or exits non-zero;
/// both are reported on the listener. Gate timeouts and I/O failures are
/// returned as errors.
pub async fn capture_changelog(
    session: &Session<'_>,
    window: &HistoryWindow,
    workspace: &Path,
    destination: &Path,
) -> Result<bool> {
    let executable = match session.locate().await {
        Ok(path) => path,
        Err(e) => {
            warn!(error = %e, "cannot capture changelog");
            return Ok(false);
        }
    };

    let mut artifact = tokio::fs::File::create(destination).await?;
    let exit_code = session
        .run_history(&executable, window, workspace, &mut artifact)
        .await?;
    artifact.sync_all().await?;

    if exit_code != 0 {
        session
            .listener
            .fatal_error(&format!("Changelog failed with exit code {exit_code}"));
        return Ok(false);
    }

    session.listener.info("Changelog calculated successfully.");
    session
        .listener
        .info(&format!("Change log file: {}", destination.display()));
    Ok(true)
}

/// Read a changelog artifact written by [`capture_changelog`].
///
/// An empty artifact is an empty change set; this is what a failed capture
/// leaves behind.
pub fn parse_changelog(artifact: &Path, users: &dyn UserDirectory) -> Result<ChangeLogSet> {
    let raw = std::fs::read(artifact)?;
    if raw.iter().all(u8::is_ascii_whitespace) {
        debug!(path = %artifact.display(), "empty changelog");
        return Ok(ChangeLogSet::default());
    }

    let report = HistoryReport::parse(&String::from_utf8_lossy(&raw))?;
    let entries = report
        .items
        .into_iter()
        .map(|item| to_record(item, users))
        .collect();
    Ok(ChangeLogSet::new(entries))
}

fn to_record(item: HistoryItem, users: &dyn UserDirectory) -> ChangeRecord {
    let author = match users.resolve(&item.user) {
        Some(user) => Author::Known(user),
        None => Author::Unknown,
    };
    ChangeRecord {
        comment: item.comment,
        version: item.version,
        date: item.date,
        author,
    }
}
