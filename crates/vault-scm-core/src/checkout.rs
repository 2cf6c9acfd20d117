//! Fetching a repository folder into a workspace and recording what changed.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::changelog::capture_changelog;
use crate::domain::{HistoryWindow, Result, RevisionMarker, VaultScmError};
use crate::host::{BuildContext, Clock, ListenerWriter};
use crate::obs::{emit_checkout_finished, emit_step_degraded};
use crate::session::Session;

/// What happened to the changelog during a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "path", rename_all = "snake_case")]
pub enum ChangelogStatus {
    /// The caller did not ask for one.
    NotRequested,

    /// The history report was written to this path.
    Recorded(PathBuf),

    /// Capture was attempted and failed; the reason is in the build log.
    Failed,
}

impl ChangelogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangelogStatus::NotRequested => "not_requested",
            ChangelogStatus::Recorded(_) => "recorded",
            ChangelogStatus::Failed => "failed",
        }
    }
}

/// Result of a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutOutcome {
    /// Start of the changelog window.
    pub baseline: RevisionMarker,

    pub changelog: ChangelogStatus,
}

/// Fetch the configured folder into `workspace`, then, if `changelog` is
/// given, record the history since the previous build there.
///
/// The fetch runs with the build's environment and its output goes to the
/// build log. Failing to find the client or a non-zero fetch exit aborts
/// the checkout. A failed changelog is reported but does not abort, except
/// when the execution gate could not be acquired.
pub async fn checkout(
    session: &Session<'_>,
    build: &BuildContext,
    workspace: &Path,
    changelog: Option<&Path>,
    clock: &dyn Clock,
) -> Result<CheckoutOutcome> {
    let listener = session.listener;

    let executable = session.locate().await.map_err(|e| {
        listener.fatal_error("Failed to find Vault path.");
        e
    })?;

    let command = session.commands().fetch(&executable, workspace);
    let mut log = ListenerWriter::new(listener);
    let exit_code = session
        .executor
        .run(&command, &build.env, workspace, &mut log)
        .await?;
    if exit_code != 0 {
        listener.fatal_error("Failed to pull vault contents.");
        return Err(VaultScmError::FetchFailed { exit_code });
    }

    let baseline = RevisionMarker::from_previous(build.previous_build_at);
    if build.previous_build_at.is_none() {
        listener.info("Never been built.");
    }

    let status = match changelog {
        None => ChangelogStatus::NotRequested,
        Some(destination) => {
            let window = HistoryWindow::since(&baseline, clock.now());
            info!(
                begin = %window.begin_arg(),
                end = %window.end_arg(),
                "capturing changelog"
            );
            match capture_changelog(session, &window, workspace, destination).await {
                Ok(true) => ChangelogStatus::Recorded(destination.to_path_buf()),
                Ok(false) => ChangelogStatus::Failed,
                Err(e) if e.is_gate_timeout() => {
                    listener.fatal_error(&e.to_string());
                    return Err(e);
                }
                Err(e) => {
                    listener.fatal_error(&format!("Changelog failed: {e}"));
                    emit_step_degraded("checkout.changelog", &e);
                    ChangelogStatus::Failed
                }
            }
        }
    };

    listener.info("Checkout completed.");
    emit_checkout_finished(
        session.settings.policy.path.as_str(),
        build.number,
        status.as_str(),
    );
    Ok(CheckoutOutcome {
        baseline,
        changelog: status,
    })
}
