//! Structured observability hooks for Vault client operations.
//!
//! This module provides:
//! - Invocation-scoped tracing spans via `InvocationSpan`
//! - Emission functions for poll, checkout and client process events
//!
//! Command lines reach these functions already redacted; nothing here
//! ever sees a password.

use std::path::Path;

use tracing::{info, warn};
use uuid::Uuid;

/// Span for one poll, checkout or changelog call.
///
/// Attach it with [`tracing::Instrument`] so it follows the future across
/// await points.
///
/// # Example
///
/// ```ignore
/// let span = InvocationSpan::new("poll", "$/trunk");
/// poll(...).instrument(span.span().clone()).await;
/// // client launches inside are tagged with the same invocation_id
/// ```
pub struct InvocationSpan {
    invocation_id: Uuid,
    span: tracing::Span,
}

impl InvocationSpan {
    pub fn new(operation: &str, repository_path: &str) -> Self {
        let invocation_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "vault_scm.invocation",
            operation = %operation,
            invocation_id = %invocation_id,
            path = %repository_path,
        );
        Self {
            invocation_id,
            span,
        }
    }

    pub fn invocation_id(&self) -> Uuid {
        self.invocation_id
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

pub fn emit_poll_started(path: &str, since: &str) {
    info!(event = "poll.started", path = %path, since = %since);
}

/// Emit event: poll finished with the item count and the decision.
pub fn emit_poll_finished(path: &str, changes: usize, outcome: &str) {
    info!(
        event = "poll.finished",
        path = %path,
        changes = changes,
        outcome = %outcome,
    );
}

/// Emit event: a client process is about to start.
///
/// `command` must be the redacted rendering of the command line.
pub fn emit_command_launched(command: &str, pwd: &Path) {
    info!(event = "command.launched", command = %command, pwd = %pwd.display());
}

pub fn emit_command_exited(command: &str, exit_code: i32, duration_ms: u64) {
    info!(
        event = "command.exited",
        command = %command,
        exit_code = exit_code,
        duration_ms = duration_ms,
    );
}

/// Emit event: checkout finished, with whether a changelog was recorded.
pub fn emit_checkout_finished(path: &str, build_number: u64, changelog: &str) {
    info!(
        event = "checkout.finished",
        path = %path,
        build_number = build_number,
        changelog = %changelog,
    );
}

/// Emit event: a step failed in a way the caller tolerates (warning level).
pub fn emit_step_degraded(step: &str, error: &dyn std::fmt::Display) {
    warn!(event = "step.degraded", step = %step, error = %error);
}
