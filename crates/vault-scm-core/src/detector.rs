//! Counting repository changes since a baseline.
//!
//! Polling must never fail a job because of a transient client problem, so
//! most failures here degrade to "no changes" and are logged instead of
//! returned. The exceptions are failures to create or delete the scratch
//! report file.

use std::path::Path;

use tracing::{debug, error, warn};

use crate::domain::{HistoryWindow, PollOutcome, Result, VaultScmError};
use crate::obs::emit_step_degraded;
use crate::report::HistoryReport;
use crate::session::Session;

/// Prefix of the scratch report file created for each poll.
pub const REPORT_PREFIX: &str = "changes";

/// Suffix of the scratch report file created for each poll.
pub const REPORT_SUFFIX: &str = ".txt";

/// Run a history query over `window`, write the report to `report_path`,
/// and return the number of history items in it.
///
/// A non-zero exit is logged and the report is still parsed. A report that
/// cannot be parsed counts as zero. Failing to acquire the execution gate
/// counts as zero without parsing anything.
pub async fn determine_change_count(
    session: &Session<'_>,
    window: &HistoryWindow,
    workspace: &Path,
    report_path: &Path,
) -> Result<usize> {
    session.listener.info("Determine change count.");

    let executable = match session.locate().await {
        Ok(path) => path,
        Err(e) => {
            emit_step_degraded("poll.locate", &e);
            return Ok(0);
        }
    };

    let mut report = tokio::fs::File::create(report_path).await?;
    match session
        .run_history(&executable, window, workspace, &mut report)
        .await
    {
        Ok(0) => {}
        Ok(code) => {
            session.listener.fatal_error(&format!(
                "Determine changes count failed with exit code {code}"
            ));
        }
        Err(e) if e.is_gate_timeout() => {
            warn!(error = %e, "skipping change count");
            return Ok(0);
        }
        Err(e) => {
            session
                .listener
                .fatal_error(&format!("Determine changes count failed: {e}"));
            emit_step_degraded("poll.history", &e);
            return Ok(0);
        }
    }
    drop(report);

    let raw = match tokio::fs::read(report_path).await {
        Ok(raw) => raw,
        Err(e) => {
            error!(path = %report_path.display(), error = %e, "failed to read history report");
            return Ok(0);
        }
    };
    match HistoryReport::parse(&String::from_utf8_lossy(&raw)) {
        Ok(parsed) => {
            debug!(items = parsed.len(), "history report parsed");
            Ok(parsed.len())
        }
        Err(e) => {
            error!(path = %report_path.display(), error = %e, "failed to parse history report");
            Ok(0)
        }
    }
}

/// Decide whether a build is needed, using a scratch report file in the
/// system temp directory that is deleted before returning.
pub async fn poll_changes(
    session: &Session<'_>,
    window: &HistoryWindow,
    workspace: &Path,
) -> Result<(usize, PollOutcome)> {
    poll_changes_in(session, window, workspace, &std::env::temp_dir()).await
}

/// [`poll_changes`] with the scratch report created in `scratch_dir`.
pub async fn poll_changes_in(
    session: &Session<'_>,
    window: &HistoryWindow,
    workspace: &Path,
    scratch_dir: &Path,
) -> Result<(usize, PollOutcome)> {
    let report = tempfile::Builder::new()
        .prefix(REPORT_PREFIX)
        .suffix(REPORT_SUFFIX)
        .tempfile_in(scratch_dir)?
        .into_temp_path();

    let counted = determine_change_count(session, window, workspace, &report).await;

    let path = report.to_path_buf();
    let cleanup = report
        .close()
        .map_err(|source| VaultScmError::TempFileCleanup { path, source });

    let count = settle_scratch(counted, cleanup)?;
    Ok((count, PollOutcome::from_item_count(count)))
}

/// Combine the count with the scratch-file cleanup result.
///
/// A failed cleanup fails the poll. When both fail, the count error wins and
/// the cleanup failure is only logged.
fn settle_scratch(counted: Result<usize>, cleanup: Result<()>) -> Result<usize> {
    match (counted, cleanup) {
        (Ok(count), Ok(())) => Ok(count),
        (Err(e), Ok(())) | (Ok(_), Err(e)) => Err(e),
        (Err(e), Err(cleanup)) => {
            warn!(error = %cleanup, "scratch report left behind");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use tokio::io::{AsyncWrite, AsyncWriteExt};
    use tracing_test::traced_test;

    use crate::command::CommandLine;
    use crate::host::Launcher;

    use crate::domain::{ConnectionProfile, FetchPolicy, RepositoryPath, ScmSettings};
    use crate::executor::SerializedExecutor;
    use crate::fakes::{MemoryFs, MemoryListener, ScriptedLauncher, ScriptedRun};
    use crate::gate::ExecutionGate;
    use crate::host::{StaticToolRegistry, BUILT_IN_NODE};
    use crate::locator::{ExecutableLocator, DEFAULT_CLIENT_PATH};

    const ONE_ITEM: &str = r#"<vault><history><item version="4" user="jdoe" comment="c" date="d"/></history></vault>"#;

    struct Fixture {
        settings: ScmSettings,
        locator: ExecutableLocator,
        executor: SerializedExecutor,
        listener: MemoryListener,
        launcher: Arc<ScriptedLauncher>,
    }

    impl Fixture {
        fn new(script: Vec<ScriptedRun>, gate: ExecutionGate) -> Self {
            let launcher = Arc::new(ScriptedLauncher::new(script));
            Self {
                settings: ScmSettings {
                    profile: ConnectionProfile::default(),
                    policy: FetchPolicy::new(RepositoryPath::new("$/trunk").unwrap()),
                    installation: None,
                },
                locator: ExecutableLocator::new(
                    Arc::new(StaticToolRegistry::default()),
                    Arc::new(MemoryFs::new().with_file(DEFAULT_CLIENT_PATH)),
                ),
                executor: SerializedExecutor::new(launcher.clone(), gate),
                listener: MemoryListener::new(),
                launcher,
            }
        }

        fn session(&self) -> Session<'_> {
            Session {
                settings: &self.settings,
                locator: &self.locator,
                executor: &self.executor,
                listener: &self.listener,
                node: Some(BUILT_IN_NODE),
            }
        }
    }

    fn window() -> HistoryWindow {
        HistoryWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_counts_items_in_report() {
        let fx = Fixture::new(
            vec![ScriptedRun::exit(0).with_stdout(ONE_ITEM)],
            ExecutionGate::isolated(),
        );
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("report.xml");

        let count = determine_change_count(&fx.session(), &window(), dir.path(), &report)
            .await
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(fx.launcher.launches()[0].argv[1], "VERSIONHISTORY");
        assert!(fx.launcher.launches()[0].env.is_empty());
    }

    #[tokio::test]
    async fn test_non_zero_exit_still_parses_report() {
        let fx = Fixture::new(
            vec![ScriptedRun::exit(1).with_stdout(ONE_ITEM)],
            ExecutionGate::isolated(),
        );
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("report.xml");

        let count = determine_change_count(&fx.session(), &window(), dir.path(), &report)
            .await
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(
            fx.listener.fatal_lines(),
            vec!["Determine changes count failed with exit code 1"]
        );
    }

    #[tokio::test]
    async fn test_unparseable_report_counts_zero() {
        let fx = Fixture::new(
            vec![ScriptedRun::exit(0).with_stdout("<vault><history>")],
            ExecutionGate::isolated(),
        );
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("report.xml");

        let count = determine_change_count(&fx.session(), &window(), dir.path(), &report)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_launch_failure_counts_zero() {
        let fx = Fixture::new(vec![ScriptedRun::io_error("no such file")], ExecutionGate::isolated());
        let (count, outcome) = poll_changes(&fx.session(), &window(), Path::new("/ws"))
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(outcome, PollOutcome::NoChanges);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_timeout_counts_zero_without_launch() {
        let gate = ExecutionGate::isolated().with_acquire_timeout(Duration::from_secs(1));
        let fx = Fixture::new(vec![ScriptedRun::exit(0).with_stdout(ONE_ITEM)], gate.clone());
        let _held = gate.acquire().await.unwrap();

        let (count, outcome) = poll_changes(&fx.session(), &window(), Path::new("/ws"))
            .await
            .unwrap();

        assert_eq!(count, 0);
        assert_eq!(outcome, PollOutcome::NoChanges);
        assert_eq!(fx.launcher.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_poll_reports_build_now_and_removes_scratch_file() {
        let fx = Fixture::new(
            vec![ScriptedRun::exit(0).with_stdout(ONE_ITEM)],
            ExecutionGate::isolated(),
        );
        let scratch = tempfile::tempdir().unwrap();
        let (count, outcome) =
            poll_changes_in(&fx.session(), &window(), Path::new("/ws"), scratch.path())
                .await
                .unwrap();
        assert_eq!(count, 1);
        assert_eq!(outcome, PollOutcome::BuildNow);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_client_counts_zero() {
        let mut fx = Fixture::new(vec![ScriptedRun::exit(0)], ExecutionGate::isolated());
        fx.locator = ExecutableLocator::new(
            Arc::new(StaticToolRegistry::default()),
            Arc::new(MemoryFs::new()),
        );
        let (count, _) = poll_changes(&fx.session(), &window(), Path::new("/ws"))
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(fx.launcher.launch_count(), 0);
    }

    /// Removes every file in `dir` while the history query runs.
    struct ScratchSweeper {
        dir: PathBuf,
    }

    #[async_trait]
    impl Launcher for ScratchSweeper {
        async fn launch(
            &self,
            _command: &CommandLine,
            _env: &BTreeMap<String, String>,
            _pwd: &Path,
            stdout: &mut (dyn AsyncWrite + Send + Unpin),
        ) -> io::Result<i32> {
            stdout.write_all(ONE_ITEM.as_bytes()).await?;
            stdout.flush().await?;
            for entry in std::fs::read_dir(&self.dir)? {
                std::fs::remove_file(entry?.path())?;
            }
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_scratch_file_removal_failure_is_error() {
        let scratch = tempfile::tempdir().unwrap();
        let mut fx = Fixture::new(vec![], ExecutionGate::isolated());
        fx.executor = SerializedExecutor::new(
            Arc::new(ScratchSweeper {
                dir: scratch.path().to_path_buf(),
            }),
            ExecutionGate::isolated(),
        );

        let err = poll_changes_in(&fx.session(), &window(), Path::new("/ws"), scratch.path())
            .await
            .unwrap_err();

        match err {
            VaultScmError::TempFileCleanup { path, source } => {
                assert!(path.starts_with(scratch.path()));
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected TempFileCleanup, got {other:?}"),
        }
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[traced_test]
    #[test]
    fn test_count_error_wins_over_cleanup_error() {
        let counted = Err(VaultScmError::Io(io::Error::other("report unwritable")));
        let cleanup = Err(VaultScmError::TempFileCleanup {
            path: PathBuf::from("/tmp/changes1.txt"),
            source: io::Error::from(io::ErrorKind::NotFound),
        });

        let err = settle_scratch(counted, cleanup).unwrap_err();

        assert!(matches!(err, VaultScmError::Io(_)));
        assert!(logs_contain("scratch report left behind"));
        assert!(logs_contain("/tmp/changes1.txt"));
    }

    #[test]
    fn test_cleanup_error_fails_successful_count() {
        let cleanup = Err(VaultScmError::TempFileCleanup {
            path: PathBuf::from("/tmp/changes2.txt"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        });
        assert!(matches!(
            settle_scratch(Ok(3), cleanup),
            Err(VaultScmError::TempFileCleanup { .. })
        ));
        assert_eq!(settle_scratch(Ok(3), Ok(())).unwrap(), 3);
    }
}
