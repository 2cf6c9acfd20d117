//! Checkout: fetch, baseline selection and changelog capture.

mod common;

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone, Utc};
use tokio::io::AsyncWrite;
use vault_scm_core::fakes::{MemoryListener, ScriptedLauncher, ScriptedRun};
use vault_scm_core::{
    format_vault_date, BuildContext, ChangelogStatus, CommandLine, ExecutionGate, Launcher,
    RevisionMarker, VaultScmError,
};

/// Test: a failed fetch aborts and the changelog is never attempted
#[tokio::test]
async fn test_fetch_exit_one_aborts_without_changelog() {
    let launcher = Arc::new(ScriptedLauncher::new(vec![
        ScriptedRun::exit(1),
        ScriptedRun::exit(0).with_stdout(common::history_report(1)),
    ]));
    let scm = common::scripted_scm(&launcher, ExecutionGate::isolated());
    let listener = MemoryListener::new();
    let ws = tempfile::tempdir().unwrap();
    let changelog = ws.path().join("changelog.xml");

    let err = scm
        .checkout(&BuildContext::new(9, common::now()), ws.path(), &listener, Some(&changelog))
        .await
        .unwrap_err();

    assert!(matches!(err, VaultScmError::FetchFailed { exit_code: 1 }));
    assert_eq!(launcher.launch_count(), 1);
    assert_eq!(launcher.launches()[0].argv[1], "GET");
    assert!(!changelog.exists());
    assert!(!listener.text().contains("Checkout completed."));
}

/// Test: with no previous build the changelog starts at the epoch
#[tokio::test]
async fn test_first_build_changelog_starts_at_epoch() {
    let launcher = Arc::new(ScriptedLauncher::new(vec![
        ScriptedRun::exit(0),
        ScriptedRun::exit(0).with_stdout(common::history_report(0)),
    ]));
    let scm = common::scripted_scm(&launcher, ExecutionGate::isolated());
    let listener = MemoryListener::new();
    let ws = tempfile::tempdir().unwrap();
    let changelog = ws.path().join("changelog.xml");

    let outcome = scm
        .checkout(&BuildContext::new(1, common::now()), ws.path(), &listener, Some(&changelog))
        .await
        .unwrap();

    assert_eq!(outcome.baseline, RevisionMarker::epoch());
    let history = &launcher.launches()[1].redacted;
    let begin = history.iter().position(|a| a == "-begindate").unwrap();
    assert_eq!(
        history[begin + 1],
        format_vault_date(&DateTime::<Utc>::UNIX_EPOCH, &Local)
    );
    assert_ne!(history[begin + 1], format_vault_date(&common::now(), &Local));
    assert!(listener.info_lines().contains(&"Never been built.".to_string()));
}

/// Test: fetch gets the build environment, the history query gets none
#[tokio::test]
async fn test_fetch_command_and_environment() {
    let launcher = Arc::new(ScriptedLauncher::new(vec![
        ScriptedRun::exit(0).with_stdout("Getting $/trunk/a.txt\n"),
        ScriptedRun::exit(0).with_stdout(common::history_report(1)),
    ]));
    let scm = common::scripted_scm(&launcher, ExecutionGate::isolated());
    let listener = MemoryListener::new();
    let ws = tempfile::tempdir().unwrap();
    let changelog = ws.path().join("changelog.xml");
    let previous = Utc.with_ymd_and_hms(2024, 5, 31, 23, 0, 0).unwrap();
    let mut build = BuildContext::new(2, common::now()).with_previous_build(previous);
    build.env.insert("JOB_NAME".to_string(), "nightly".to_string());

    let outcome = scm
        .checkout(&build, ws.path(), &listener, Some(&changelog))
        .await
        .unwrap();

    assert_eq!(outcome.baseline, RevisionMarker::new(previous));
    assert_eq!(outcome.changelog, ChangelogStatus::Recorded(changelog.clone()));

    let launches = launcher.launches();
    let workspace = ws.path().to_string_lossy().to_string();
    assert_eq!(
        launches[0].redacted,
        vec![
            vault_scm_core::DEFAULT_CLIENT_PATH,
            "GET",
            "-host",
            "vault.example.com",
            "-user",
            "builder",
            "-password",
            vault_scm_core::REDACTED,
            "-repository",
            "Main",
            "-merge",
            "overwrite",
            "-setfiletime",
            "modification",
            "-workingfolder",
            workspace.as_str(),
            "$/trunk",
        ]
    );
    assert_eq!(launches[0].env, build.env);
    assert!(launches[1].env.is_empty());

    let info = listener.info_lines();
    assert!(info.contains(&"Getting $/trunk/a.txt".to_string()));
    assert!(info.contains(&format!("Change log file: {}", changelog.display())));
    assert_eq!(info.last().map(String::as_str), Some("Checkout completed."));
}

/// Launcher that, during the fetch, queues another holder on the gate so
/// the changelog query that follows cannot get it.
struct GateHoggingLauncher {
    gate: ExecutionGate,
    inner: ScriptedLauncher,
}

#[async_trait]
impl Launcher for GateHoggingLauncher {
    async fn launch(
        &self,
        command: &CommandLine,
        env: &BTreeMap<String, String>,
        pwd: &Path,
        stdout: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> io::Result<i32> {
        if command.redacted_args().get(1).map(String::as_str) == Some("GET") {
            let gate = self.gate.clone();
            tokio::spawn(async move {
                if let Ok(_held) = gate.acquire().await {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
            });
            tokio::task::yield_now().await;
        }
        self.inner.launch(command, env, pwd, stdout).await
    }
}

/// Test: losing the gate to another job during the changelog aborts checkout
#[tokio::test]
async fn test_changelog_gate_timeout_aborts_checkout() {
    let gate = ExecutionGate::isolated().with_acquire_timeout(Duration::from_millis(200));
    let launcher = Arc::new(GateHoggingLauncher {
        gate: gate.clone(),
        inner: ScriptedLauncher::new(vec![ScriptedRun::exit(0)]),
    });
    let scm = common::scm(launcher.clone(), gate);
    let listener = MemoryListener::new();
    let ws = tempfile::tempdir().unwrap();
    let changelog = ws.path().join("changelog.xml");

    let err = scm
        .checkout(&BuildContext::new(3, common::now()), ws.path(), &listener, Some(&changelog))
        .await
        .unwrap_err();

    assert!(err.is_gate_timeout());
    assert!(err.to_string().contains("Failed to acquire semaphore"));
    assert_eq!(launcher.inner.launch_count(), 1);
    assert!(listener.text().contains("Failed to acquire semaphore"));
    assert!(!listener.text().contains("Checkout completed."));
}

/// Test: a busy gate before the fetch aborts checkout
#[tokio::test]
async fn test_fetch_gate_timeout_aborts_checkout() {
    let launcher = Arc::new(ScriptedLauncher::new(vec![ScriptedRun::exit(0)]));
    let gate = ExecutionGate::isolated().with_acquire_timeout(Duration::from_millis(100));
    let scm = common::scripted_scm(&launcher, gate.clone());
    let listener = MemoryListener::new();
    let ws = tempfile::tempdir().unwrap();
    let _busy = gate.acquire().await.unwrap();

    let err = scm
        .checkout(&BuildContext::new(4, common::now()), ws.path(), &listener, None)
        .await
        .unwrap_err();

    assert!(err.is_gate_timeout());
    assert_eq!(launcher.launch_count(), 0);
}

/// Test: a failing changelog query leaves the checkout successful
#[tokio::test]
async fn test_changelog_exit_failure_is_not_fatal() {
    let launcher = Arc::new(ScriptedLauncher::new(vec![
        ScriptedRun::exit(0),
        ScriptedRun::exit(5),
    ]));
    let scm = common::scripted_scm(&launcher, ExecutionGate::isolated());
    let listener = MemoryListener::new();
    let ws = tempfile::tempdir().unwrap();
    let changelog = ws.path().join("changelog.xml");

    let outcome = scm
        .checkout(&BuildContext::new(5, common::now()), ws.path(), &listener, Some(&changelog))
        .await
        .unwrap();

    assert_eq!(outcome.changelog, ChangelogStatus::Failed);
    assert!(listener
        .fatal_lines()
        .contains(&"Changelog failed with exit code 5".to_string()));
    assert!(scm.parse_changelog(&changelog).unwrap().is_empty());
}
