//! In-memory fakes for host collaborators (testing only)
//!
//! Provides `ScriptedLauncher`, `MemoryFs`, `MemoryListener` and `FixedClock`
//! that satisfy the host traits without touching processes or disk.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::command::CommandLine;
use crate::host::{Clock, Launcher, NodeFs, TaskListener};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// ScriptedLauncher
// ---------------------------------------------------------------------------

/// What one fake client invocation does.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRun {
    exit_code: i32,
    stdout: Vec<u8>,
    delay: Option<Duration>,
    error: Option<String>,
}

impl ScriptedRun {
    pub fn exit(code: i32) -> Self {
        Self {
            exit_code: code,
            ..Self::default()
        }
    }

    /// Fail the launch after writing any scripted stdout, as when the
    /// executable cannot be spawned or its output pipe breaks.
    pub fn io_error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<Vec<u8>>) -> Self {
        self.stdout = stdout.into();
        self
    }

    /// Sleep after writing stdout and before exiting, to hold the process
    /// "in flight".
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// One recorded call to [`ScriptedLauncher::launch`].
#[derive(Debug, Clone)]
pub struct LaunchRecord {
    /// Arguments as a build log would show them.
    pub redacted: Vec<String>,

    /// Arguments as the process would have received them.
    pub argv: Vec<String>,

    pub env: BTreeMap<String, String>,

    pub pwd: PathBuf,
}

/// Launcher that replays scripted runs in order.
///
/// The last run repeats once the script is exhausted, which keeps
/// concurrency tests short to write.
#[derive(Debug, Default)]
pub struct ScriptedLauncher {
    script: Mutex<VecDeque<ScriptedRun>>,
    launches: Mutex<Vec<LaunchRecord>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedLauncher {
    pub fn new(script: Vec<ScriptedRun>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub fn launch_count(&self) -> usize {
        lock(&self.launches).len()
    }

    pub fn launches(&self) -> Vec<LaunchRecord> {
        lock(&self.launches).clone()
    }

    /// Highest number of launches ever observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_run(&self) -> ScriptedRun {
        let mut script = lock(&self.script);
        if script.len() > 1 {
            script.pop_front().unwrap_or_default()
        } else {
            script.front().cloned().unwrap_or_default()
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Launcher for ScriptedLauncher {
    async fn launch(
        &self,
        command: &CommandLine,
        env: &BTreeMap<String, String>,
        pwd: &Path,
        stdout: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> io::Result<i32> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        lock(&self.launches).push(LaunchRecord {
            redacted: command.redacted_args(),
            argv: command.to_argv(),
            env: env.clone(),
            pwd: pwd.to_path_buf(),
        });

        let run = self.next_run();
        stdout.write_all(&run.stdout).await?;
        if let Some(delay) = run.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = run.error {
            return Err(io::Error::other(message));
        }
        Ok(run.exit_code)
    }
}

// ---------------------------------------------------------------------------
// MemoryFs
// ---------------------------------------------------------------------------

/// Node filesystem with a fixed set of existing paths.
#[derive(Debug, Default)]
pub struct MemoryFs {
    existing: HashSet<PathBuf>,
    failing: HashSet<PathBuf>,
    probed: Mutex<Vec<PathBuf>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.existing.insert(path.into());
        self
    }

    /// Existence checks on `path` fail with an I/O error.
    pub fn with_failing(mut self, path: impl Into<PathBuf>) -> Self {
        self.failing.insert(path.into());
        self
    }

    /// Every path checked so far, in order.
    pub fn probed(&self) -> Vec<PathBuf> {
        lock(&self.probed).clone()
    }
}

#[async_trait]
impl NodeFs for MemoryFs {
    async fn exists(&self, path: &Path) -> io::Result<bool> {
        lock(&self.probed).push(path.to_path_buf());
        if self.failing.contains(path) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "access denied"));
        }
        Ok(self.existing.contains(path))
    }
}

// ---------------------------------------------------------------------------
// MemoryListener
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerLine {
    Info(String),
    Fatal(String),
}

/// Build log that keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemoryListener {
    lines: Mutex<Vec<ListenerLine>>,
}

impl MemoryListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<ListenerLine> {
        lock(&self.lines).clone()
    }

    pub fn info_lines(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter_map(|l| match l {
                ListenerLine::Info(s) => Some(s),
                ListenerLine::Fatal(_) => None,
            })
            .collect()
    }

    pub fn fatal_lines(&self) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter_map(|l| match l {
                ListenerLine::Fatal(s) => Some(s),
                ListenerLine::Info(_) => None,
            })
            .collect()
    }

    /// Whole log as one string, for substring assertions.
    pub fn text(&self) -> String {
        self.lines()
            .into_iter()
            .map(|l| match l {
                ListenerLine::Info(s) | ListenerLine::Fatal(s) => s,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl TaskListener for MemoryListener {
    fn info(&self, message: &str) {
        lock(&self.lines).push(ListenerLine::Info(message.to_string()));
    }

    fn fatal_error(&self, message: &str) {
        lock(&self.lines).push(ListenerLine::Fatal(message.to_string()));
    }
}

// ---------------------------------------------------------------------------
// FixedClock
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
