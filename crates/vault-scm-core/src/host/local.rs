//! Host collaborators for running on the local machine.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::{error, info, warn};

use super::{Clock, Launcher, NodeFs, TaskListener};
use crate::command::CommandLine;

/// The local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

#[async_trait]
impl NodeFs for LocalFs {
    async fn exists(&self, path: &Path) -> io::Result<bool> {
        tokio::fs::try_exists(path).await
    }
}

/// Launches the client as a child process of this one.
///
/// The child is killed if the launch future is dropped, so an outer timeout
/// never leaves an orphaned client holding repository locks.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalLauncher;

#[async_trait]
impl Launcher for LocalLauncher {
    async fn launch(
        &self,
        command: &CommandLine,
        env: &BTreeMap<String, String>,
        pwd: &Path,
        stdout: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> io::Result<i32> {
        let argv = command.to_argv();
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command line"))?;

        let mut child = Command::new(program)
            .args(args)
            .envs(env)
            .current_dir(pwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut child_stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("child stdout not captured"))?;
        let mut child_stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("child stderr not captured"))?;

        let mut stderr_buf = Vec::new();
        let (copied, stderr_read) = tokio::join!(
            tokio::io::copy(&mut child_stdout, &mut *stdout),
            child_stderr.read_to_end(&mut stderr_buf),
        );
        copied?;
        stderr_read?;
        stdout.flush().await?;

        let status = child.wait().await?;
        for line in String::from_utf8_lossy(&stderr_buf).lines() {
            if !line.trim().is_empty() {
                warn!(target: "vault_scm::client", "{line}");
            }
        }

        Ok(status.code().unwrap_or(-1))
    }
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Build log that writes through `tracing`, for command-line use.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingListener;

impl TaskListener for TracingListener {
    fn info(&self, message: &str) {
        info!(target: "vault_scm::build", "{message}");
    }

    fn fatal_error(&self, message: &str) {
        error!(target: "vault_scm::build", "{message}");
    }
}
