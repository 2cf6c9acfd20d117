//! Serialized execution of the Vault client.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::command::CommandLine;
use crate::domain::{Result, VaultScmError};
use crate::gate::ExecutionGate;
use crate::host::Launcher;
use crate::obs::{emit_command_exited, emit_command_launched};

/// Runs client command lines one at a time through an [`ExecutionGate`].
///
/// The executor never retries and never interprets exit codes; callers
/// decide what a non-zero exit means for them.
#[derive(Clone)]
pub struct SerializedExecutor {
    launcher: Arc<dyn Launcher>,
    gate: ExecutionGate,
    process_timeout: Option<Duration>,
}

impl SerializedExecutor {
    pub fn new(launcher: Arc<dyn Launcher>, gate: ExecutionGate) -> Self {
        Self {
            launcher,
            gate,
            process_timeout: None,
        }
    }

    /// Kill the client if it runs longer than `limit`.
    ///
    /// Without this a hung client holds the gate until it exits.
    pub fn with_process_timeout(mut self, limit: Option<Duration>) -> Self {
        self.process_timeout = limit;
        self
    }

    pub fn gate(&self) -> &ExecutionGate {
        &self.gate
    }

    /// Run `command` in `pwd`, streaming stdout into `stdout`, and return the
    /// exit code.
    ///
    /// Fails with [`VaultScmError::GateTimeout`] without launching anything
    /// if the gate cannot be acquired in time. The gate is released before
    /// this returns, whatever the outcome.
    pub async fn run(
        &self,
        command: &CommandLine,
        env: &BTreeMap<String, String>,
        pwd: &Path,
        stdout: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<i32> {
        let _permit = self.gate.acquire().await?;

        let rendered = command.to_string();
        emit_command_launched(&rendered, pwd);
        let start = Instant::now();

        let launched = self.launcher.launch(command, env, pwd, &mut *stdout);
        let outcome = match self.process_timeout {
            Some(limit) => match tokio::time::timeout(limit, launched).await {
                Ok(result) => result.map_err(VaultScmError::from),
                Err(_) => Err(VaultScmError::ProcessTimeout {
                    command: rendered.clone(),
                    limit,
                }),
            },
            None => launched.await.map_err(VaultScmError::from),
        };
        // Partial output is flushed even when the launch failed.
        let flushed = stdout.flush().await;
        let exit_code = outcome?;
        flushed?;

        emit_command_exited(&rendered, exit_code, start.elapsed().as_millis() as u64);
        Ok(exit_code)
    }
}
