//! Per-call context shared by polling, checkout and changelog capture.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWrite;

use crate::command::CommandBuilder;
use crate::domain::{HistoryWindow, Result, ScmSettings};
use crate::executor::SerializedExecutor;
use crate::host::TaskListener;
use crate::locator::ExecutableLocator;

/// Borrowed view of everything one operation needs.
#[derive(Clone, Copy)]
pub struct Session<'a> {
    pub settings: &'a ScmSettings,
    pub locator: &'a ExecutableLocator,
    pub executor: &'a SerializedExecutor,
    pub listener: &'a dyn TaskListener,
    pub node: Option<&'a str>,
}

impl<'a> Session<'a> {
    /// Resolve the client executable for this session's node.
    pub async fn locate(&self) -> Result<PathBuf> {
        self.locator
            .locate(self.settings.installation.as_deref(), self.node, self.listener)
            .await
    }

    pub fn commands(&self) -> CommandBuilder<'a> {
        CommandBuilder::new(self.settings)
    }

    /// Run a history query over `window` with an empty environment,
    /// streaming the report into `report`.
    pub(crate) async fn run_history(
        &self,
        executable: &Path,
        window: &HistoryWindow,
        workspace: &Path,
        report: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<i32> {
        let command = self.commands().history(executable, window);
        self.executor
            .run(&command, &BTreeMap::new(), workspace, report)
            .await
    }
}
