//! The host-facing SCM facade.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, Instrument};

use crate::changelog;
use crate::checkout::{self, CheckoutOutcome};
use crate::detector;
use crate::domain::{
    ChangeLogSet, HistoryWindow, PollOutcome, Result, RevisionMarker, ScmSettings, VaultScmError,
};
use crate::executor::SerializedExecutor;
use crate::gate::ExecutionGate;
use crate::host::local::{LocalFs, LocalLauncher, SystemClock};
use crate::host::{BuildContext, Clock, Launcher, NodeFs, TaskListener, ToolRegistry, UserDirectory};
use crate::locator::ExecutableLocator;
use crate::obs::{emit_poll_finished, emit_poll_started, InvocationSpan};
use crate::session::Session;

/// Collaborators the host provides.
#[derive(Clone)]
pub struct HostServices {
    pub launcher: Arc<dyn Launcher>,
    pub fs: Arc<dyn NodeFs>,
    pub registry: Arc<dyn ToolRegistry>,
    pub users: Arc<dyn UserDirectory>,
    pub clock: Arc<dyn Clock>,
}

impl HostServices {
    /// Services for running on this machine.
    pub fn local(registry: Arc<dyn ToolRegistry>, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            launcher: Arc::new(LocalLauncher),
            fs: Arc::new(LocalFs),
            registry,
            users,
            clock: Arc::new(SystemClock),
        }
    }
}

/// Tuning knobs; the defaults match a plugin inside a CI server.
#[derive(Debug, Clone)]
pub struct ScmOptions {
    pub gate: ExecutionGate,
    pub process_timeout: Option<Duration>,

    /// Replaces the built-in default client locations.
    pub default_paths: Option<Vec<PathBuf>>,
}

impl Default for ScmOptions {
    fn default() -> Self {
        Self {
            gate: ExecutionGate::global(),
            process_timeout: None,
            default_paths: None,
        }
    }
}

/// One job's Vault SCM: polling, checkout and changelog parsing.
pub struct VaultScm {
    settings: ScmSettings,
    locator: ExecutableLocator,
    executor: SerializedExecutor,
    users: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
}

impl VaultScm {
    pub fn new(settings: ScmSettings, host: HostServices, options: ScmOptions) -> Self {
        let mut locator = ExecutableLocator::new(host.registry, host.fs);
        if let Some(paths) = options.default_paths {
            locator = locator.with_default_paths(paths);
        }
        let executor = SerializedExecutor::new(host.launcher, options.gate)
            .with_process_timeout(options.process_timeout);
        Self {
            settings,
            locator,
            executor,
            users: host.users,
            clock: host.clock,
        }
    }

    pub fn settings(&self) -> &ScmSettings {
        &self.settings
    }

    pub fn supports_polling(&self) -> bool {
        true
    }

    /// Revision key: the configured installation name.
    pub fn key(&self) -> Option<&str> {
        self.settings.key()
    }

    /// The marker a finished build leaves for the next poll.
    pub fn calc_revision_state(&self, build: &BuildContext) -> RevisionMarker {
        RevisionMarker::new(build.started_at)
    }

    /// Resolve the client executable for `node`.
    pub async fn locate(&self, node: Option<&str>, listener: &dyn TaskListener) -> Result<PathBuf> {
        self.session(listener, node).locate().await
    }

    /// Compare the repository against `baseline`.
    ///
    /// Client problems and gate contention resolve to
    /// [`PollOutcome::NoChanges`]; only scratch-file failures are errors.
    pub async fn poll_compare(
        &self,
        baseline: &RevisionMarker,
        workspace: &Path,
        node: Option<&str>,
        listener: &dyn TaskListener,
    ) -> Result<PollOutcome> {
        let path = self.settings.policy.path.as_str();
        let span = InvocationSpan::new("poll", path);
        async {
            let window = HistoryWindow::since(baseline, self.clock.now());
            info!("Last Build Date set to {}", window.begin_arg());
            emit_poll_started(path, &window.begin_arg());

            let session = self.session(listener, node);
            let (changes, outcome) = detector::poll_changes(&session, &window, workspace).await?;

            emit_poll_finished(path, changes, outcome.as_str());
            Ok::<_, VaultScmError>(outcome)
        }
        .instrument(span.span().clone())
        .await
    }

    /// Fetch into `workspace` and optionally record the changelog.
    pub async fn checkout(
        &self,
        build: &BuildContext,
        workspace: &Path,
        listener: &dyn TaskListener,
        changelog: Option<&Path>,
    ) -> Result<CheckoutOutcome> {
        let span = InvocationSpan::new("checkout", self.settings.policy.path.as_str());
        let session = self.session(listener, build.node.as_deref());
        checkout::checkout(&session, build, workspace, changelog, self.clock.as_ref())
            .instrument(span.span().clone())
            .await
    }

    pub fn parse_changelog(&self, artifact: &Path) -> Result<ChangeLogSet> {
        let span = InvocationSpan::new("changelog", self.settings.policy.path.as_str());
        let _entered = span.span().enter();
        changelog::parse_changelog(artifact, self.users.as_ref())
    }

    fn session<'a>(&'a self, listener: &'a dyn TaskListener, node: Option<&'a str>) -> Session<'a> {
        Session {
            settings: &self.settings,
            locator: &self.locator,
            executor: &self.executor,
            listener,
            node,
        }
    }
}
