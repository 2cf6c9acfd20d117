//! Collaborators supplied by the CI host.
//!
//! These traits are the seams between the plugin core and whatever runs it:
//! - `NodeFs`: existence checks on the build node's filesystem
//! - `Launcher`: process launching with streamed stdout
//! - `ToolRegistry`: configured client installations, per node
//! - `UserDirectory`: mapping Vault user names to known users
//! - `TaskListener`: the build log
//! - `Clock`: "now"
//!
//! Local implementations live in [`local`]; in-memory fakes for tests live in
//! [`crate::fakes`].

pub mod local;

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;

use crate::command::CommandLine;
use crate::domain::User;

// ---------------------------------------------------------------------------
// Build metadata
// ---------------------------------------------------------------------------

/// What the host knows about the build being checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    /// Build number, for log correlation.
    pub number: u64,

    /// When this build started.
    pub started_at: DateTime<Utc>,

    /// When the previous build of the job started, if there was one.
    pub previous_build_at: Option<DateTime<Utc>>,

    /// Environment passed to the fetch command.
    pub env: BTreeMap<String, String>,

    /// Node the build runs on; `None` when the host cannot tell.
    pub node: Option<String>,
}

impl BuildContext {
    pub fn new(number: u64, started_at: DateTime<Utc>) -> Self {
        Self {
            number,
            started_at,
            previous_build_at: None,
            env: BTreeMap::new(),
            node: Some(BUILT_IN_NODE.to_string()),
        }
    }

    pub fn with_previous_build(mut self, at: DateTime<Utc>) -> Self {
        self.previous_build_at = Some(at);
        self
    }
}

/// Name of the node the controller itself runs builds on.
pub const BUILT_IN_NODE: &str = "built-in";

// ---------------------------------------------------------------------------
// Filesystem and process launching
// ---------------------------------------------------------------------------

/// Filesystem of the node a command will run on.
#[async_trait]
pub trait NodeFs: Send + Sync {
    /// Whether `path` exists. I/O failures are returned, not swallowed.
    async fn exists(&self, path: &Path) -> io::Result<bool>;
}

/// Launches the external client.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Run `command` in `pwd` with `env`, streaming its standard output into
    /// `stdout`, and return the exit code.
    async fn launch(
        &self,
        command: &CommandLine,
        env: &BTreeMap<String, String>,
        pwd: &Path,
        stdout: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> io::Result<i32>;
}

// ---------------------------------------------------------------------------
// Tool installations
// ---------------------------------------------------------------------------

/// A named Vault client installation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolInstallation {
    pub name: String,

    /// Path to the client executable on nodes without an override.
    pub home: PathBuf,

    /// Node name -> executable path on that node.
    #[serde(default)]
    pub nodes: BTreeMap<String, PathBuf>,
}

impl ToolInstallation {
    pub fn new(name: impl Into<String>, home: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            home: home.into(),
            nodes: BTreeMap::new(),
        }
    }

    pub fn with_node(mut self, node: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.nodes.insert(node.into(), path.into());
        self
    }

    /// Executable path as seen from `node`.
    pub fn for_node(&self, node: &str) -> &Path {
        self.nodes.get(node).unwrap_or(&self.home)
    }
}

/// Registry of configured client installations.
pub trait ToolRegistry: Send + Sync {
    fn installation(&self, name: &str) -> Option<ToolInstallation>;
}

/// Registry backed by a fixed list, usually from the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticToolRegistry {
    installations: Vec<ToolInstallation>,
}

impl StaticToolRegistry {
    pub fn new(installations: Vec<ToolInstallation>) -> Self {
        Self { installations }
    }
}

impl ToolRegistry for StaticToolRegistry {
    fn installation(&self, name: &str) -> Option<ToolInstallation> {
        self.installations.iter().find(|i| i.name == name).cloned()
    }
}

// ---------------------------------------------------------------------------
// Users, clock, build log
// ---------------------------------------------------------------------------

/// Resolves change authors.
pub trait UserDirectory: Send + Sync {
    fn resolve(&self, name: &str) -> Option<User>;
}

/// User directory backed by a name -> display name map.
///
/// With `accept_unlisted`, any non-blank name resolves to a user whose
/// display name is the name itself, which is how CI hosts usually treat
/// committers they have not seen before.
#[derive(Debug, Clone, Default)]
pub struct StaticUserDirectory {
    users: BTreeMap<String, String>,
    accept_unlisted: bool,
}

impl StaticUserDirectory {
    pub fn new(users: BTreeMap<String, String>, accept_unlisted: bool) -> Self {
        Self {
            users,
            accept_unlisted,
        }
    }
}

impl UserDirectory for StaticUserDirectory {
    fn resolve(&self, name: &str) -> Option<User> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        match self.users.get(name) {
            Some(display_name) => Some(User {
                id: name.to_string(),
                display_name: display_name.clone(),
            }),
            None if self.accept_unlisted => Some(User {
                id: name.to_string(),
                display_name: name.to_string(),
            }),
            None => None,
        }
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The build log the user sees.
pub trait TaskListener: Send + Sync {
    /// Progress line.
    fn info(&self, message: &str);

    /// Error line; the operation may still continue.
    fn fatal_error(&self, message: &str);
}

/// `AsyncWrite` adapter that turns streamed tool output into listener lines.
///
/// Partial lines are held back until a newline arrives or the writer is
/// flushed.
pub struct ListenerWriter<'a> {
    listener: &'a dyn TaskListener,
    pending: Vec<u8>,
}

impl<'a> ListenerWriter<'a> {
    pub fn new(listener: &'a dyn TaskListener) -> Self {
        Self {
            listener,
            pending: Vec::new(),
        }
    }

    fn emit_complete_lines(&mut self) {
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.emit(&line);
        }
    }

    fn emit_rest(&mut self) {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.emit(&rest);
        }
    }

    fn emit(&self, raw: &[u8]) {
        let text = String::from_utf8_lossy(raw);
        self.listener.info(text.trim_end_matches(['\r', '\n']));
    }
}

impl AsyncWrite for ListenerWriter<'_> {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.pending.extend_from_slice(buf);
        this.emit_complete_lines();
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().emit_rest();
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_flush(cx)
    }
}
