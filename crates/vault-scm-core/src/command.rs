//! Vault client command lines.
//!
//! The client is positional-flag-sensitive, so [`CommandBuilder`] emits
//! arguments in one fixed order:
//!
//! ```text
//! <exe> GET|VERSIONHISTORY [-host H] [-user U] [-password P] [-repository R] [-ssl]
//!       [-verbose] [-makewritable] -merge M -setfiletime F          (GET only)
//!       -enddate E -begindate B                                      (VERSIONHISTORY only)
//!       -nonworkingfolder|-workingfolder PATH                         (GET only)
//!       REPO_PATH
//! ```

use std::path::Path;

use crate::domain::{HistoryWindow, Password, ScmSettings, REDACTED};

/// Client subcommand for fetching files.
pub const GET: &str = "GET";

/// Client subcommand for querying history.
pub const VERSIONHISTORY: &str = "VERSIONHISTORY";

#[derive(Clone)]
enum Arg {
    Plain(String),
    Masked(Password),
}

/// Argument vector for one client invocation.
///
/// `Display` and `Debug` mask secret arguments; only [`CommandLine::to_argv`]
/// reveals them, for handing to a process launcher.
#[derive(Clone)]
pub struct CommandLine {
    args: Vec<Arg>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            args: vec![Arg::Plain(program.into())],
        }
    }

    pub fn arg(&mut self, value: impl Into<String>) -> &mut Self {
        self.args.push(Arg::Plain(value.into()));
        self
    }

    /// Append a flag followed by its value.
    pub fn flag(&mut self, flag: &str, value: impl Into<String>) -> &mut Self {
        self.arg(flag).arg(value)
    }

    /// Append a secret that is masked in every rendering except `to_argv`.
    pub fn masked(&mut self, secret: &Password) -> &mut Self {
        self.args.push(Arg::Masked(secret.clone()));
        self
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// The full argument vector with secrets revealed.
    pub fn to_argv(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| match a {
                Arg::Plain(s) => s.clone(),
                Arg::Masked(p) => p.reveal().to_string(),
            })
            .collect()
    }

    /// The argument vector with secrets replaced by [`REDACTED`].
    pub fn redacted_args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| match a {
                Arg::Plain(s) => s.clone(),
                Arg::Masked(_) => REDACTED.to_string(),
            })
            .collect()
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, arg) in self.redacted_args().iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, "\"{arg}\"")?;
            } else {
                f.write_str(arg)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CommandLine").field(&self.redacted_args()).finish()
    }
}

/// Builds `GET` and `VERSIONHISTORY` command lines from job settings.
#[derive(Debug, Clone, Copy)]
pub struct CommandBuilder<'a> {
    settings: &'a ScmSettings,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(settings: &'a ScmSettings) -> Self {
        Self { settings }
    }

    /// `GET` into `workspace`.
    pub fn fetch(&self, executable: &Path, workspace: &Path) -> CommandLine {
        let policy = &self.settings.policy;
        let mut cmd = self.preamble(executable, GET);

        if policy.verbose {
            cmd.arg("-verbose");
        }
        if policy.make_writable {
            cmd.arg("-makewritable");
        }
        cmd.flag("-merge", policy.merge.as_str());
        cmd.flag("-setfiletime", policy.file_time.as_str());

        let folder_flag = if policy.use_non_working_folder {
            "-nonworkingfolder"
        } else {
            "-workingfolder"
        };
        cmd.flag(folder_flag, workspace.to_string_lossy());

        cmd.arg(policy.path.as_str());
        cmd
    }

    /// `VERSIONHISTORY` over `window`.
    pub fn history(&self, executable: &Path, window: &HistoryWindow) -> CommandLine {
        let mut cmd = self.preamble(executable, VERSIONHISTORY);
        cmd.flag("-enddate", window.end_arg());
        cmd.flag("-begindate", window.begin_arg());
        cmd.arg(self.settings.policy.path.as_str());
        cmd
    }

    fn preamble(&self, executable: &Path, subcommand: &str) -> CommandLine {
        let profile = &self.settings.profile;
        let mut cmd = CommandLine::new(executable.to_string_lossy());
        cmd.arg(subcommand);

        if !profile.server.is_empty() {
            cmd.flag("-host", profile.server.as_str());
        }
        if !profile.user.is_empty() {
            cmd.flag("-user", profile.user.as_str());
        }
        if !profile.password.is_empty() {
            cmd.arg("-password").masked(&profile.password);
        }
        if !profile.repository.is_empty() {
            cmd.flag("-repository", profile.repository.as_str());
        }
        if profile.ssl {
            cmd.arg("-ssl");
        }
        cmd
    }
}
