//! Locating the Vault client executable on the build node.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{Result, VaultScmError};
use crate::host::{NodeFs, TaskListener, ToolRegistry};

/// Default install location on 64-bit Windows.
pub const DEFAULT_CLIENT_PATH: &str = "C:\\Program Files\\SourceGear\\Vault Client\\vault.exe";

/// Default install location for the 32-bit client on 64-bit Windows.
pub const DEFAULT_CLIENT_PATH_X86: &str =
    "C:\\Program Files (x86)\\SourceGear\\Vault Client\\vault.exe";

/// Resolves the client executable from a configured installation or the
/// well-known default locations.
#[derive(Clone)]
pub struct ExecutableLocator {
    registry: Arc<dyn ToolRegistry>,
    fs: Arc<dyn NodeFs>,
    default_paths: Vec<PathBuf>,
}

impl ExecutableLocator {
    pub fn new(registry: Arc<dyn ToolRegistry>, fs: Arc<dyn NodeFs>) -> Self {
        Self {
            registry,
            fs,
            default_paths: vec![
                PathBuf::from(DEFAULT_CLIENT_PATH),
                PathBuf::from(DEFAULT_CLIENT_PATH_X86),
            ],
        }
    }

    /// Replace the fallback locations probed when no installation is configured.
    pub fn with_default_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.default_paths = paths;
        self
    }

    pub fn default_paths(&self) -> &[PathBuf] {
        &self.default_paths
    }

    /// Return the client path for `node`, or fail with
    /// [`VaultScmError::ToolNotFound`].
    ///
    /// A named installation that the registry knows is resolved for the node
    /// and must exist there. Without one, the default locations are probed in
    /// order and the first existing one wins.
    pub async fn locate(
        &self,
        installation: Option<&str>,
        node: Option<&str>,
        listener: &dyn TaskListener,
    ) -> Result<PathBuf> {
        let configured = installation.and_then(|name| {
            let found = self.registry.installation(name);
            if found.is_none() {
                warn!(installation = %name, "installation not registered, probing default locations");
            }
            found
        });

        match configured {
            Some(installation) => {
                let Some(node) = node else {
                    listener.fatal_error("Cannot resolve Vault installation: no execution node");
                    return Err(VaultScmError::ToolNotFound(format!(
                        "installation {} has no execution node",
                        installation.name
                    )));
                };
                let path = installation.for_node(node).to_path_buf();
                if self.check_exists(&path, listener).await {
                    debug!(path = %path.display(), node = %node, "using configured vault client");
                    Ok(path)
                } else {
                    listener.fatal_error(&format!("{} doesn't exist", path.display()));
                    Err(VaultScmError::ToolNotFound(path.display().to_string()))
                }
            }
            None => {
                for path in &self.default_paths {
                    if self.check_exists(path, listener).await {
                        debug!(path = %path.display(), "using default vault client location");
                        return Ok(path.clone());
                    }
                }
                listener.fatal_error("Failed find vault client");
                Err(VaultScmError::ToolNotFound(
                    "no client at the default locations".to_string(),
                ))
            }
        }
    }

    /// Existence check that reports I/O failure as "not found".
    async fn check_exists(&self, path: &Path, listener: &dyn TaskListener) -> bool {
        match self.fs.exists(path).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "existence check failed");
                listener.fatal_error(&format!("Failed checking for existence of {}", path.display()));
                false
            }
        }
    }
}
