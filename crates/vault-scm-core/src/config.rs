//! TOML job configuration.
//!
//! ```toml
//! [connection]
//! server = "vault.example.com"
//! user = "builder"
//! password_env = "VAULT_PASSWORD"
//! repository = "Main"
//! ssl = true
//!
//! [fetch]
//! path = "$/trunk"
//! merge = "overwrite"
//! file_time = "modification"
//!
//! [tool]
//! installation = "vault-5"
//! process_timeout_secs = 3600
//!
//! [[tool.installations]]
//! name = "vault-5"
//! home = "C:\\Program Files\\SourceGear\\Vault Client\\vault.exe"
//!
//! [users]
//! accept_unlisted = true
//! [users.names]
//! jdoe = "Jane Doe"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::domain::{
    ConnectionProfile, FetchPolicy, FileTimePolicy, MergeStrategy, Password, RepositoryPath,
    Result, ScmSettings, VaultScmError,
};
use crate::host::{StaticToolRegistry, StaticUserDirectory, ToolInstallation};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScmConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub tool: ToolConfig,

    #[serde(default)]
    pub users: UsersConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionConfig {
    pub server: String,
    pub user: String,

    /// Inline password. Prefer `password_env`.
    pub password: Option<Password>,

    /// Environment variable holding the password.
    pub password_env: Option<String>,

    pub repository: String,
    pub ssl: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub path: String,
    pub merge: Option<String>,
    pub file_time: Option<String>,
    pub use_non_working_folder: bool,
    pub make_writable: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    /// Installation to use; unset means probe the default locations.
    pub installation: Option<String>,

    /// Kill a client process that runs longer than this.
    pub process_timeout_secs: Option<u64>,

    /// Overrides the default client locations.
    pub default_paths: Option<Vec<PathBuf>>,

    pub installations: Vec<ToolInstallation>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UsersConfig {
    pub accept_unlisted: bool,
    pub names: BTreeMap<String, String>,
}

impl Default for UsersConfig {
    fn default() -> Self {
        Self {
            accept_unlisted: true,
            names: BTreeMap::new(),
        }
    }
}

impl ScmConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| VaultScmError::InvalidConfig(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            VaultScmError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Required fields that are blank: `server`, `repository` and `path`.
    ///
    /// The client can fall back to a remembered login for everything else.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.connection.server.trim().is_empty() {
            missing.push("connection.server");
        }
        if self.connection.repository.trim().is_empty() {
            missing.push("connection.repository");
        }
        if self.fetch.path.trim().is_empty() {
            missing.push("fetch.path");
        }
        missing
    }

    /// Validate and convert into the settings the operations run with.
    ///
    /// `password_env` wins over an inline `password`.
    pub fn into_settings(self) -> Result<ScmSettings> {
        let password = match &self.connection.password_env {
            Some(var) => std::env::var(var).map(Password::new).map_err(|_| {
                VaultScmError::InvalidConfig(format!("password variable {var} is not set"))
            })?,
            None => self.connection.password.clone().unwrap_or_default(),
        };

        let policy = FetchPolicy {
            path: RepositoryPath::new(self.fetch.path.trim())?,
            merge: MergeStrategy::from_setting(self.fetch.merge.as_deref())?,
            file_time: FileTimePolicy::from_setting(self.fetch.file_time.as_deref())?,
            use_non_working_folder: self.fetch.use_non_working_folder,
            make_writable: self.fetch.make_writable,
            verbose: self.fetch.verbose,
        };

        Ok(ScmSettings {
            profile: ConnectionProfile {
                server: self.connection.server,
                user: self.connection.user,
                password,
                repository: self.connection.repository,
                ssl: self.connection.ssl,
            },
            policy,
            installation: self
                .tool
                .installation
                .filter(|name| !name.trim().is_empty()),
        })
    }

    /// Use `password` instead of anything the file configures.
    pub fn override_password(&mut self, password: Password) {
        self.connection.password_env = None;
        self.connection.password = Some(password);
    }

    pub fn process_timeout(&self) -> Option<Duration> {
        self.tool.process_timeout_secs.map(Duration::from_secs)
    }

    pub fn tool_registry(&self) -> StaticToolRegistry {
        StaticToolRegistry::new(self.tool.installations.clone())
    }

    pub fn user_directory(&self) -> StaticUserDirectory {
        StaticUserDirectory::new(self.users.names.clone(), self.users.accept_unlisted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ToolRegistry, UserDirectory};

    const FULL: &str = r#"
[connection]
server = "vault.example.com"
user = "builder"
password = "inline-secret"
repository = "Main"
ssl = true

[fetch]
path = "$/trunk"
merge = "automatic"
file_time = "checkin"
make_writable = true

[tool]
installation = "vault-5"
process_timeout_secs = 600

[[tool.installations]]
name = "vault-5"
home = "/opt/vault/vault"

[users]
accept_unlisted = false
[users.names]
jdoe = "Jane Doe"
"#;

    #[test]
    fn test_full_config_converts() {
        let config = ScmConfig::from_toml_str(FULL).unwrap();
        assert!(config.missing_fields().is_empty());
        assert_eq!(config.process_timeout(), Some(Duration::from_secs(600)));
        assert!(config.tool_registry().installation("vault-5").is_some());
        assert!(config.user_directory().resolve("someone").is_none());
        assert_eq!(
            config.user_directory().resolve("jdoe").unwrap().display_name,
            "Jane Doe"
        );

        let settings = config.into_settings().unwrap();
        assert_eq!(settings.profile.server, "vault.example.com");
        assert!(settings.profile.ssl);
        assert!(!settings.profile.password.is_empty());
        assert_eq!(settings.policy.path.as_str(), "$/trunk");
        assert_eq!(settings.policy.merge, MergeStrategy::Automatic);
        assert_eq!(settings.policy.file_time, FileTimePolicy::Checkin);
        assert!(settings.policy.make_writable);
        assert_eq!(settings.key(), Some("vault-5"));
    }

    #[test]
    fn test_missing_fields_reported() {
        let config = ScmConfig::from_toml_str("[connection]\nuser = \"builder\"\n").unwrap();
        assert_eq!(
            config.missing_fields(),
            vec!["connection.server", "connection.repository", "fetch.path"]
        );
    }

    #[test]
    fn test_defaults_apply_to_blank_options() {
        let config = ScmConfig::from_toml_str("[fetch]\npath = \"$/x\"\nmerge = \"\"\n").unwrap();
        let settings = config.into_settings().unwrap();
        assert_eq!(settings.policy.merge, MergeStrategy::Overwrite);
        assert_eq!(settings.policy.file_time, FileTimePolicy::Modification);
        assert_eq!(settings.installation, None);
    }

    #[test]
    fn test_bad_path_rejected() {
        let config = ScmConfig::from_toml_str("[fetch]\npath = \"trunk\"\n").unwrap();
        assert!(matches!(
            config.into_settings(),
            Err(VaultScmError::InvalidRepositoryPath(_))
        ));
    }

    #[test]
    fn test_unknown_merge_rejected() {
        let config = ScmConfig::from_toml_str("[fetch]\npath = \"$/x\"\nmerge = \"sideways\"\n").unwrap();
        assert!(matches!(
            config.into_settings(),
            Err(VaultScmError::UnknownOption { .. })
        ));
    }

    #[test]
    fn test_unset_password_env_is_error() {
        let raw = "[connection]\npassword_env = \"VAULT_SCM_TEST_UNSET_PASSWORD_VAR\"\n[fetch]\npath = \"$/x\"\n";
        let err = ScmConfig::from_toml_str(raw).unwrap().into_settings().unwrap_err();
        assert!(err.to_string().contains("VAULT_SCM_TEST_UNSET_PASSWORD_VAR"));
    }

    #[test]
    fn test_override_password_replaces_env_lookup() {
        let raw = "[connection]\npassword_env = \"VAULT_SCM_TEST_UNSET_PASSWORD_VAR\"\n[fetch]\npath = \"$/x\"\n";
        let mut config = ScmConfig::from_toml_str(raw).unwrap();
        config.override_password(Password::new("from-cli"));
        let settings = config.into_settings().unwrap();
        assert!(!settings.profile.password.is_empty());
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(ScmConfig::from_toml_str("[connection]\nhostname = \"x\"\n").is_err());
    }

    #[test]
    fn test_password_never_in_debug() {
        let config = ScmConfig::from_toml_str(FULL).unwrap();
        assert!(!format!("{config:?}").contains("inline-secret"));
    }
}
