//! Opaque connection credential.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

/// Placeholder printed wherever a password would otherwise appear.
pub const REDACTED: &str = "********";

/// The Vault login password.
///
/// There is no way to get the plaintext out of this type except
/// [`Password::reveal`], which is crate-private and only used when the
/// argument vector for the external client is materialised. `Debug` and
/// `Display` always print [`REDACTED`].
#[derive(Clone)]
pub struct Password(SecretString);

impl Password {
    pub fn new(value: impl Into<String>) -> Self {
        Password(SecretString::from(value.into()))
    }

    /// An empty password; the client falls back to its stored login.
    pub fn empty() -> Self {
        Self::new(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    pub(crate) fn reveal(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Default for Password {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Password({REDACTED})")
    }
}

impl std::fmt::Display for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(REDACTED)
    }
}

impl From<String> for Password {
    fn from(value: String) -> Self {
        Password::new(value)
    }
}

impl From<&str> for Password {
    fn from(value: &str) -> Self {
        Password::new(value)
    }
}

impl<'de> Deserialize<'de> for Password {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Password::new)
    }
}
