//! Error types for vaultenv operations

use std::io;
use thiserror::Error;

use vaultenv_core::ParseError;

/// The main error type for vaultenv operations
///
/// Errors fall in two groups. Most are fatal and abort a run immediately.
/// [`SecretNotFound`](VaultEnvError::SecretNotFound) and
/// [`Store`](VaultEnvError::Store) are conditional: the resolver only
/// propagates them when the policy asks to fail on missing secrets, see
/// [`is_conditional`](VaultEnvError::is_conditional).
#[derive(Error, Debug)]
pub enum VaultEnvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Dotenv error: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Credential '{0}' not found")]
    CredentialNotFound(String),
    #[error("Credential source '{0}' not found")]
    CredentialSourceNotFound(String),
    #[error("Vault authentication failed: {0}")]
    Auth(String),
    /// A path (or a key at that path) is absent from Vault.
    ///
    /// The message is the same whether the whole path or a single key is
    /// missing; `key` tells them apart.
    #[error("Vault credentials not found for '{path}'")]
    SecretNotFound { path: String, key: Option<String> },
    #[error("Vault responded with {status} for '{path}'")]
    Store {
        path: String,
        status: u16,
        body: String,
    },
    #[error("Vault at {url} unreachable after {attempts} attempt(s): {reason}")]
    Unreachable {
        url: String,
        attempts: u32,
        reason: String,
    },
    #[error("No vaultenv.toml found in current directory")]
    NoManifest,
    #[error(
        "No Vault URL configured.\n\nTo fix this, either:\n  1. Set `url` in the [vault] section of vaultenv.toml\n  2. Run 'vaultenv config init' to set a default\n  3. Export VAULT_ADDR"
    )]
    NoStoreUrl,
}

impl VaultEnvError {
    /// Whether the resolver may log this error and carry on instead of
    /// aborting the run.
    pub fn is_conditional(&self) -> bool {
        matches!(
            self,
            VaultEnvError::SecretNotFound { .. } | VaultEnvError::Store { .. }
        )
    }
}

/// A type alias for `Result<T, VaultEnvError>`
pub type Result<T> = std::result::Result<T, VaultEnvError>;

impl From<ParseError> for VaultEnvError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Io(io_err) => {
                if io_err.kind() == io::ErrorKind::NotFound {
                    VaultEnvError::NoManifest
                } else {
                    VaultEnvError::Io(io_err)
                }
            }
            ParseError::Toml(toml_err) => VaultEnvError::Toml(toml_err),
            ParseError::CircularDependency(msg) => VaultEnvError::Config(msg),
            ParseError::Validation(msg) => VaultEnvError::Validation(msg),
        }
    }
}
