//! # Credential sources
//!
//! A credential reference (for example `ci` or `vault`) names the material
//! used to authenticate against Vault. Sources resolve references into
//! [`AuthMaterial`] and are selected by URI:
//!
//! ```text
//! env://                  VAULT_TOKEN, CI_ROLE_ID + CI_SECRET_ID, ...
//! dotenv:.env.ci          the same variables, read from a .env file
//! toml:credentials.toml   named entries tagged with a `type`
//! keyring://              tokens saved by `vaultenv login`
//! ```
//!
//! ```rust,ignore
//! use vaultenv::credentials::CredentialProvider;
//!
//! let source = Box::<dyn CredentialProvider>::try_from("dotenv:.env.ci")?;
//! let material = source.resolve("ci")?;
//! ```

use crate::{Result, VaultEnvError};
use std::collections::HashMap;
use std::convert::TryFrom;
use std::fmt;
use url::Url;

pub mod dotenv;
pub mod env;
pub mod file;
pub mod keyring;
#[macro_use]
pub mod macros;


pub use macros::{CREDENTIAL_SOURCES, CredentialSourceRegistration};

/// Metadata shown when listing the available credential sources.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub examples: &'static [&'static str],
}

impl SourceInfo {
    /// Formats as `name: description (e.g., example1, example2)`.
    pub fn display_with_examples(&self) -> String {
        if self.examples.is_empty() {
            format!("{}: {}", self.name, self.description)
        } else {
            format!(
                "{}: {} (e.g., {})",
                self.name,
                self.description,
                self.examples.join(", ")
            )
        }
    }
}

/// Returns every registered credential source.
pub fn sources() -> Vec<SourceInfo> {
    CREDENTIAL_SOURCES
        .iter()
        .map(|reg| reg.info.clone())
        .collect()
}

/// What a Vault login needs.
///
/// `mount` overrides the default auth mount path (`approle`, `userpass`,
/// `kubernetes`).
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMaterial {
    Token(String),
    AppRole {
        role_id: String,
        secret_id: String,
        mount: Option<String>,
    },
    UserPass {
        username: String,
        password: String,
        mount: Option<String>,
    },
    Kubernetes {
        role: String,
        jwt: String,
        mount: Option<String>,
    },
}

impl AuthMaterial {
    /// Short name of the auth method, safe to log.
    pub fn method(&self) -> &'static str {
        match self {
            AuthMaterial::Token(_) => "token",
            AuthMaterial::AppRole { .. } => "approle",
            AuthMaterial::UserPass { .. } => "userpass",
            AuthMaterial::Kubernetes { .. } => "kubernetes",
        }
    }
}

impl fmt::Debug for AuthMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const REDACTED: &str = "<redacted>";
        match self {
            AuthMaterial::Token(_) => f.debug_tuple("Token").field(&REDACTED).finish(),
            AuthMaterial::AppRole { role_id, mount, .. } => f
                .debug_struct("AppRole")
                .field("role_id", role_id)
                .field("secret_id", &REDACTED)
                .field("mount", mount)
                .finish(),
            AuthMaterial::UserPass {
                username, mount, ..
            } => f
                .debug_struct("UserPass")
                .field("username", username)
                .field("password", &REDACTED)
                .field("mount", mount)
                .finish(),
            AuthMaterial::Kubernetes { role, mount, .. } => f
                .debug_struct("Kubernetes")
                .field("role", role)
                .field("jwt", &REDACTED)
                .field("mount", mount)
                .finish(),
        }
    }
}

/// Resolves credential references into auth material.
///
/// Sources must be `Send + Sync` so one instance can serve concurrent
/// resolution runs.
pub trait CredentialProvider: Send + Sync {
    /// Looks up the material named `credential_ref`.
    ///
    /// # Errors
    ///
    /// Returns `CredentialNotFound` when the source has nothing under that
    /// name.
    fn resolve(&self, credential_ref: &str) -> Result<AuthMaterial>;

    /// Saves material under `credential_ref`. Read-only sources refuse.
    fn store(&self, credential_ref: &str, _material: &AuthMaterial) -> Result<()> {
        Err(VaultEnvError::Config(format!(
            "Credential source '{}' is read-only, cannot store '{}'",
            self.name(),
            credential_ref
        )))
    }

    fn allows_store(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str;
}

/// Fixed in-memory credentials, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    entries: HashMap<String, AuthMaterial>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, credential_ref: impl Into<String>, material: AuthMaterial) -> Self {
        self.entries.insert(credential_ref.into(), material);
        self
    }

    pub fn with_token(self, credential_ref: impl Into<String>, token: impl Into<String>) -> Self {
        self.with(credential_ref, AuthMaterial::Token(token.into()))
    }
}

impl CredentialProvider for StaticCredentials {
    fn resolve(&self, credential_ref: &str) -> Result<AuthMaterial> {
        self.entries
            .get(credential_ref)
            .cloned()
            .ok_or_else(|| VaultEnvError::CredentialNotFound(credential_ref.to_string()))
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Variable prefix for a reference: upper-cased, every non-alphanumeric
/// character replaced with `_` (`ci-deploy` becomes `CI_DEPLOY`).
pub fn variable_prefix(credential_ref: &str) -> String {
    credential_ref
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Builds material from `<PREFIX>_*` variables.
///
/// A token wins over AppRole, which wins over userpass. An optional
/// `<PREFIX>_AUTH_MOUNT` overrides the login mount.
pub(crate) fn material_from_vars<F>(credential_ref: &str, lookup: F) -> Option<AuthMaterial>
where
    F: Fn(&str) -> Option<String>,
{
    let prefix = variable_prefix(credential_ref);
    let get = |suffix: &str| {
        lookup(&format!("{}_{}", prefix, suffix)).filter(|value| !value.trim().is_empty())
    };

    if let Some(token) = get("TOKEN") {
        return Some(AuthMaterial::Token(token));
    }

    let mount = get("AUTH_MOUNT");
    if let (Some(role_id), Some(secret_id)) = (get("ROLE_ID"), get("SECRET_ID")) {
        return Some(AuthMaterial::AppRole {
            role_id,
            secret_id,
            mount,
        });
    }
    if let (Some(username), Some(password)) = (get("USERNAME"), get("PASSWORD")) {
        return Some(AuthMaterial::UserPass {
            username,
            password,
            mount,
        });
    }

    None
}

/// Joins the host and path of a source URI back into a filesystem path.
///
/// `dotenv:config/.env` is normalized to `dotenv://config/.env`, which
/// puts `config` in the host position.
pub(crate) fn location_from_url(url: &Url) -> Option<String> {
    let joined = format!("{}{}", url.host_str().unwrap_or(""), url.path());
    if joined.is_empty() || joined == "/" {
        None
    } else {
        Some(joined)
    }
}

impl TryFrom<String> for Box<dyn CredentialProvider> {
    type Error = VaultEnvError;

    fn try_from(s: String) -> Result<Self> {
        Self::try_from(&s as &str)
    }
}

impl TryFrom<&str> for Box<dyn CredentialProvider> {
    type Error = VaultEnvError;

    /// Accepts full URIs (`dotenv:///abs/.env`), shorthand (`dotenv:.env`),
    /// and bare source names (`keyring`).
    fn try_from(s: &str) -> Result<Self> {
        let (scheme, rest) = match s.find(':') {
            Some(pos) => (&s[..pos], &s[pos + 1..]),
            None => (s, ""),
        };

        if !CREDENTIAL_SOURCES
            .iter()
            .any(|reg| reg.schemes.contains(&scheme))
        {
            return Err(VaultEnvError::CredentialSourceNotFound(scheme.to_string()));
        }

        let url_string = match rest {
            "" | ":" => format!("{}://", scheme),
            s if s.starts_with("//") => format!("{}:{}", scheme, s),
            s => format!("{}://{}", scheme, s),
        };

        let url = Url::parse(&url_string).map_err(|e| {
            VaultEnvError::Config(format!(
                "Invalid credential source '{}': {}",
                s, e
            ))
        })?;

        Self::try_from(&url)
    }
}

impl TryFrom<&Url> for Box<dyn CredentialProvider> {
    type Error = VaultEnvError;

    fn try_from(url: &Url) -> Result<Self> {
        let scheme = url.scheme();

        let registration = CREDENTIAL_SOURCES
            .iter()
            .find(|reg| reg.schemes.contains(&scheme))
            .ok_or_else(|| VaultEnvError::CredentialSourceNotFound(scheme.to_string()))?;

        (registration.factory)(url)
    }
}
