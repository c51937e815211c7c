//! # vaultenv core
//!
//! Manifest types and parsing for `vaultenv.toml`, plus the global user
//! configuration.
//!
//! A manifest declares how to reach Vault and which secrets to fetch (or
//! write) for one execution step. Manifests can extend other manifests to
//! share common secret declarations; circular inheritance is rejected.
//!
//! ```toml
//! extends = ["../shared"]
//!
//! [vault]
//! url = "https://vault.example.com:8200"
//! credential = "ci"
//! fail_if_not_found = true
//! engine_version = 2
//!
//! [[secrets]]
//! path = "secret/${DEPLOY_ENV}/database"
//! values = [
//!   { vault_key = "username", env_var = "DB_USER" },
//!   { vault_key = "password", env_var = "DB_PASSWORD" },
//! ]
//!
//! [[secrets]]
//! path = "kv/legacy"
//! engine_version = 1
//! values = [["LEGACY_TOKEN", "token"]]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File name looked up when an extended manifest is given as a directory.
pub const MANIFEST_FILE: &str = "vaultenv.toml";

/// The root of a `vaultenv.toml` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Relative paths of manifests (or directories containing one) to inherit from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<Vec<String>>,
    /// Connection and policy settings
    #[serde(default)]
    pub vault: VaultSection,
    /// Secret declarations, processed in order
    #[serde(default)]
    pub secrets: Vec<SecretEntry>,
}

impl Manifest {
    /// Validate the manifest.
    ///
    /// Ensures that:
    /// - Every secret entry has a non-empty path and at least one value
    /// - Every value names a non-empty Vault key
    /// - Engine versions are 1 or 2
    ///
    /// # Errors
    ///
    /// Returns a `ParseError::Validation` describing the first problem found.
    pub fn validate(&self) -> Result<(), ParseError> {
        if let Some(version) = self.vault.engine_version {
            validate_engine_version(version)
                .map_err(|e| ParseError::Validation(format!("[vault]: {}", e)))?;
        }

        for (index, entry) in self.secrets.iter().enumerate() {
            entry.validate().map_err(|e| {
                ParseError::Validation(format!("Secret #{} ('{}'): {}", index + 1, entry.path, e))
            })?;
        }

        Ok(())
    }

    /// Merge an extended manifest into this one.
    ///
    /// Settings in `self` win; a `[vault]` field is only taken from `other`
    /// when unset here. Secrets from `other` are placed before the secrets of
    /// `self`, so local declarations are processed last and override.
    pub fn merge_with(&mut self, other: Manifest) {
        self.vault.inherit(&other.vault);
        let mut secrets = other.secrets;
        secrets.append(&mut self.secrets);
        self.secrets = secrets;
    }

    // Internal methods

    fn from_path_with_visited(
        path: &Path,
        visited: &mut HashSet<PathBuf>,
    ) -> Result<Self, ParseError> {
        // Get canonical path to handle symlinks and relative paths consistently
        let canonical_path = path.canonicalize().map_err(|e| {
            ParseError::Io(io::Error::new(
                e.kind(),
                format!("Failed to resolve path {}: {}", path.display(), e),
            ))
        })?;

        if !visited.insert(canonical_path.clone()) {
            return Err(ParseError::CircularDependency(format!(
                "Manifest {} is part of a circular dependency chain",
                canonical_path.display()
            )));
        }

        let content = fs::read_to_string(path)?;
        let manifest = Self::from_str_with_visited(&content, Some(path), visited)?;
        // Only ancestors count as a cycle; siblings may share a base.
        visited.remove(&canonical_path);
        Ok(manifest)
    }

    fn from_str_with_visited(
        content: &str,
        base_path: Option<&Path>,
        visited: &mut HashSet<PathBuf>,
    ) -> Result<Self, ParseError> {
        let mut manifest: Manifest = toml::from_str(content)?;

        if let Some(extends_paths) = manifest.extends.clone() {
            if let Some(base) = base_path {
                let base_dir = base.parent().unwrap_or(Path::new("."));
                manifest =
                    Self::merge_extended_manifests(manifest, &extends_paths, base_dir, visited)?;
            }
        }

        Ok(manifest)
    }

    fn merge_extended_manifests(
        mut base: Manifest,
        extends_paths: &[String],
        base_dir: &Path,
        visited: &mut HashSet<PathBuf>,
    ) -> Result<Manifest, ParseError> {
        // Collected first so that `extends = [a, b]` yields a, b, then local.
        let mut inherited = Manifest::default();

        for extend_path in extends_paths {
            let candidate = base_dir.join(extend_path);
            let full_path = if candidate.extension().is_some_and(|ext| ext == "toml") {
                candidate
            } else {
                candidate.join(MANIFEST_FILE)
            };

            if !full_path.exists() {
                return Err(ParseError::Validation(format!(
                    "Extended manifest not found: {}",
                    full_path.display()
                )));
            }

            let extended = Self::from_path_with_visited(&full_path, visited)?;
            inherited.vault.inherit(&extended.vault);
            inherited.secrets.extend(extended.secrets);
        }

        base.merge_with(inherited);
        Ok(base)
    }
}

impl FromStr for Manifest {
    type Err = ParseError;

    /// Parse a manifest from a TOML string.
    ///
    /// Note: `extends` is ignored when parsing from a string since there's
    /// no base path to resolve relative paths against.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut visited = HashSet::new();
        Self::from_str_with_visited(s, None, &mut visited)
    }
}

impl TryFrom<&Path> for Manifest {
    type Error = ParseError;

    /// Load a manifest from a file path, following `extends`.
    fn try_from(path: &Path) -> Result<Self, Self::Error> {
        let mut visited = HashSet::new();
        Self::from_path_with_visited(path, &mut visited)
    }
}

/// The `[vault]` section: connection settings and resolution policy.
///
/// Every field is optional so that extended manifests and the global
/// configuration can fill the gaps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSection {
    /// Vault server address, e.g. `https://vault.example.com:8200`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Reference resolved by the credential source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    /// Abort the whole run on the first missing secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_if_not_found: Option<bool>,
    /// Default KV engine version for secrets that don't set one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<u8>,
    /// Per-request timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Extra attempts after a connection failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    /// Pause between attempts, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_interval_ms: Option<u64>,
    /// Vault Enterprise namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Number of leading path segments forming the KV mount
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_path_depth: Option<usize>,
    /// Disable TLS certificate verification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_tls_verify: Option<bool>,
}

impl VaultSection {
    /// Fill every unset field from `other`.
    pub fn inherit(&mut self, other: &VaultSection) {
        fn fill<T: Clone>(slot: &mut Option<T>, from: &Option<T>) {
            if slot.is_none() {
                slot.clone_from(from);
            }
        }

        fill(&mut self.url, &other.url);
        fill(&mut self.credential, &other.credential);
        fill(&mut self.fail_if_not_found, &other.fail_if_not_found);
        fill(&mut self.engine_version, &other.engine_version);
        fill(&mut self.timeout, &other.timeout);
        fill(&mut self.retries, &other.retries);
        fill(&mut self.retry_interval_ms, &other.retry_interval_ms);
        fill(&mut self.namespace, &other.namespace);
        fill(&mut self.prefix_path_depth, &other.prefix_path_depth);
        fill(&mut self.skip_tls_verify, &other.skip_tls_verify);
    }
}

/// One `[[secrets]]` entry: a Vault path and the values mapped from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretEntry {
    /// Vault path, may reference environment variables (`${VAR}`)
    pub path: String,
    /// KV engine version for this path (falls back to `[vault].engine_version`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<u8>,
    /// Key mappings, in declaration order
    pub values: Vec<ValueEntry>,
}

impl SecretEntry {
    /// Validate the secret entry.
    pub fn validate(&self) -> Result<(), String> {
        if self.path.trim().is_empty() {
            return Err("path cannot be empty".into());
        }

        if let Some(version) = self.engine_version {
            validate_engine_version(version)?;
        }

        if self.values.is_empty() {
            return Err("at least one value must be declared".into());
        }

        for value in &self.values {
            if value.vault_key().trim().is_empty() {
                return Err("vault_key cannot be empty".into());
            }
        }

        Ok(())
    }
}

/// A value mapping as written in the manifest.
///
/// The pair form `["ENV_VAR", "vault_key"]` is the legacy two-argument
/// declaration and is kept for existing manifests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueEntry {
    /// Legacy `[env_var, vault_key]` pair
    Pair(String, String),
    /// Table form
    Table(ValueTable),
}

impl ValueEntry {
    /// The Vault key this entry reads or writes.
    pub fn vault_key(&self) -> &str {
        match self {
            ValueEntry::Pair(_, key) => key,
            ValueEntry::Table(table) => &table.vault_key,
        }
    }

    /// Whether this is the legacy pair form.
    pub fn is_legacy(&self) -> bool {
        matches!(self, ValueEntry::Pair(..))
    }
}

/// Table form of a value mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueTable {
    /// Key inside the Vault secret
    #[serde(alias = "vaultKey")]
    pub vault_key: String,
    /// Environment variable to export, defaults to `vault_key`
    #[serde(default, alias = "envVar", skip_serializing_if = "Option::is_none")]
    pub env_var: Option<String>,
    /// Value to write to Vault; turns the entry into a write
    #[serde(default, alias = "vaultSecret", skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

fn validate_engine_version(version: u8) -> Result<(), String> {
    match version {
        1 | 2 => Ok(()),
        other => Err(format!(
            "unsupported engine_version {}, expected 1 or 2",
            other
        )),
    }
}

/// Global user configuration for vaultenv.
///
/// Stored in the user's config directory and provides defaults that apply
/// to every manifest.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GlobalConfig {
    /// Default settings
    #[serde(default)]
    pub defaults: GlobalDefaults,
}

/// Default settings in the global configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GlobalDefaults {
    /// Vault address used when a manifest doesn't set one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Credential reference used when a manifest doesn't set one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    /// Credential source URI (e.g. `env://`, `keyring://`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
}

impl GlobalConfig {
    /// Gets the path to the global configuration file.
    ///
    /// Typically `~/.config/vaultenv/config.toml` on Unix systems.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined
    pub fn path() -> Result<PathBuf, io::Error> {
        use directories::ProjectDirs;
        let dirs = ProjectDirs::from("", "", "vaultenv").ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "Could not find config directory")
        })?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Loads the global user configuration, `Ok(None)` if there is none.
    pub fn load() -> Result<Option<Self>, ParseError> {
        let config_path = Self::path().map_err(ParseError::Io)?;
        Self::load_from(&config_path)
    }

    /// Loads a global configuration from an explicit path.
    pub fn load_from(config_path: &Path) -> Result<Option<Self>, ParseError> {
        if !config_path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(config_path)?;
        toml::from_str(&content).map(Some).map_err(ParseError::Toml)
    }

    /// Saves the global configuration to disk, creating the directory.
    pub fn save(&self) -> Result<(), io::Error> {
        let config_path = Self::path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&config_path, content)?;

        Ok(())
    }
}

/// Errors that can occur when loading manifests.
#[derive(Debug)]
pub enum ParseError {
    /// I/O error when reading manifest files
    Io(io::Error),
    /// TOML parsing error
    Toml(toml::de::Error),
    /// Circular dependency detected in manifest inheritance
    CircularDependency(String),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Io(e) => write!(f, "I/O error: {}", e),
            ParseError::Toml(e) => write!(f, "TOML parsing error: {}", e),
            ParseError::CircularDependency(msg) => {
                write!(f, "Circular dependency detected: {}", msg)
            }
            ParseError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Io(e) => Some(e),
            ParseError::Toml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ParseError {
    fn from(e: io::Error) -> Self {
        ParseError::Io(e)
    }
}

impl From<toml::de::Error> for ParseError {
    fn from(e: toml::de::Error) -> Self {
        ParseError::Toml(e)
    }
}
