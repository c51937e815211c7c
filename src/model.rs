//! Secret requests and the environment they resolve into

use crate::{Result, VaultEnvError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Addressing scheme of a Vault KV secrets engine.
///
/// Version 1 reads the path as given. Version 2 inserts a `data` segment
/// after the mount and wraps payloads in a `data` envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum EngineVersion {
    V1,
    #[default]
    V2,
}

impl EngineVersion {
    pub fn as_u8(self) -> u8 {
        match self {
            EngineVersion::V1 => 1,
            EngineVersion::V2 => 2,
        }
    }
}

impl TryFrom<u8> for EngineVersion {
    type Error = VaultEnvError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(EngineVersion::V1),
            2 => Ok(EngineVersion::V2),
            other => Err(VaultEnvError::Validation(format!(
                "Unsupported engine version {}, expected 1 or 2",
                other
            ))),
        }
    }
}

impl From<EngineVersion> for u8 {
    fn from(version: EngineVersion) -> Self {
        version.as_u8()
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Maps one key of a Vault secret to an environment variable.
///
/// When a `secret` payload is attached the mapping describes a value to
/// write instead of one to read.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValueMapping {
    source_key: String,
    target_variable: Option<String>,
    secret: Option<String>,
}

impl SecretValueMapping {
    /// Creates a mapping for `source_key`.
    ///
    /// The key is trimmed; an empty key is rejected.
    pub fn new(source_key: impl Into<String>) -> Result<Self> {
        let source_key = source_key.into().trim().to_string();
        if source_key.is_empty() {
            return Err(VaultEnvError::Validation(
                "Vault key cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            source_key,
            target_variable: None,
            secret: None,
        })
    }

    pub fn with_target_variable(mut self, target: impl Into<String>) -> Self {
        self.set_target_variable(target);
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.set_secret(secret);
        self
    }

    /// Sets the environment variable name. A blank name restores the
    /// fallback to the source key.
    pub fn set_target_variable(&mut self, target: impl Into<String>) {
        let target = target.into().trim().to_string();
        self.target_variable = if target.is_empty() { None } else { Some(target) };
    }

    pub fn set_secret(&mut self, secret: impl Into<String>) {
        self.secret = Some(secret.into());
    }

    pub fn source_key(&self) -> &str {
        &self.source_key
    }

    /// The environment variable to populate, or the source key when none
    /// was set.
    pub fn target_variable(&self) -> &str {
        self.target_variable.as_deref().unwrap_or(&self.source_key)
    }

    /// The value to write, if any.
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }
}

impl fmt::Debug for SecretValueMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretValueMapping")
            .field("source_key", &self.source_key)
            .field("target_variable", &self.target_variable)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A group of mappings served by a single Vault path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRequest {
    path: String,
    engine_version: EngineVersion,
    values: Vec<SecretValueMapping>,
}

impl SecretRequest {
    /// Creates a request for `path` using engine version 2.
    pub fn new(path: impl Into<String>, values: Vec<SecretValueMapping>) -> Result<Self> {
        let path = path.into().trim().to_string();
        if path.is_empty() {
            return Err(VaultEnvError::Validation(
                "Vault path cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            path,
            engine_version: EngineVersion::default(),
            values,
        })
    }

    pub fn with_engine_version(mut self, engine_version: EngineVersion) -> Self {
        self.engine_version = engine_version;
        self
    }

    /// The path template, before variable expansion.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn engine_version(&self) -> EngineVersion {
        self.engine_version
    }

    pub fn values(&self) -> &[SecretValueMapping] {
        &self.values
    }

    /// A request is a write when any of its mappings carries a payload.
    pub fn is_write(&self) -> bool {
        self.values.iter().any(SecretValueMapping::has_secret)
    }

    /// The payload sent for a write request: every mapping with a secret,
    /// keyed by its source key.
    pub fn write_payload(&self) -> HashMap<String, String> {
        self.values
            .iter()
            .filter_map(|mapping| {
                mapping
                    .secret()
                    .map(|secret| (mapping.source_key().to_string(), secret.to_string()))
            })
            .collect()
    }
}

/// Environment variables produced by one resolution run.
///
/// Keys are unique; inserting an existing variable replaces its value.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ResolvedEnvironment {
    vars: HashMap<String, String>,
    missed: Vec<MissedValue>,
    interrupted: bool,
}

/// A read that was skipped under the best-effort policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissedValue {
    /// Position of the request in the batch.
    pub request: usize,
    /// The missing key, or `None` when the whole path failed.
    pub key: Option<String>,
}

impl ResolvedEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `variable`, returning the value it replaced.
    pub fn insert(&mut self, variable: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.vars.insert(variable.into(), value.into())
    }

    pub fn get(&self, variable: &str) -> Option<&str> {
        self.vars.get(variable).map(String::as_str)
    }

    pub fn contains(&self, variable: &str) -> bool {
        self.vars.contains_key(variable)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Variable names, sorted.
    pub fn variables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.vars.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Reads that produced no value, in the order they failed.
    pub fn missed(&self) -> &[MissedValue] {
        &self.missed
    }

    /// Whether the mapping for `source_key` in request `request` failed.
    /// Unlike [`contains`](Self::contains) this is not fooled by a later
    /// request setting the same variable.
    pub fn is_missed(&self, request: usize, source_key: &str) -> bool {
        self.missed.iter().any(|miss| {
            miss.request == request && miss.key.as_deref().is_none_or(|key| key == source_key)
        })
    }

    pub(crate) fn record_miss(&mut self, request: usize, key: Option<String>) {
        self.missed.push(MissedValue { request, key });
    }

    /// `false` when the run was cancelled before every request was processed.
    pub fn is_complete(&self) -> bool {
        !self.interrupted
    }

    pub(crate) fn mark_interrupted(&mut self) {
        self.interrupted = true;
    }

    pub(crate) fn as_map(&self) -> &HashMap<String, String> {
        &self.vars
    }

    pub fn into_vars(self) -> HashMap<String, String> {
        self.vars
    }
}

impl fmt::Debug for ResolvedEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedEnvironment")
            .field("variables", &self.variables())
            .field("missed", &self.missed)
            .field("interrupted", &self.interrupted)
            .finish()
    }
}

impl IntoIterator for ResolvedEnvironment {
    type Item = (String, String);
    type IntoIter = std::collections::hash_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.vars.into_iter()
    }
}
