//! # Store clients
//!
//! A [`StoreClient`] authenticates once per resolution run and hands back a
//! [`StoreSession`] that serves every read and write of that run.
//!
//! - [`HttpStore`] talks to a real Vault over its HTTP API.
//! - [`MemoryStore`] keeps secrets in memory and records every call.
//!
//! Both flatten KV v1 and KV v2 responses into a plain key/value map, so
//! callers never see the v2 `data` envelope.

use crate::credentials::AuthMaterial;
use crate::model::EngineVersion;
use crate::policy::Policy;
use crate::Result;
use serde_json::{Map, Value};
use std::collections::HashMap;

pub mod http;
pub mod memory;

#[cfg(test)]
mod tests;

pub use http::HttpStore;
pub use memory::{MemoryStore, StoreCall};

/// Result of reading one path.
///
/// `NotFound` is distinct from a secret with no keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Found(HashMap<String, String>),
    NotFound,
}

/// Opens authenticated sessions against a secret store.
pub trait StoreClient: Send + Sync {
    /// Authenticates with `material`.
    ///
    /// # Errors
    ///
    /// Returns `Auth` when the material is rejected or the store cannot be
    /// reached within the policy's retries.
    fn init(&self, policy: &Policy, material: &AuthMaterial) -> Result<Box<dyn StoreSession>>;
}

/// An authenticated connection, owned by a single resolution run.
pub trait StoreSession: Send {
    /// Reads the secret at `path`.
    ///
    /// A missing path is `Ok(ReadOutcome::NotFound)`; any other non-success
    /// answer is a `Store` error.
    fn read(&self, path: &str, engine_version: EngineVersion) -> Result<ReadOutcome>;

    /// Replaces the secret at `path` with `data`.
    fn write(
        &self,
        path: &str,
        data: &HashMap<String, String>,
        engine_version: EngineVersion,
    ) -> Result<()>;
}

/// Maps a logical secret path to its API path under `/v1/`.
///
/// KV v2 inserts `data` after the mount, the mount being the first
/// `prefix_path_depth` segments: `secret/app/db` becomes
/// `secret/data/app/db`.
pub fn api_path(path: &str, engine_version: EngineVersion, prefix_path_depth: usize) -> String {
    let trimmed = path.trim_matches('/');
    match engine_version {
        EngineVersion::V1 => trimmed.to_string(),
        EngineVersion::V2 => {
            let segments: Vec<&str> = trimmed.split('/').collect();
            let depth = prefix_path_depth.clamp(1, segments.len());
            let (mount, rest) = segments.split_at(depth);
            if rest.is_empty() {
                format!("{}/data", mount.join("/"))
            } else {
                format!("{}/data/{}", mount.join("/"), rest.join("/"))
            }
        }
    }
}

/// Flattens a JSON object into strings. Non-string values are rendered as
/// compact JSON.
pub(crate) fn flatten(data: Map<String, Value>) -> HashMap<String, String> {
    data.into_iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key, text)
        })
        .collect()
}
