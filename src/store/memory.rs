//! In-memory store for embedding and tests

use super::{ReadOutcome, StoreClient, StoreSession};
use crate::credentials::AuthMaterial;
use crate::model::EngineVersion;
use crate::policy::Policy;
use crate::{Result, VaultEnvError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// One interaction with a [`MemoryStore`], in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Init {
        method: &'static str,
    },
    Read {
        path: String,
        engine_version: EngineVersion,
    },
    Write {
        path: String,
        data: HashMap<String, String>,
        engine_version: EngineVersion,
    },
}

#[derive(Debug, Default)]
struct MemoryState {
    secrets: HashMap<(EngineVersion, String), HashMap<String, String>>,
    failures: HashMap<String, (u16, String)>,
    reject_auth: Option<String>,
    calls: Vec<StoreCall>,
}

/// A store that keeps secrets in a shared map.
///
/// Clones share state, so a test can keep one handle for assertions while
/// the resolver owns another. Paths are keyed per engine version: a secret
/// written through v1 is invisible to v2 reads.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seeds a secret.
    pub fn with_secret<I, K, V>(self, engine_version: EngineVersion, path: &str, data: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let data = data
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.state()
            .secrets
            .insert((engine_version, path.to_string()), data);
        self
    }

    /// Makes every login fail with `reason`.
    pub fn rejecting_auth(self, reason: impl Into<String>) -> Self {
        self.state().reject_auth = Some(reason.into());
        self
    }

    /// Answers reads and writes of `path` with an error status.
    pub fn failing_path(self, path: &str, status: u16, body: impl Into<String>) -> Self {
        self.state()
            .failures
            .insert(path.to_string(), (status, body.into()));
        self
    }

    pub fn secret(&self, engine_version: EngineVersion, path: &str) -> Option<HashMap<String, String>> {
        self.state()
            .secrets
            .get(&(engine_version, path.to_string()))
            .cloned()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    pub fn init_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| matches!(call, StoreCall::Init { .. }))
            .count()
    }
}

impl StoreClient for MemoryStore {
    fn init(&self, _policy: &Policy, material: &AuthMaterial) -> Result<Box<dyn StoreSession>> {
        let mut state = self.state();
        state.calls.push(StoreCall::Init {
            method: material.method(),
        });
        if let Some(reason) = &state.reject_auth {
            return Err(VaultEnvError::Auth(reason.clone()));
        }

        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemorySession {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySession {
    fn failure(state: &MemoryState, path: &str) -> Option<VaultEnvError> {
        state
            .failures
            .get(path)
            .map(|(status, body)| VaultEnvError::Store {
                path: path.to_string(),
                status: *status,
                body: body.clone(),
            })
    }
}

impl StoreSession for MemorySession {
    fn read(&self, path: &str, engine_version: EngineVersion) -> Result<ReadOutcome> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.push(StoreCall::Read {
            path: path.to_string(),
            engine_version,
        });
        if let Some(err) = Self::failure(&state, path) {
            return Err(err);
        }

        Ok(state
            .secrets
            .get(&(engine_version, path.to_string()))
            .cloned()
            .map_or(ReadOutcome::NotFound, ReadOutcome::Found))
    }

    fn write(
        &self,
        path: &str,
        data: &HashMap<String, String>,
        engine_version: EngineVersion,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.calls.push(StoreCall::Write {
            path: path.to_string(),
            data: data.clone(),
            engine_version,
        });
        if let Some(err) = Self::failure(&state, path) {
            return Err(err);
        }

        state
            .secrets
            .insert((engine_version, path.to_string()), data.clone());
        Ok(())
    }
}
