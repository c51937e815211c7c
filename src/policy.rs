//! Connection settings and resolution policy

use crate::model::EngineVersion;
use crate::{Result, VaultEnvError};
use std::time::Duration;
use url::Url;

/// Settings for one resolution run.
///
/// Built once, then only read. Cloning is cheap enough to hand a copy to
/// each concurrent run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    store_url: Url,
    credential_ref: String,
    fail_if_not_found: bool,
    retries: u32,
    retry_interval: Duration,
    timeout: Duration,
    engine_version: EngineVersion,
    namespace: Option<String>,
    prefix_path_depth: usize,
    skip_tls_verify: bool,
}

impl Policy {
    pub const DEFAULT_RETRIES: u32 = 5;
    pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(1000);
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Creates a policy for the Vault at `store_url`, authenticating with
    /// the credential named `credential_ref`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the URL is empty, unparseable or not
    /// http(s), or if the credential reference is blank.
    pub fn new(store_url: &str, credential_ref: &str) -> Result<Self> {
        let store_url = store_url.trim();
        if store_url.is_empty() {
            return Err(VaultEnvError::Validation(
                "Vault URL cannot be empty".to_string(),
            ));
        }

        let parsed = Url::parse(store_url).map_err(|e| {
            VaultEnvError::Validation(format!("Invalid Vault URL '{}': {}", store_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(VaultEnvError::Validation(format!(
                "Vault URL '{}' must use http or https",
                store_url
            )));
        }

        let credential_ref = credential_ref.trim();
        if credential_ref.is_empty() {
            return Err(VaultEnvError::Validation(
                "Credential reference cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            store_url: parsed,
            credential_ref: credential_ref.to_string(),
            fail_if_not_found: true,
            retries: Self::DEFAULT_RETRIES,
            retry_interval: Self::DEFAULT_RETRY_INTERVAL,
            timeout: Self::DEFAULT_TIMEOUT,
            engine_version: EngineVersion::default(),
            namespace: None,
            prefix_path_depth: 1,
            skip_tls_verify: false,
        })
    }

    pub fn with_fail_if_not_found(mut self, fail: bool) -> Self {
        self.fail_if_not_found = fail;
        self
    }

    pub fn with_retries(mut self, retries: u32, interval: Duration) -> Self {
        self.retries = retries;
        self.retry_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_engine_version(mut self, engine_version: EngineVersion) -> Self {
        self.engine_version = engine_version;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        self.namespace = if namespace.trim().is_empty() {
            None
        } else {
            Some(namespace)
        };
        self
    }

    /// Sets how many leading path segments make up the KV mount.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a depth of zero.
    pub fn with_prefix_path_depth(mut self, depth: usize) -> Result<Self> {
        if depth == 0 {
            return Err(VaultEnvError::Validation(
                "prefix_path_depth must be at least 1".to_string(),
            ));
        }
        self.prefix_path_depth = depth;
        Ok(self)
    }

    pub fn with_skip_tls_verify(mut self, skip: bool) -> Self {
        self.skip_tls_verify = skip;
        self
    }

    pub fn store_url(&self) -> &Url {
        &self.store_url
    }

    pub fn credential_ref(&self) -> &str {
        &self.credential_ref
    }

    pub fn fail_if_not_found(&self) -> bool {
        self.fail_if_not_found
    }

    /// Extra attempts after the first one fails to connect.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Engine version applied to requests that don't set their own.
    pub fn engine_version(&self) -> EngineVersion {
        self.engine_version
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn prefix_path_depth(&self) -> usize {
        self.prefix_path_depth
    }

    pub fn skip_tls_verify(&self) -> bool {
        self.skip_tls_verify
    }
}
