//! Loading a run's policy and requests from `vaultenv.toml`
//!
//! Settings are taken from the manifest first, then from the global user
//! configuration, then from the environment (`VAULT_ADDR`). This is also
//! the only place that understands the legacy `[env_var, vault_key]` value
//! pairs; they are rewritten into plain [`SecretValueMapping`]s here.

use crate::model::{EngineVersion, SecretRequest, SecretValueMapping};
use crate::policy::Policy;
use crate::{Result, VaultEnvError};
use std::env;
use std::io;
use std::path::Path;
use std::time::Duration;
use vaultenv_core::{GlobalConfig, Manifest, ParseError, SecretEntry, ValueEntry, VaultSection};

/// Credential reference used when neither the manifest nor the global
/// configuration names one.
pub const DEFAULT_CREDENTIAL: &str = "vault";

/// A loaded manifest, ready to hand to a resolver.
#[derive(Debug, Clone)]
pub struct Configuration {
    policy: Policy,
    requests: Vec<SecretRequest>,
    credential_source: Option<String>,
}

impl Configuration {
    /// Loads the manifest at `manifest_path` together with the global user
    /// configuration and `VAULT_ADDR`.
    pub fn load(manifest_path: &Path) -> Result<Self> {
        let manifest = Manifest::try_from(manifest_path)?;
        let global = load_global_config()?;
        Self::from_manifest(&manifest, global.as_ref(), env::var("VAULT_ADDR").ok())
    }

    /// Builds a configuration from already-parsed parts.
    pub fn from_manifest(
        manifest: &Manifest,
        global: Option<&GlobalConfig>,
        vault_addr: Option<String>,
    ) -> Result<Self> {
        manifest.validate()?;
        let policy = build_policy(&manifest.vault, global, vault_addr)?;
        let requests = build_requests(&manifest.secrets, policy.engine_version())?;
        let credential_source = global
            .and_then(|g| non_blank(g.defaults.credentials.as_deref()))
            .map(str::to_string);

        Ok(Self {
            policy,
            requests,
            credential_source,
        })
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn requests(&self) -> &[SecretRequest] {
        &self.requests
    }

    /// Credential source URI from the global configuration, if any.
    pub fn credential_source(&self) -> Option<&str> {
        self.credential_source.as_deref()
    }

    pub fn into_parts(self) -> (Policy, Vec<SecretRequest>) {
        (self.policy, self.requests)
    }
}

/// Loads the global configuration. A missing file or an undeterminable
/// config directory both mean "no global configuration".
pub fn load_global_config() -> Result<Option<GlobalConfig>> {
    match GlobalConfig::load() {
        Ok(config) => Ok(config),
        Err(ParseError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Builds the policy from a `[vault]` section.
///
/// # Errors
///
/// `NoStoreUrl` when no URL is configured anywhere, `Validation` for
/// malformed values.
pub fn build_policy(
    vault: &VaultSection,
    global: Option<&GlobalConfig>,
    vault_addr: Option<String>,
) -> Result<Policy> {
    let defaults = global.map(|g| &g.defaults);

    let url = non_blank(vault.url.as_deref())
        .or_else(|| defaults.and_then(|d| non_blank(d.url.as_deref())))
        .map(str::to_string)
        .or_else(|| vault_addr.filter(|addr| !addr.trim().is_empty()))
        .ok_or(VaultEnvError::NoStoreUrl)?;

    let credential = non_blank(vault.credential.as_deref())
        .or_else(|| defaults.and_then(|d| non_blank(d.credential.as_deref())))
        .unwrap_or(DEFAULT_CREDENTIAL);

    let mut policy = Policy::new(&url, credential)?;

    if let Some(fail) = vault.fail_if_not_found {
        policy = policy.with_fail_if_not_found(fail);
    }
    if let Some(version) = vault.engine_version {
        policy = policy.with_engine_version(EngineVersion::try_from(version)?);
    }
    if let Some(seconds) = vault.timeout {
        policy = policy.with_timeout(Duration::from_secs(seconds));
    }
    if vault.retries.is_some() || vault.retry_interval_ms.is_some() {
        let retries = vault.retries.unwrap_or(Policy::DEFAULT_RETRIES);
        let interval = vault
            .retry_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(Policy::DEFAULT_RETRY_INTERVAL);
        policy = policy.with_retries(retries, interval);
    }
    if let Some(namespace) = &vault.namespace {
        policy = policy.with_namespace(namespace.clone());
    }
    if let Some(depth) = vault.prefix_path_depth {
        policy = policy.with_prefix_path_depth(depth)?;
    }
    if let Some(skip) = vault.skip_tls_verify {
        policy = policy.with_skip_tls_verify(skip);
    }

    Ok(policy)
}

/// Converts `[[secrets]]` entries into requests, in declaration order.
///
/// Entries without an `engine_version` use `default_engine`.
pub fn build_requests(
    entries: &[SecretEntry],
    default_engine: EngineVersion,
) -> Result<Vec<SecretRequest>> {
    entries
        .iter()
        .map(|entry| {
            let values = entry
                .values
                .iter()
                .map(build_mapping)
                .collect::<Result<Vec<_>>>()?;
            let engine_version = match entry.engine_version {
                Some(version) => EngineVersion::try_from(version)?,
                None => default_engine,
            };
            Ok(SecretRequest::new(entry.path.clone(), values)?.with_engine_version(engine_version))
        })
        .collect()
}

/// Converts one manifest value entry, migrating the legacy pair form.
pub fn build_mapping(entry: &ValueEntry) -> Result<SecretValueMapping> {
    match entry {
        ValueEntry::Pair(env_var, vault_key) => {
            tracing::debug!(vault_key = %vault_key, "migrating legacy value pair");
            Ok(SecretValueMapping::new(vault_key.clone())?.with_target_variable(env_var.clone()))
        }
        ValueEntry::Table(table) => {
            let mut mapping = SecretValueMapping::new(table.vault_key.clone())?;
            if let Some(env_var) = &table.env_var {
                mapping.set_target_variable(env_var.clone());
            }
            if let Some(secret) = &table.secret {
                mapping.set_secret(secret.clone());
            }
            Ok(mapping)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaultenv_core::GlobalDefaults;

    fn manifest(content: &str) -> Manifest {
        content.parse().unwrap()
    }

    #[test]
    fn test_manifest_settings_become_policy() {
        let manifest = manifest(
            r#"
[vault]
url = "https://vault.example.com:8200"
credential = "ci"
fail_if_not_found = false
engine_version = 1
timeout = 5
retries = 2
retry_interval_ms = 250
namespace = "team-a"
prefix_path_depth = 2

[[secrets]]
path = "kv/team/app"
values = [{ vault_key = "token" }]
"#,
        );
        let config = Configuration::from_manifest(&manifest, None, None).unwrap();
        let policy = config.policy();

        assert_eq!(policy.store_url().as_str(), "https://vault.example.com:8200/");
        assert_eq!(policy.credential_ref(), "ci");
        assert!(!policy.fail_if_not_found());
        assert_eq!(policy.engine_version(), EngineVersion::V1);
        assert_eq!(policy.timeout(), Duration::from_secs(5));
        assert_eq!(policy.retries(), 2);
        assert_eq!(policy.retry_interval(), Duration::from_millis(250));
        assert_eq!(policy.namespace(), Some("team-a"));
        assert_eq!(policy.prefix_path_depth(), 2);

        assert_eq!(config.requests().len(), 1);
        assert_eq!(config.requests()[0].engine_version(), EngineVersion::V1);
    }

    #[test]
    fn test_url_fallback_chain() {
        let manifest = manifest("[vault]\n");
        let global = GlobalConfig {
            defaults: GlobalDefaults {
                url: Some("https://global.example.com".to_string()),
                credential: Some("team".to_string()),
                credentials: Some("keyring://".to_string()),
            },
        };

        let config = Configuration::from_manifest(
            &manifest,
            Some(&global),
            Some("https://env.example.com".to_string()),
        )
        .unwrap();
        assert_eq!(config.policy().store_url().host_str(), Some("global.example.com"));
        assert_eq!(config.policy().credential_ref(), "team");
        assert_eq!(config.credential_source(), Some("keyring://"));

        let config = Configuration::from_manifest(
            &manifest,
            None,
            Some("https://env.example.com".to_string()),
        )
        .unwrap();
        assert_eq!(config.policy().store_url().host_str(), Some("env.example.com"));
        assert_eq!(config.policy().credential_ref(), DEFAULT_CREDENTIAL);
        assert_eq!(config.credential_source(), None);

        assert!(matches!(
            Configuration::from_manifest(&manifest, None, None),
            Err(VaultEnvError::NoStoreUrl)
        ));
    }

    #[test]
    fn test_legacy_pair_is_migrated() {
        let mapping =
            build_mapping(&ValueEntry::Pair("DB_PASSWORD".into(), "password".into())).unwrap();
        assert_eq!(mapping.source_key(), "password");
        assert_eq!(mapping.target_variable(), "DB_PASSWORD");
        assert!(!mapping.has_secret());
    }

    #[test]
    fn test_requests_keep_order_and_write_payloads() {
        let manifest = manifest(
            r#"
[vault]
url = "http://127.0.0.1:8200"

[[secrets]]
path = "are/existing"
values = [{ vault_key = "key1", secret = "secret1" }]

[[secrets]]
path = "kv/legacy"
engine_version = 1
values = [["LEGACY_TOKEN", "token"], { vaultKey = "other", envVar = "OTHER" }]
"#,
        );
        let config = Configuration::from_manifest(&manifest, None, None).unwrap();
        let requests = config.requests();

        assert_eq!(requests[0].path(), "are/existing");
        assert!(requests[0].is_write());
        assert_eq!(requests[0].engine_version(), EngineVersion::V2);

        assert_eq!(requests[1].engine_version(), EngineVersion::V1);
        let targets: Vec<&str> = requests[1]
            .values()
            .iter()
            .map(SecretValueMapping::target_variable)
            .collect();
        assert_eq!(targets, vec!["LEGACY_TOKEN", "OTHER"]);
    }
}
