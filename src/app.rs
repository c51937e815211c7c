//! Command-level operations behind the `vaultenv` binary

use crate::config::{Configuration, load_global_config};
use crate::context::EnvContext;
use crate::credentials::CredentialProvider;
use crate::model::{EngineVersion, ResolvedEnvironment, SecretRequest, SecretValueMapping};
use crate::policy::Policy;
use crate::resolver::Resolver;
use crate::sink::WriterSink;
use crate::store::{HttpStore, ReadOutcome, StoreClient};
use crate::{Result, VaultEnvError};
use colored::Colorize;
use std::collections::HashMap;
use std::env;
use std::io;
use std::path::Path;
use std::process::Command;
use vaultenv_core::Manifest;

/// Credential source used when neither the command line nor the global
/// configuration names one.
pub const DEFAULT_CREDENTIAL_SOURCE: &str = "env://";

/// A loaded manifest plus the credential source to authenticate with.
pub struct VaultEnv {
    config: Configuration,
    credential_source: String,
}

impl VaultEnv {
    pub fn new(config: Configuration, credentials_arg: Option<String>) -> Self {
        let credential_source = credentials_arg
            .or_else(|| config.credential_source().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_CREDENTIAL_SOURCE.to_string());
        Self {
            config,
            credential_source,
        }
    }

    /// Loads `manifest_path`; a missing manifest is an error.
    pub fn load(manifest_path: &Path, credentials_arg: Option<String>) -> Result<Self> {
        let config = Configuration::load(manifest_path)?;
        Ok(Self::new(config, credentials_arg))
    }

    /// Loads `manifest_path` if it exists, otherwise connects using the
    /// global configuration and `VAULT_ADDR` alone.
    pub fn load_or_default(manifest_path: &Path, credentials_arg: Option<String>) -> Result<Self> {
        if manifest_path.exists() {
            return Self::load(manifest_path, credentials_arg);
        }
        let global = load_global_config()?;
        let config = Configuration::from_manifest(
            &Manifest::default(),
            global.as_ref(),
            env::var("VAULT_ADDR").ok(),
        )?;
        Ok(Self::new(config, credentials_arg))
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn credential_source(&self) -> &str {
        &self.credential_source
    }

    fn credentials(&self) -> Result<Box<dyn CredentialProvider>> {
        Box::<dyn CredentialProvider>::try_from(self.credential_source.as_str())
    }

    fn resolver(&self, policy: Policy) -> Result<Resolver> {
        Ok(Resolver::new(
            policy,
            Box::new(HttpStore::new()),
            self.credentials()?,
        ))
    }

    /// Resolves every request, reporting failures to stderr.
    pub fn resolve(&self) -> Result<ResolvedEnvironment> {
        let resolver = self.resolver(self.config.policy().clone())?;
        let mut sink = WriterSink::new(io::stderr());
        resolver.resolve(
            self.config.requests(),
            &EnvContext::from_process(),
            &mut sink,
        )
    }

    /// Reads every requested secret without failing fast and prints what
    /// was found. Write requests are listed but not sent.
    pub fn check(&self) -> Result<()> {
        let policy = self.config.policy();
        println!(
            "Checking secrets against {} (credential '{}' via {})...\n",
            policy.store_url().as_str().blue(),
            policy.credential_ref().cyan(),
            self.credential_source.cyan()
        );

        let reads: Vec<SecretRequest> = self
            .config
            .requests()
            .iter()
            .filter(|request| !request.is_write())
            .cloned()
            .collect();

        let resolver = self.resolver(policy.clone().with_fail_if_not_found(false))?;
        let mut failures: Vec<String> = Vec::new();
        let env = resolver.resolve(&reads, &EnvContext::from_process(), &mut failures)?;

        let mut found = 0;
        let mut missing = 0;
        let mut read_index = 0;
        for request in self.config.requests() {
            println!(
                "{} {}",
                request.path().bold(),
                format!("(kv v{})", request.engine_version()).dimmed()
            );

            if request.is_write() {
                for mapping in request.values().iter().filter(|m| m.has_secret()) {
                    println!(
                        "  {} {} {}",
                        "→".blue(),
                        mapping.source_key(),
                        "(write, skipped)".blue()
                    );
                }
                continue;
            }

            let index = read_index;
            read_index += 1;
            for mapping in request.values() {
                if env.is_missed(index, mapping.source_key()) {
                    println!(
                        "  {} {} ← {} {}",
                        "✗".red(),
                        mapping.target_variable(),
                        mapping.source_key(),
                        "(not found)".red()
                    );
                    missing += 1;
                } else {
                    println!(
                        "  {} {} ← {}",
                        "✓".green(),
                        mapping.target_variable(),
                        mapping.source_key()
                    );
                    found += 1;
                }
            }
        }

        for line in &failures {
            println!("{} {}", "!".yellow(), line);
        }

        println!(
            "\nSummary: {} found, {} missing",
            found.to_string().green(),
            missing.to_string().red()
        );

        if missing > 0 && policy.fail_if_not_found() {
            return Err(VaultEnvError::Validation(format!(
                "{} secret value(s) missing",
                missing
            )));
        }
        Ok(())
    }

    /// Resolves the manifest, then runs `command` with the secrets added to
    /// the current environment. Exits with the command's status code.
    pub fn run(&self, command: Vec<String>) -> Result<()> {
        if command.is_empty() {
            return Err(VaultEnvError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "No command specified. Usage: vaultenv run -- <command> [args...]",
            )));
        }

        let resolved = self.resolve()?;
        tracing::debug!(variables = resolved.len(), command = %command[0], "starting command");

        let mut env_vars = env::vars().collect::<HashMap<_, _>>();
        env_vars.extend(resolved);

        let mut cmd = Command::new(&command[0]);
        cmd.args(&command[1..]);
        cmd.envs(&env_vars);

        let status = cmd.status()?;
        std::process::exit(status.code().unwrap_or(1));
    }

    /// Reads a single key and returns its value.
    pub fn get(&self, path: &str, key: &str, engine_version: Option<u8>) -> Result<String> {
        let policy = self.config.policy();
        let engine_version = match engine_version {
            Some(version) => EngineVersion::try_from(version)?,
            None => policy.engine_version(),
        };

        let material = self.credentials()?.resolve(policy.credential_ref())?;
        let session = HttpStore::new().init(policy, &material)?;
        match session.read(path, engine_version)? {
            ReadOutcome::Found(mut data) => data.remove(key).ok_or_else(|| {
                VaultEnvError::SecretNotFound {
                    path: path.to_string(),
                    key: Some(key.to_string()),
                }
            }),
            ReadOutcome::NotFound => Err(VaultEnvError::SecretNotFound {
                path: path.to_string(),
                key: None,
            }),
        }
    }

    /// Writes `pairs` to `path` as one write request. The whole secret at
    /// that path is replaced.
    pub fn write(
        &self,
        path: &str,
        pairs: Vec<(String, String)>,
        engine_version: Option<u8>,
    ) -> Result<()> {
        let policy = self.config.policy().clone().with_fail_if_not_found(true);
        let engine_version = match engine_version {
            Some(version) => EngineVersion::try_from(version)?,
            None => policy.engine_version(),
        };

        let values = pairs
            .into_iter()
            .map(|(key, value)| -> Result<SecretValueMapping> {
                Ok(SecretValueMapping::new(key)?.with_secret(value))
            })
            .collect::<Result<Vec<_>>>()?;
        let count = values.len();
        let request = SecretRequest::new(path, values)?.with_engine_version(engine_version);

        let resolver = self.resolver(policy)?;
        let mut sink = WriterSink::new(io::stderr());
        resolver.resolve(&[request], &EnvContext::from_process(), &mut sink)?;

        println!("{} Wrote {} key(s) to {}", "✓".green(), count, path);
        Ok(())
    }
}
