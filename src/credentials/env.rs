use super::{AuthMaterial, CredentialProvider, material_from_vars};
use crate::{Result, VaultEnvError};
use serde::{Deserialize, Serialize};
use std::env;
use url::Url;

/// Configuration for the environment credential source. Takes no options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvConfig {}

impl TryFrom<&Url> for EnvConfig {
    type Error = VaultEnvError;

    fn try_from(url: &Url) -> std::result::Result<Self, Self::Error> {
        if url.scheme() != "env" {
            return Err(VaultEnvError::Config(format!(
                "Invalid scheme '{}' for env credential source",
                url.scheme()
            )));
        }

        Ok(Self::default())
    }
}

/// Reads auth material from the process environment.
///
/// The reference `vault` maps to `VAULT_TOKEN`, or `VAULT_ROLE_ID` with
/// `VAULT_SECRET_ID`, or `VAULT_USERNAME` with `VAULT_PASSWORD`.
pub struct EnvCredentials {
    #[allow(dead_code)]
    config: EnvConfig,
}

crate::register_credential_source! {
    struct: EnvCredentials,
    config: EnvConfig,
    name: "env",
    description: "Process environment variables (<REF>_TOKEN, <REF>_ROLE_ID, ...)",
    schemes: ["env"],
    examples: ["env://"],
}

impl EnvCredentials {
    pub fn new(config: EnvConfig) -> Self {
        Self { config }
    }
}

impl CredentialProvider for EnvCredentials {
    fn resolve(&self, credential_ref: &str) -> Result<AuthMaterial> {
        material_from_vars(credential_ref, |name| env::var(name).ok())
            .ok_or_else(|| VaultEnvError::CredentialNotFound(credential_ref.to_string()))
    }

    fn name(&self) -> &'static str {
        Self::SOURCE_NAME
    }
}
