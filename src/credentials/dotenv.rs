use super::{AuthMaterial, CredentialProvider, location_from_url, material_from_vars};
use crate::{Result, VaultEnvError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use url::Url;

/// Configuration for the `.env` credential source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DotEnvConfig {
    /// Defaults to `.env` in the working directory.
    pub path: PathBuf,
}

impl Default for DotEnvConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".env"),
        }
    }
}

impl TryFrom<&Url> for DotEnvConfig {
    type Error = VaultEnvError;

    fn try_from(url: &Url) -> std::result::Result<Self, Self::Error> {
        if url.scheme() != "dotenv" {
            return Err(VaultEnvError::Config(format!(
                "Invalid scheme '{}' for dotenv credential source",
                url.scheme()
            )));
        }

        Ok(match location_from_url(url) {
            Some(path) => Self {
                path: PathBuf::from(path),
            },
            None => Self::default(),
        })
    }
}

/// Reads `<REF>_TOKEN` style variables from a `.env` file.
///
/// A missing file holds no credentials.
pub struct DotEnvCredentials {
    config: DotEnvConfig,
}

crate::register_credential_source! {
    struct: DotEnvCredentials,
    config: DotEnvConfig,
    name: "dotenv",
    description: "Variables from a .env file",
    schemes: ["dotenv"],
    examples: ["dotenv:.env.ci", "dotenv:/etc/vaultenv/ci.env"],
}

impl DotEnvCredentials {
    pub fn new(config: DotEnvConfig) -> Self {
        Self { config }
    }

    fn load_vars(&self) -> Result<HashMap<String, String>> {
        if !self.config.path.exists() {
            tracing::debug!(path = %self.config.path.display(), "dotenv file missing");
            return Ok(HashMap::new());
        }

        let mut vars = HashMap::new();
        for item in dotenvy::from_path_iter(&self.config.path)? {
            let (key, value) = item?;
            vars.insert(key, value);
        }
        Ok(vars)
    }
}

impl CredentialProvider for DotEnvCredentials {
    fn resolve(&self, credential_ref: &str) -> Result<AuthMaterial> {
        let vars = self.load_vars()?;
        material_from_vars(credential_ref, |name| vars.get(name).cloned())
            .ok_or_else(|| VaultEnvError::CredentialNotFound(credential_ref.to_string()))
    }

    fn name(&self) -> &'static str {
        Self::SOURCE_NAME
    }
}
