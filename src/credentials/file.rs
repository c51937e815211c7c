use super::{AuthMaterial, CredentialProvider, location_from_url};
use crate::{Result, VaultEnvError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Configuration for the TOML credentials file source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub path: PathBuf,
}

impl TryFrom<&Url> for FileConfig {
    type Error = VaultEnvError;

    fn try_from(url: &Url) -> std::result::Result<Self, Self::Error> {
        if url.scheme() != "toml" {
            return Err(VaultEnvError::Config(format!(
                "Invalid scheme '{}' for toml credential source",
                url.scheme()
            )));
        }

        let path = location_from_url(url).ok_or_else(|| {
            VaultEnvError::Config(
                "toml credential source needs a path, e.g. toml:credentials.toml".to_string(),
            )
        })?;

        Ok(Self {
            path: PathBuf::from(path),
        })
    }
}

/// One named entry of a credentials file.
///
/// ```toml
/// [ci]
/// type = "approle"
/// role_id = "b1a7..."
/// secret_id = "6c0e..."
///
/// [deploy]
/// type = "kubernetes"
/// role = "deployer"
/// jwt_path = "/var/run/secrets/kubernetes.io/serviceaccount/token"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum CredentialEntry {
    Token {
        token: String,
    },
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
        jwt_path: PathBuf,
        mount: Option<String>,
    },
}

impl CredentialEntry {
    fn into_material(self, base_dir: &Path) -> Result<AuthMaterial> {
        Ok(match self {
            CredentialEntry::Token { token } => AuthMaterial::Token(token),
            CredentialEntry::AppRole {
                role_id,
                secret_id,
                mount,
            } => AuthMaterial::AppRole {
                role_id,
                secret_id,
                mount,
            },
            CredentialEntry::UserPass {
                username,
                password,
                mount,
            } => AuthMaterial::UserPass {
                username,
                password,
                mount,
            },
            CredentialEntry::Kubernetes {
                role,
                jwt_path,
                mount,
            } => {
                let jwt_path = if jwt_path.is_relative() {
                    base_dir.join(jwt_path)
                } else {
                    jwt_path
                };
                let jwt = fs::read_to_string(&jwt_path)?.trim().to_string();
                AuthMaterial::Kubernetes { role, jwt, mount }
            }
        })
    }
}

/// Reads named credentials from a TOML file.
///
/// Relative `jwt_path` values are resolved against the file's directory.
pub struct FileCredentials {
    config: FileConfig,
}

crate::register_credential_source! {
    struct: FileCredentials,
    config: FileConfig,
    name: "toml",
    description: "Named credentials in a TOML file",
    schemes: ["toml"],
    examples: ["toml:credentials.toml", "toml:/etc/vaultenv/credentials.toml"],
}

impl FileCredentials {
    pub fn new(config: FileConfig) -> Self {
        Self { config }
    }

    fn load_entries(&self) -> Result<HashMap<String, CredentialEntry>> {
        let content = fs::read_to_string(&self.config.path)?;
        Ok(toml::from_str(&content)?)
    }
}

impl CredentialProvider for FileCredentials {
    fn resolve(&self, credential_ref: &str) -> Result<AuthMaterial> {
        let mut entries = self.load_entries()?;
        let entry = entries
            .remove(credential_ref)
            .ok_or_else(|| VaultEnvError::CredentialNotFound(credential_ref.to_string()))?;

        let base_dir = self
            .config
            .path
            .parent()
            .unwrap_or_else(|| Path::new("."));
        entry.into_material(base_dir)
    }

    fn name(&self) -> &'static str {
        Self::SOURCE_NAME
    }
}
