use super::{AuthMaterial, CredentialProvider};
use crate::{Result, VaultEnvError};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use url::Url;

/// Configuration for the keyring credential source. Takes no options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyringConfig {}

impl TryFrom<&Url> for KeyringConfig {
    type Error = VaultEnvError;

    fn try_from(url: &Url) -> std::result::Result<Self, Self::Error> {
        if url.scheme() != "keyring" {
            return Err(VaultEnvError::Config(format!(
                "Invalid scheme '{}' for keyring credential source",
                url.scheme()
            )));
        }

        Ok(Self::default())
    }
}

/// Vault tokens kept in the system keychain.
///
/// Entries live under the service `vaultenv/{credential_ref}` with the
/// current system user as account.
pub struct KeyringCredentials {
    _config: KeyringConfig,
}

crate::register_credential_source! {
    struct: KeyringCredentials,
    config: KeyringConfig,
    name: "keyring",
    description: "Tokens in the system keychain (see `vaultenv login`)",
    schemes: ["keyring"],
    examples: ["keyring://"],
}

impl KeyringCredentials {
    pub fn new(config: KeyringConfig) -> Self {
        Self { _config: config }
    }

    fn entry(credential_ref: &str) -> Result<Entry> {
        let service = format!("vaultenv/{}", credential_ref);
        Ok(Entry::new(&service, &whoami::username())?)
    }
}

impl CredentialProvider for KeyringCredentials {
    fn resolve(&self, credential_ref: &str) -> Result<AuthMaterial> {
        match Self::entry(credential_ref)?.get_password() {
            Ok(token) => Ok(AuthMaterial::Token(token)),
            Err(keyring::Error::NoEntry) => {
                Err(VaultEnvError::CredentialNotFound(credential_ref.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Only tokens can be stored.
    fn store(&self, credential_ref: &str, material: &AuthMaterial) -> Result<()> {
        match material {
            AuthMaterial::Token(token) => {
                Self::entry(credential_ref)?.set_password(token)?;
                Ok(())
            }
            other => Err(VaultEnvError::Config(format!(
                "The keyring only stores tokens, got {} material",
                other.method()
            ))),
        }
    }

    fn allows_store(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        Self::SOURCE_NAME
    }
}
