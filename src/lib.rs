//! vaultenv - inject HashiCorp Vault secrets into a build step's environment
//!
//! A run reads a list of secret requests (a Vault path plus the keys to
//! export), authenticates once, fetches every path in order and returns the
//! resulting environment variables. Requests may also carry values, in
//! which case they are written to Vault instead.
//!
//! # Features
//!
//! - **KV v1 and v2**: both engines are normalized to flat key/value maps
//! - **Fail-fast or best-effort**: missing secrets either abort the run or
//!   are logged and skipped
//! - **Credential sources**: environment, `.env` files, TOML files, keyring
//! - **Auth methods**: token, AppRole, userpass, Kubernetes
//!
//! # Example
//!
//! ```ignore
//! use vaultenv::{EnvContext, HttpStore, Policy, Resolver, SecretRequest, SecretValueMapping};
//! use vaultenv::credentials::CredentialProvider;
//!
//! let policy = Policy::new("https://vault.example.com:8200", "ci")?;
//! let credentials = Box::<dyn CredentialProvider>::try_from("env://")?;
//! let resolver = Resolver::new(policy, Box::new(HttpStore::new()), credentials);
//!
//! let requests = vec![SecretRequest::new(
//!     "secret/app/db",
//!     vec![SecretValueMapping::new("password")?.with_target_variable("DB_PASSWORD")],
//! )?];
//!
//! let mut log: Vec<String> = Vec::new();
//! let env = resolver.resolve(&requests, &EnvContext::from_process(), &mut log)?;
//! println!("resolved {} variable(s)", env.len());
//! ```

mod app;
mod config;
mod context;
mod error;
mod model;
mod policy;
mod resolver;
mod sink;

pub mod credentials;
pub mod store;

#[cfg(feature = "cli")]
pub mod cli;

pub use app::VaultEnv;
pub use config::{Configuration, DEFAULT_CREDENTIAL, build_mapping, build_policy, build_requests};
pub use context::{EnvContext, ExecutionContext};
pub use error::{Result, VaultEnvError};
pub use model::{
    EngineVersion, MissedValue, ResolvedEnvironment, SecretRequest, SecretValueMapping,
};
pub use policy::Policy;
pub use resolver::{CancelFlag, Resolver};
pub use sink::{LogSink, TracingSink, WriterSink};
pub use store::{HttpStore, MemoryStore, ReadOutcome, StoreCall, StoreClient, StoreSession};

#[doc(hidden)]
pub use vaultenv_core::{GlobalConfig, GlobalDefaults, Manifest};
