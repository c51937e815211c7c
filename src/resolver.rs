//! # Resolution engine
//!
//! Turns a batch of [`SecretRequest`]s into a [`ResolvedEnvironment`].
//!
//! A run authenticates once, then walks the requests in declaration order.
//! Missing secrets and store errors are reported to the [`LogSink`] as they
//! happen; the policy decides whether the run stops there or carries on
//! without the affected variables.

use crate::context::{ExecutionContext, Layered};
use crate::credentials::CredentialProvider;
use crate::model::{ResolvedEnvironment, SecretRequest};
use crate::policy::Policy;
use crate::sink::LogSink;
use crate::store::{ReadOutcome, StoreClient, StoreSession};
use crate::{Result, VaultEnvError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation shared between a run and its caller.
///
/// Checked between requests. Variables resolved before the flag was raised
/// stay in the returned environment.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Resolver {
    policy: Policy,
    store: Box<dyn StoreClient>,
    credentials: Box<dyn CredentialProvider>,
    cancel: Option<CancelFlag>,
}

impl Resolver {
    pub fn new(
        policy: Policy,
        store: Box<dyn StoreClient>,
        credentials: Box<dyn CredentialProvider>,
    ) -> Self {
        Self {
            policy,
            store,
            credentials,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Resolves `requests` in order.
    ///
    /// Each call opens its own session, so concurrent runs never share
    /// authentication state.
    ///
    /// # Errors
    ///
    /// - `CredentialNotFound` before the store is contacted
    /// - `Auth` when the store rejects the credentials
    /// - `SecretNotFound` or `Store` for the first failure when the policy
    ///   fails on missing secrets; the same message has already been written
    ///   to `sink`
    /// - `Unreachable` when the store stops answering mid-run
    pub fn resolve(
        &self,
        requests: &[SecretRequest],
        ctx: &dyn ExecutionContext,
        sink: &mut dyn LogSink,
    ) -> Result<ResolvedEnvironment> {
        let material = self.credentials.resolve(self.policy.credential_ref())?;
        let session = self.store.init(&self.policy, &material)?;
        tracing::debug!(
            requests = requests.len(),
            method = material.method(),
            "session opened"
        );

        let mut env = ResolvedEnvironment::new();
        for (index, request) in requests.iter().enumerate() {
            if self.is_cancelled() {
                let line = format!(
                    "Secret resolution cancelled, skipped {} of {} request(s)",
                    requests.len() - index,
                    requests.len()
                );
                tracing::warn!("{}", line);
                sink.write_line(&line);
                env.mark_interrupted();
                return Ok(env);
            }

            let path = Layered {
                resolved: env.as_map(),
                base: ctx,
            }
            .expand(request.path());
            tracing::debug!(
                path = %path,
                engine_version = request.engine_version().as_u8(),
                write = request.is_write(),
                "processing secret request"
            );

            if request.is_write() {
                self.write(session.as_ref(), request, &path, sink)?;
            } else {
                self.read(session.as_ref(), index, request, &path, &mut env, sink)?;
            }
        }

        Ok(env)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }

    fn read(
        &self,
        session: &dyn StoreSession,
        index: usize,
        request: &SecretRequest,
        path: &str,
        env: &mut ResolvedEnvironment,
        sink: &mut dyn LogSink,
    ) -> Result<()> {
        let data = match session.read(path, request.engine_version()) {
            Ok(ReadOutcome::Found(data)) => data,
            Ok(ReadOutcome::NotFound) => {
                env.record_miss(index, None);
                return self.handle(
                    VaultEnvError::SecretNotFound {
                        path: path.to_string(),
                        key: None,
                    },
                    sink,
                );
            }
            Err(err) => {
                env.record_miss(index, None);
                return self.handle(err, sink);
            }
        };

        for mapping in request.values() {
            match data.get(mapping.source_key()) {
                Some(value) => {
                    env.insert(mapping.target_variable(), value.clone());
                }
                None => {
                    env.record_miss(index, Some(mapping.source_key().to_string()));
                    self.handle(
                        VaultEnvError::SecretNotFound {
                            path: path.to_string(),
                            key: Some(mapping.source_key().to_string()),
                        },
                        sink,
                    )?
                }
            }
        }
        Ok(())
    }

    fn write(
        &self,
        session: &dyn StoreSession,
        request: &SecretRequest,
        path: &str,
        sink: &mut dyn LogSink,
    ) -> Result<()> {
        let payload = request.write_payload();
        match session.write(path, &payload, request.engine_version()) {
            Ok(()) => Ok(()),
            Err(err) => self.handle(err, sink),
        }
    }

    /// Applies the policy to a failure. Conditional failures are reported
    /// exactly once, then either swallowed or returned.
    fn handle(&self, err: VaultEnvError, sink: &mut dyn LogSink) -> Result<()> {
        if !err.is_conditional() {
            return Err(err);
        }

        let line = err.to_string();
        match &err {
            VaultEnvError::SecretNotFound { path, key } => {
                tracing::warn!(path = %path, key = ?key, "{}", line);
            }
            _ => tracing::warn!("{}", line),
        }
        sink.write_line(&line);

        if self.policy.fail_if_not_found() {
            Err(err)
        } else {
            Ok(())
        }
    }
}
