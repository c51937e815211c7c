//! Vault HTTP API client

use super::{ReadOutcome, StoreClient, StoreSession, api_path, flatten};
use crate::credentials::AuthMaterial;
use crate::model::EngineVersion;
use crate::policy::Policy;
use crate::{Result, VaultEnvError};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::thread;
use std::time::Duration;

/// Escaped when a value is placed in a single path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'?')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Deserialize)]
struct LoginResponse {
    auth: LoginAuth,
}

#[derive(Debug, Deserialize)]
struct LoginAuth {
    client_token: String,
}

/// Production store client backed by a blocking `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct HttpStore;

impl HttpStore {
    pub fn new() -> Self {
        Self
    }
}

impl StoreClient for HttpStore {
    fn init(&self, policy: &Policy, material: &AuthMaterial) -> Result<Box<dyn StoreSession>> {
        let client = Client::builder()
            .timeout(policy.timeout())
            .danger_accept_invalid_certs(policy.skip_tls_verify())
            .build()?;

        let transport = Transport {
            client,
            base_url: policy.store_url().as_str().trim_end_matches('/').to_string(),
            namespace: policy.namespace().map(str::to_string),
            retries: policy.retries(),
            retry_interval: policy.retry_interval(),
        };

        tracing::debug!(
            url = %transport.base_url,
            method = material.method(),
            "authenticating to Vault"
        );
        let token = transport.authenticate(material).map_err(|e| match e {
            VaultEnvError::Auth(_) => e,
            other => VaultEnvError::Auth(other.to_string()),
        })?;

        Ok(Box::new(HttpSession {
            transport,
            token,
            prefix_path_depth: policy.prefix_path_depth(),
        }))
    }
}

struct Transport {
    client: Client,
    base_url: String,
    namespace: Option<String>,
    retries: u32,
    retry_interval: Duration,
}

impl Transport {
    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let mut req = self.client.request(method, self.url(path));
        if let Some(token) = token {
            req = req.header("X-Vault-Token", token);
        }
        if let Some(ns) = &self.namespace {
            req = req.header("X-Vault-Namespace", ns);
        }
        req
    }

    /// Sends the request built by `build`, retrying connection failures,
    /// timeouts and 5xx answers. The last 5xx response is returned as is.
    fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let retry_left = attempt <= self.retries;
            match build().send() {
                Ok(response) if response.status().is_server_error() && retry_left => {
                    tracing::warn!(
                        status = response.status().as_u16(),
                        attempt,
                        "Vault server error, retrying"
                    );
                }
                Ok(response) => return Ok(response),
                Err(e) if e.is_connect() || e.is_timeout() => {
                    if !retry_left {
                        return Err(VaultEnvError::Unreachable {
                            url: self.base_url.clone(),
                            attempts: attempt,
                            reason: e.to_string(),
                        });
                    }
                    tracing::warn!(attempt, error = %e, "Vault unreachable, retrying");
                }
                Err(e) => return Err(e.into()),
            }
            thread::sleep(self.retry_interval);
        }
    }

    fn authenticate(&self, material: &AuthMaterial) -> Result<String> {
        match material {
            AuthMaterial::Token(token) => {
                let response = self.send(|| {
                    self.request(reqwest::Method::GET, "auth/token/lookup-self", Some(token.as_str()))
                })?;
                check_login(response, "token")?;
                Ok(token.clone())
            }
            AuthMaterial::AppRole {
                role_id,
                secret_id,
                mount,
            } => {
                let path = format!("auth/{}/login", mount.as_deref().unwrap_or("approle"));
                let body = json!({ "role_id": role_id, "secret_id": secret_id });
                self.login(&path, &body, "approle")
            }
            AuthMaterial::UserPass {
                username,
                password,
                mount,
            } => {
                let path = format!(
                    "auth/{}/login/{}",
                    mount.as_deref().unwrap_or("userpass"),
                    utf8_percent_encode(username, SEGMENT)
                );
                let body = json!({ "password": password });
                self.login(&path, &body, "userpass")
            }
            AuthMaterial::Kubernetes { role, jwt, mount } => {
                let path = format!("auth/{}/login", mount.as_deref().unwrap_or("kubernetes"));
                let body = json!({ "role": role, "jwt": jwt });
                self.login(&path, &body, "kubernetes")
            }
        }
    }

    fn login(&self, path: &str, body: &Value, method: &str) -> Result<String> {
        let response = self.send(|| self.request(reqwest::Method::POST, path, None).json(body))?;
        let response = check_login(response, method)?;
        let login: LoginResponse = response.json()?;
        Ok(login.auth.client_token)
    }
}

fn check_login(response: Response, method: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(VaultEnvError::Auth(format!(
        "{} login rejected with status {}",
        method,
        status.as_u16()
    )))
}

struct HttpSession {
    transport: Transport,
    token: String,
    prefix_path_depth: usize,
}

impl HttpSession {
    fn store_error(path: &str, response: Response) -> VaultEnvError {
        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        VaultEnvError::Store {
            path: path.to_string(),
            status,
            body,
        }
    }
}

impl StoreSession for HttpSession {
    fn read(&self, path: &str, engine_version: EngineVersion) -> Result<ReadOutcome> {
        let api = api_path(path, engine_version, self.prefix_path_depth);
        tracing::debug!(path, api = %api, engine_version = engine_version.as_u8(), "reading secret");

        let response = self.transport.send(|| {
            self.transport
                .request(reqwest::Method::GET, &api, Some(self.token.as_str()))
        })?;

        let status = response.status();
        tracing::debug!(path, status = status.as_u16(), "read finished");
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(ReadOutcome::NotFound);
        }
        if !status.is_success() {
            return Err(Self::store_error(path, response));
        }

        let text = response.text()?;
        let data = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|mut body| match engine_version {
                EngineVersion::V1 => body.get_mut("data").map(Value::take),
                EngineVersion::V2 => body
                    .get_mut("data")
                    .and_then(|data| data.get_mut("data"))
                    .map(Value::take),
            });

        match data {
            Some(Value::Object(map)) => Ok(ReadOutcome::Found(flatten(map))),
            _ => {
                tracing::debug!(path, "response has no secret data envelope");
                Err(VaultEnvError::Store {
                    path: path.to_string(),
                    status: status.as_u16(),
                    body: text,
                })
            }
        }
    }

    fn write(
        &self,
        path: &str,
        data: &HashMap<String, String>,
        engine_version: EngineVersion,
    ) -> Result<()> {
        let api = api_path(path, engine_version, self.prefix_path_depth);
        tracing::debug!(path, api = %api, keys = data.len(), "writing secret");

        let body = match engine_version {
            EngineVersion::V1 => json!(data),
            EngineVersion::V2 => json!({ "data": data }),
        };
        let response = self.transport.send(|| {
            self.transport
                .request(reqwest::Method::POST, &api, Some(self.token.as_str()))
                .json(&body)
        })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::store_error(path, response))
        }
    }
}
