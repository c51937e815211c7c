use super::*;
use crate::VaultEnvError;
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use std::time::Duration;

fn policy(server: &ServerGuard) -> Policy {
    Policy::new(&server.url(), "vault")
        .unwrap()
        .with_retries(0, Duration::from_millis(1))
}

fn token() -> AuthMaterial {
    AuthMaterial::Token("s.test-token".to_string())
}

fn mock_lookup_self(server: &mut ServerGuard) -> mockito::Mock {
    server
        .mock("GET", "/v1/auth/token/lookup-self")
        .match_header("x-vault-token", "s.test-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data":{"id":"s.test-token"}}"#)
        .create()
}

#[test]
fn test_api_path_mapping() {
    assert_eq!(api_path("secret/app", EngineVersion::V1, 1), "secret/app");
    assert_eq!(api_path("secret/app", EngineVersion::V2, 1), "secret/data/app");
    assert_eq!(
        api_path("/kv/team/app/db/", EngineVersion::V2, 2),
        "kv/team/data/app/db"
    );
    assert_eq!(api_path("secret", EngineVersion::V2, 1), "secret/data");
    assert_eq!(api_path("a/b", EngineVersion::V2, 5), "a/b/data");
}

#[test]
fn test_flatten_renders_non_strings_as_json() {
    let data = json!({ "user": "admin", "port": 5432, "tls": true, "tags": ["a", "b"] });
    let flat = flatten(data.as_object().cloned().unwrap());
    assert_eq!(flat["user"], "admin");
    assert_eq!(flat["port"], "5432");
    assert_eq!(flat["tls"], "true");
    assert_eq!(flat["tags"], r#"["a","b"]"#);
}

#[test]
fn test_http_read_v2_unwraps_envelope() {
    let mut server = Server::new();
    let lookup = mock_lookup_self(&mut server);
    let read = server
        .mock("GET", "/v1/secret/data/app")
        .match_header("x-vault-token", "s.test-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"data":{"data":{"username":"admin","password":"hunter2"},"metadata":{"version":3}}}"#,
        )
        .create();

    let session = HttpStore::new().init(&policy(&server), &token()).unwrap();
    let outcome = session.read("secret/app", EngineVersion::V2).unwrap();

    let expected: HashMap<String, String> = [("username", "admin"), ("password", "hunter2")]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    assert_eq!(outcome, ReadOutcome::Found(expected));
    lookup.assert();
    read.assert();
}

#[test]
fn test_http_read_v1_flat() {
    let mut server = Server::new();
    let _lookup = mock_lookup_self(&mut server);
    let _read = server
        .mock("GET", "/v1/kv/app")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data":{"api_key":"abc"}}"#)
        .create();

    let session = HttpStore::new().init(&policy(&server), &token()).unwrap();
    match session.read("kv/app", EngineVersion::V1).unwrap() {
        ReadOutcome::Found(data) => assert_eq!(data["api_key"], "abc"),
        ReadOutcome::NotFound => panic!("expected a secret"),
    }
}

#[test]
fn test_http_read_missing_path() {
    let mut server = Server::new();
    let _lookup = mock_lookup_self(&mut server);
    let _read = server
        .mock("GET", "/v1/not/data/existing")
        .with_status(404)
        .with_body(r#"{"errors":[]}"#)
        .create();

    let session = HttpStore::new().init(&policy(&server), &token()).unwrap();
    assert_eq!(
        session.read("not/existing", EngineVersion::V2).unwrap(),
        ReadOutcome::NotFound
    );
}

#[test]
fn test_http_read_error_status() {
    let mut server = Server::new();
    let _lookup = mock_lookup_self(&mut server);
    let _read = server
        .mock("GET", "/v1/secret/data/locked")
        .with_status(403)
        .with_body(r#"{"errors":["permission denied"]}"#)
        .create();

    let session = HttpStore::new().init(&policy(&server), &token()).unwrap();
    match session.read("secret/locked", EngineVersion::V2) {
        Err(VaultEnvError::Store { path, status, body }) => {
            assert_eq!(path, "secret/locked");
            assert_eq!(status, 403);
            assert!(body.contains("permission denied"));
        }
        other => panic!("expected a store error, got {:?}", other),
    }
}

#[test]
fn test_http_read_undecodable_body_is_store_error() {
    let mut server = Server::new();
    let _lookup = mock_lookup_self(&mut server);
    let _read = server
        .mock("GET", "/v1/secret/data/broken")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html>proxy</html>")
        .create();

    let session = HttpStore::new().init(&policy(&server), &token()).unwrap();
    match session.read("secret/broken", EngineVersion::V2) {
        Err(VaultEnvError::Store { path, status, body }) => {
            assert_eq!(path, "secret/broken");
            assert_eq!(status, 200);
            assert_eq!(body, "<html>proxy</html>");
        }
        other => panic!("expected a store error, got {:?}", other),
    }
}

#[test]
fn test_http_read_without_envelope_is_store_error() {
    let mut server = Server::new();
    let _lookup = mock_lookup_self(&mut server);
    let _read = server
        .mock("GET", "/v1/secret/data/odd")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data":{"metadata":{"version":2}}}"#)
        .create();

    let session = HttpStore::new().init(&policy(&server), &token()).unwrap();
    let err = session.read("secret/odd", EngineVersion::V2).unwrap_err();
    assert!(matches!(err, VaultEnvError::Store { status: 200, .. }));
    assert!(err.is_conditional());
}

#[test]
fn test_http_retries_server_errors() {
    let mut server = Server::new();
    let _lookup = mock_lookup_self(&mut server);
    let read = server
        .mock("GET", "/v1/secret/data/flaky")
        .with_status(503)
        .expect(3)
        .create();

    let policy = policy(&server).with_retries(2, Duration::from_millis(1));
    let session = HttpStore::new().init(&policy, &token()).unwrap();
    let err = session.read("secret/flaky", EngineVersion::V2).unwrap_err();

    assert!(matches!(err, VaultEnvError::Store { status: 503, .. }));
    read.assert();
}

#[test]
fn test_http_write_v2_wraps_envelope() {
    let mut server = Server::new();
    let _lookup = mock_lookup_self(&mut server);
    let write = server
        .mock("POST", "/v1/are/data/existing")
        .match_header("x-vault-token", "s.test-token")
        .match_body(Matcher::Json(json!({ "data": { "key1": "secret1" } })))
        .with_status(200)
        .with_body(r#"{"data":{"version":1}}"#)
        .create();

    let session = HttpStore::new().init(&policy(&server), &token()).unwrap();
    let data: HashMap<String, String> = [("key1".to_string(), "secret1".to_string())].into();
    session
        .write("are/existing", &data, EngineVersion::V2)
        .unwrap();
    write.assert();
}

#[test]
fn test_http_write_v1_and_failure() {
    let mut server = Server::new();
    let _lookup = mock_lookup_self(&mut server);
    let _ok = server
        .mock("POST", "/v1/kv/app")
        .match_body(Matcher::Json(json!({ "key1": "secret1" })))
        .with_status(204)
        .create();
    let _denied = server
        .mock("POST", "/v1/kv/readonly")
        .with_status(403)
        .create();

    let session = HttpStore::new().init(&policy(&server), &token()).unwrap();
    let data: HashMap<String, String> = [("key1".to_string(), "secret1".to_string())].into();
    session.write("kv/app", &data, EngineVersion::V1).unwrap();
    assert!(matches!(
        session.write("kv/readonly", &data, EngineVersion::V1),
        Err(VaultEnvError::Store { status: 403, .. })
    ));
}

#[test]
fn test_http_approle_login() {
    let mut server = Server::new();
    let login = server
        .mock("POST", "/v1/auth/approle-ci/login")
        .match_body(Matcher::Json(
            json!({ "role_id": "role-1", "secret_id": "secret-1" }),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"auth":{"client_token":"s.from-approle","lease_duration":3600}}"#)
        .create();
    let read = server
        .mock("GET", "/v1/secret/data/app")
        .match_header("x-vault-token", "s.from-approle")
        .with_status(200)
        .with_body(r#"{"data":{"data":{"k":"v"}}}"#)
        .create();

    let material = AuthMaterial::AppRole {
        role_id: "role-1".to_string(),
        secret_id: "secret-1".to_string(),
        mount: Some("approle-ci".to_string()),
    };
    let session = HttpStore::new().init(&policy(&server), &material).unwrap();
    session.read("secret/app", EngineVersion::V2).unwrap();

    login.assert();
    read.assert();
}

#[test]
fn test_http_userpass_login_uses_username_in_path() {
    let mut server = Server::new();
    let login = server
        .mock("POST", "/v1/auth/userpass/login/alice")
        .match_body(Matcher::Json(json!({ "password": "pw" })))
        .with_status(200)
        .with_body(r#"{"auth":{"client_token":"s.alice"}}"#)
        .create();

    let material = AuthMaterial::UserPass {
        username: "alice".to_string(),
        password: "pw".to_string(),
        mount: None,
    };
    HttpStore::new().init(&policy(&server), &material).unwrap();
    login.assert();
}

#[test]
fn test_http_userpass_username_is_escaped() {
    let mut server = Server::new();
    let login = server
        .mock("POST", "/v1/auth/userpass/login/ci%2Fbot%3Fx=1")
        .with_status(200)
        .with_body(r#"{"auth":{"client_token":"s.bot"}}"#)
        .create();

    let material = AuthMaterial::UserPass {
        username: "ci/bot?x=1".to_string(),
        password: "pw".to_string(),
        mount: None,
    };
    HttpStore::new().init(&policy(&server), &material).unwrap();
    login.assert();
}

#[test]
fn test_http_kubernetes_login() {
    let mut server = Server::new();
    let login = server
        .mock("POST", "/v1/auth/kubernetes/login")
        .match_body(Matcher::Json(json!({ "role": "deployer", "jwt": "header.payload.sig" })))
        .with_status(200)
        .with_body(r#"{"auth":{"client_token":"s.k8s"}}"#)
        .create();

    let material = AuthMaterial::Kubernetes {
        role: "deployer".to_string(),
        jwt: "header.payload.sig".to_string(),
        mount: None,
    };
    HttpStore::new().init(&policy(&server), &material).unwrap();
    login.assert();
}

#[test]
fn test_http_rejected_token() {
    let mut server = Server::new();
    let _lookup = server
        .mock("GET", "/v1/auth/token/lookup-self")
        .with_status(403)
        .with_body(r#"{"errors":["permission denied"]}"#)
        .create();

    let result = HttpStore::new().init(&policy(&server), &token());
    assert!(matches!(result, Err(VaultEnvError::Auth(_))));
}

#[test]
fn test_http_unreachable_store_is_auth_failure() {
    let policy = Policy::new("http://127.0.0.1:1", "vault")
        .unwrap()
        .with_retries(1, Duration::from_millis(1))
        .with_timeout(Duration::from_secs(2));

    match HttpStore::new().init(&policy, &token()) {
        Err(VaultEnvError::Auth(message)) => assert!(message.contains("2 attempt")),
        Err(other) => panic!("expected an auth error, got {}", other),
        Ok(_) => panic!("expected an auth error"),
    }
}

#[test]
fn test_http_namespace_header() {
    let mut server = Server::new();
    let lookup = server
        .mock("GET", "/v1/auth/token/lookup-self")
        .match_header("x-vault-namespace", "team-a")
        .with_status(200)
        .with_body("{}")
        .create();
    let read = server
        .mock("GET", "/v1/secret/data/app")
        .match_header("x-vault-namespace", "team-a")
        .with_status(200)
        .with_body(r#"{"data":{"data":{}}}"#)
        .create();

    let policy = policy(&server).with_namespace("team-a");
    let session = HttpStore::new().init(&policy, &token()).unwrap();
    assert_eq!(
        session.read("secret/app", EngineVersion::V2).unwrap(),
        ReadOutcome::Found(HashMap::new())
    );
    lookup.assert();
    read.assert();
}

#[test]
fn test_memory_store_records_calls() {
    let store = MemoryStore::new().with_secret(EngineVersion::V2, "secret/app", [("k", "v")]);
    let policy = Policy::new("http://127.0.0.1:8200", "vault").unwrap();

    let session = store.init(&policy, &token()).unwrap();
    assert_eq!(
        session.read("secret/app", EngineVersion::V1).unwrap(),
        ReadOutcome::NotFound
    );
    let data: HashMap<String, String> = [("a".to_string(), "1".to_string())].into();
    session.write("secret/app", &data, EngineVersion::V2).unwrap();

    assert_eq!(store.secret(EngineVersion::V2, "secret/app"), Some(data.clone()));
    assert_eq!(
        store.calls(),
        vec![
            StoreCall::Init { method: "token" },
            StoreCall::Read {
                path: "secret/app".to_string(),
                engine_version: EngineVersion::V1,
            },
            StoreCall::Write {
                path: "secret/app".to_string(),
                data,
                engine_version: EngineVersion::V2,
            },
        ]
    );
}

#[test]
fn test_memory_store_failures() {
    let store = MemoryStore::new()
        .failing_path("secret/broken", 500, "internal error")
        .rejecting_auth("bad token");
    let policy = Policy::new("http://127.0.0.1:8200", "vault").unwrap();
    assert!(matches!(
        store.init(&policy, &token()),
        Err(VaultEnvError::Auth(_))
    ));

    let store = MemoryStore::new().failing_path("secret/broken", 500, "internal error");
    let session = store.init(&policy, &token()).unwrap();
    assert!(matches!(
        session.read("secret/broken", EngineVersion::V2),
        Err(VaultEnvError::Store { status: 500, .. })
    ));
}
