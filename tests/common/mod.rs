#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Test helper for creating temporary directories with test manifests
pub struct TestFixture {
    _temp_dir: TempDir,
    pub base_path: PathBuf,
}

impl TestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let base_path = temp_dir.path().to_path_buf();
        Self {
            _temp_dir: temp_dir,
            base_path,
        }
    }

    /// Writes `content` as `<dir>/vaultenv.toml` and returns its path.
    pub fn write_manifest(&self, dir: &str, content: &str) -> PathBuf {
        let dir = self.base_path.join(dir);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("vaultenv.toml");
        fs::write(&path, content).unwrap();
        path
    }

    /// Create a directory structure for extends testing
    pub fn create_extends_structure(&self) -> (PathBuf, PathBuf, PathBuf) {
        let shared = self.write_manifest(
            "shared",
            r#"
[vault]
url = "https://shared.example.com:8200"
credential = "shared"
engine_version = 1
namespace = "platform"

[[secrets]]
path = "kv/shared/db"
values = [{ vault_key = "password", env_var = "DB_PASSWORD" }]
"#,
        );

        let team = self.write_manifest(
            "team",
            r#"
[vault]
credential = "team"
retries = 2

[[secrets]]
path = "kv/team/api"
values = [["API_KEY", "key"]]
"#,
        );

        let app = self.write_manifest(
            "app",
            r#"
extends = ["../shared", "../team"]

[vault]
fail_if_not_found = false

[[secrets]]
path = "kv/app/db"
engine_version = 2
values = [{ vault_key = "password", env_var = "DB_PASSWORD" }]
"#,
        );

        (shared, team, app)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
