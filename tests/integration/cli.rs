//! The `upkeep` binary as a host would drive it.

use crate::common::{MockRegistry, REPO};
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Write a config file rooting all state in `temp`.
fn write_config(temp: &Path, api_base: &str) -> PathBuf {
    let config = format!(
        r#"data_dir = '{}'

[update]
api_base = "{api_base}"
repository = "{REPO}"
product_token = "app"
allowed_hosts = ["127.0.0.1"]
allow_insecure_loopback = true
backoff_base_ms = 1
"#,
        temp.join("data").display()
    );
    let path = temp.join("config.toml");
    std::fs::write(&path, config).unwrap();
    path
}

fn upkeep(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("upkeep").unwrap();
    cmd.arg("--quiet").arg("--config").arg(config).env_remove("RUST_LOG");
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_instructions_for_source_build() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "https://api.github.com");

    upkeep(&config)
        .arg("instructions")
        .assert()
        .success()
        .stdout(predicate::str::contains("git pull --ff-only"))
        .stdout(predicate::str::contains("\"mode\": \"source\""));
}

#[test]
fn test_download_is_refused_for_source_build() {
    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), "https://api.github.com");

    let assert = upkeep(&config).arg("download").assert().failure();
    let payload = stdout_json(assert.get_output());
    assert_eq!(payload["success"], false);
    assert_eq!(payload["mode"], "source");
    assert!(payload["error"].as_str().unwrap().contains("source mode"));
    assert!(!temp.path().join("data").join("updates").exists());
}

#[test]
fn test_missing_config_file_is_reported() {
    let temp = TempDir::new().unwrap();

    upkeep(&temp.path().join("absent.toml"))
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_queries_registry() {
    let registry = MockRegistry::start().await;
    let release = registry.release("v99.0.0", &[("app-linux-x86_64", 10), ("app-windows-x86_64.exe", 10)]);
    registry.serve_releases(json!([release])).await;

    let temp = TempDir::new().unwrap();
    let config = write_config(temp.path(), &registry.uri());

    let assert = upkeep(&config).args(["status", "--force"]).assert().success();
    let payload = stdout_json(assert.get_output());

    assert_eq!(payload["latestVersion"], "99.0.0");
    // A source build never offers to update itself.
    assert_eq!(payload["updateAvailable"], false);
    assert_eq!(payload["state"]["status"], "available");
    assert!(temp.path().join("data").join("updates").join("update_state.json").is_file());
}
