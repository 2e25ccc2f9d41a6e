//! Tests that run the `wgman` binary.
//!
//! These tests verify:
//! 1. `init-config` writes a loadable file
//! 2. Read commands work without a `wg` binary on the host
//! 3. Engine errors reach stderr with a failing exit code

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn wgman() -> Command {
    let mut cmd = Command::cargo_bin("wgman").expect("binary built");
    cmd.env_remove("WGMAN_CONFIG").env("RUST_LOG", "off");
    cmd
}

fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("wgman.json");
    let config = serde_json::json!({
        "state_dir": dir.join("state"),
        "config_dir": dir.join("conf"),
        "wg_binary": "/nonexistent/wg",
        "wg_quick_binary": "/nonexistent/wg-quick",
        "command_timeout_secs": 5
    });
    std::fs::write(&path, config.to_string()).expect("write config");
    path
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_init_config_writes_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("etc").join("wgman.json");

    wgman()
        .arg("--config")
        .arg(&path)
        .arg("init-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));

    let content = std::fs::read_to_string(&path).expect("read");
    assert!(content.contains("\"command_timeout_secs\": 30"));

    wgman()
        .arg("--config")
        .arg(&path)
        .arg("init-config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("wgman.json");
    std::fs::write(&path, r#"{"command_timeout_secs": 0}"#).expect("write");

    wgman()
        .arg("--config")
        .arg(&path)
        .args(["interface", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("command_timeout_secs"));
}

// ============================================================================
// Commands
// ============================================================================

#[test]
fn test_interface_list_on_empty_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(dir.path());

    wgman()
        .arg("--config")
        .arg(&config)
        .args(["--format", "json", "interface", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"interfaces\": []"));

    assert!(dir.path().join("state").is_dir());
}

#[test]
fn test_missing_peer_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(dir.path());

    wgman()
        .arg("--config")
        .arg(&config)
        .args(["peer", "config", "99"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("peer 99 not found"));
}

#[test]
fn test_create_without_wg_fails_cleanly() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(dir.path());

    wgman()
        .arg("--config")
        .arg(&config)
        .args(["interface", "create", "gray"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("/nonexistent/wg"));
}
