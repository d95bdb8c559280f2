//! Binary-level tests that never reach a broker.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

fn telebridge() -> Command {
    let mut cmd = Command::cargo_bin("telebridge").unwrap();
    cmd.env("STORAGE_BACKEND", "memory").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_commands() {
    telebridge()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("send"));
}

#[test]
fn test_send_without_action_fails_before_connecting() {
    telebridge()
        .args(["send", "lamp1", ""])
        .env("MQTT_BROKER", "127.0.0.1")
        .env("MQTT_PORT", "1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing 'action' in request body"));
}

#[test]
fn test_invalid_config_file_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[mqtt]\nport = 0").unwrap();

    telebridge()
        .arg("--config")
        .arg(file.path())
        .args(["status", "lamp1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("mqtt.port must not be 0"));
}

#[test]
fn test_missing_config_file() {
    telebridge()
        .args(["--config", "/nonexistent/telebridge.toml", "status", "lamp1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}
