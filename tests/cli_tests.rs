//! CLI integration tests using assert_cmd.
//!
//! These tests invoke the actual `adgen` binary and verify its output.

use assert_cmd::Command;
use predicates::prelude::*;

#[allow(deprecated)]
fn adgen_cmd() -> Command {
    Command::cargo_bin("adgen").expect("binary should exist")
}

#[test]
fn test_version_flag() {
    adgen_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_help_flag() {
    adgen_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Ad Generator"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("submit"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("dashboard"))
        .stdout(predicate::str::contains("cancel"))
        .stdout(predicate::str::contains("watch"));
}

#[test]
fn test_submit_help_shows_options() {
    adgen_cmd()
        .args(["submit", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--prompt"))
        .stdout(predicate::str::contains("--video"))
        .stdout(predicate::str::contains("--user"))
        .stdout(predicate::str::contains("--wait"));
}

#[test]
fn test_serve_help() {
    adgen_cmd()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--data-dir"));
}

#[test]
fn test_no_subcommand_shows_help() {
    adgen_cmd()
        .assert()
        .success()
        .stdout(predicate::str::contains("Ad Generator"));
}

#[test]
fn test_submit_without_server_reports_connection_error() {
    adgen_cmd()
        .args(["--port", "1", "submit", "--prompt", "coffee shop"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not connect to server"));
}

#[test]
fn test_serve_without_api_key_fails() {
    let tmp = tempfile::TempDir::new().unwrap();
    adgen_cmd()
        .current_dir(tmp.path())
        .env_remove("GOOGLE_API_KEY")
        .env("ADGEN_CONFIG_DIR", tmp.path())
        .args(["serve", "--port", "0", "--data-dir"])
        .arg(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("GOOGLE_API_KEY"));
}
