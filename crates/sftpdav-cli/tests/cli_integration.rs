#![allow(deprecated)] // cargo_bin! macro doesn't exist yet in assert_cmd 2.1

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Command isolated from the invoking user's config file and environment
fn sftpdav(config_home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("sftpdav").unwrap();
    cmd.env("HOME", config_home.path())
        .env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("SFTPDAV_USER")
        .env_remove("SFTPDAV_KEY")
        .env_remove("SFTPDAV_PASSWORD")
        .env_remove("SFTPDAV_CONFIG");
    cmd
}

#[test]
fn test_help() {
    let home = TempDir::new().unwrap();
    sftpdav(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("WebDAV"))
        .stdout(predicate::str::contains("--listen"))
        .stdout(predicate::str::contains("--dir-mode"));
}

#[test]
fn test_version() {
    let home = TempDir::new().unwrap();
    sftpdav(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sftpdav"));
}

#[test]
fn test_missing_target() {
    let home = TempDir::new().unwrap();
    sftpdav(&home)
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("TARGET"));
}

#[test]
fn test_invalid_mode_rejected() {
    let home = TempDir::new().unwrap();
    sftpdav(&home)
        .args(["--dir-mode", "999", "host"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("octal"));
}

#[test]
fn test_invalid_descriptor() {
    let home = TempDir::new().unwrap();
    sftpdav(&home)
        .arg("alice@")
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("missing host"));
}

#[test]
fn test_missing_explicit_config() {
    let home = TempDir::new().unwrap();
    sftpdav(&home)
        .arg("--config")
        .arg(home.path().join("nope.toml"))
        .arg("host")
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("nope.toml"));
}

#[test]
fn test_malformed_config() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("bad.toml");
    fs::write(&path, "listen = 8888\n").unwrap();

    sftpdav(&home)
        .arg("--config")
        .arg(&path)
        .arg("host")
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("Failed to parse config file"));
}

#[test]
fn test_quiet_suppresses_error_output() {
    let home = TempDir::new().unwrap();
    sftpdav(&home)
        .args(["--quiet", "alice@"])
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::is_empty());
}

#[test]
fn test_connection_refused() {
    let home = TempDir::new().unwrap();
    // Nothing listens on port 1
    sftpdav(&home)
        .args(["--password", "secret", "alice@127.0.0.1:1"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("127.0.0.1:1"));
}
