//! Command-line behaviour of the `cannonade` binary.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn cannonade() -> Command {
    Command::new(env!("CARGO_BIN_EXE_cannonade"))
}

#[test]
fn run_without_endpoint_fails() {
    cannonade().arg("run").assert().failure();
}

#[test]
fn run_with_bad_schedule_fails_before_firing() {
    let dir = tempfile::tempdir().unwrap();
    cannonade()
        .current_dir(dir.path())
        .args(["run", "http://127.0.0.1:9/", "--schedule", "ten:two"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid schedule"));
}

#[test]
fn run_with_missing_image_fails_before_firing() {
    let dir = tempfile::tempdir().unwrap();
    cannonade()
        .current_dir(dir.path())
        .args(["run", "http://127.0.0.1:9/", "--image", "missing.jpg", "--silent"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.jpg"));
}

#[test]
fn run_with_missing_config_fails() {
    cannonade()
        .args(["run", "http://127.0.0.1:9/", "--config", "/nonexistent/cannonade.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}

#[test]
fn init_writes_config_once() {
    let dir = tempfile::tempdir().unwrap();

    cannonade()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stderr(predicate::str::contains("Created"));
    assert!(dir.path().join("cannonade.toml").exists());

    cannonade()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    cannonade()
        .current_dir(dir.path())
        .args(["init", "--force"])
        .assert()
        .success();
}
