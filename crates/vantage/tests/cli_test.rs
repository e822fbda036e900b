//! Integration tests for the `vantage` CLI binary.
//!
//! Every test runs against fixture-backed controllers and a config file in
//! a temporary directory, so nothing touches the user's real setup.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

const FIXTURE: &str = r"
host: 10.20.0.5
serial_number: '2024166'
requires_auth: true
password: hunter2
objects:
  - { vid: 1, name: Master, type: Master, firmware_version: '4.1.5' }
  - { vid: 214, name: Kitchen Pendants, type: Load }
  - { vid: 683, name: Toggle Office Lights, type: Task }
  - { vid: 700, name: All Off, type: Task }
  - { vid: 701, name: All Off, type: Task }
script:
  - { after: 100ms, action: update, vid: 683, changes: { running: true } }
";

struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("controller.yaml"), FIXTURE).unwrap();
        Self { dir }
    }

    fn config(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    fn fixture(&self) -> PathBuf {
        self.dir.path().join("controller.yaml")
    }

    /// `vantage` with env isolation and the fixture controller reachable.
    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = cargo_bin_cmd!("vantage");
        cmd.env("HOME", self.dir.path())
            .env("XDG_CONFIG_HOME", self.dir.path())
            .env("VANTAGE_CONFIG", self.config())
            .env_remove("VANTAGE_OUTPUT")
            .env_remove("VANTAGE_PASSWORD")
            .env_remove("DBUS_SESSION_BUS_ADDRESS")
            .env_remove("RUST_LOG")
            .arg("--fixture")
            .arg(self.fixture());
        cmd
    }

    /// Add the fixture controller as an entry with a plaintext password.
    fn add_entry(&self) {
        self.cmd()
            .args(["entries", "add", "--host", "10.20.0.5"])
            .args(["--password", "hunter2", "--store", "plaintext"])
            .assert()
            .success();
    }
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn no_args_shows_help() {
    let output = cargo_bin_cmd!("vantage").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"), "expected usage text:\n{stderr}");
}

#[test]
fn help_lists_commands() {
    cargo_bin_cmd!("vantage").arg("--help").assert().success().stdout(
        predicate::str::contains("discover")
            .and(predicate::str::contains("entries"))
            .and(predicate::str::contains("task")),
    );
}

#[test]
fn completions_are_generated() {
    cargo_bin_cmd!("vantage")
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Inspect ─────────────────────────────────────────────────────────

#[test]
fn inspect_lists_entities_from_a_fixture() {
    let sandbox = Sandbox::new();
    let output = sandbox
        .cmd()
        .args(["inspect", "-o", "plain"])
        .arg(sandbox.fixture())
        .output()
        .unwrap();
    assert!(output.status.success());
    insta::assert_snapshot!(String::from_utf8_lossy(&output.stdout), @"light.kitchen_pendants");
}

#[test]
fn inspect_objects_as_json() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["inspect", "--show", "objects", "-o", "json"])
        .arg(sandbox.fixture())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"vid\": 683").and(predicate::str::contains("Task")));
}

#[test]
fn inspect_missing_fixture_fails() {
    let sandbox = Sandbox::new();
    cargo_bin_cmd!("vantage")
        .env("VANTAGE_CONFIG", sandbox.config())
        .args(["inspect", "nope.yaml"])
        .assert()
        .failure();
}

// ── Entries ─────────────────────────────────────────────────────────

#[test]
fn empty_config_lists_nothing() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["entries", "list"])
        .assert()
        .success()
        .stderr(predicate::str::contains("No config entries"));
}

#[test]
fn add_persists_the_entry() {
    let sandbox = Sandbox::new();
    sandbox.add_entry();

    let config = read(&sandbox.config());
    assert!(config.contains("unique_id = \"2024166\""), "{config}");
    assert!(config.contains("host = \"10.20.0.5\""), "{config}");
    assert!(config.contains("username = \"administrator\""), "{config}");

    let output = sandbox.cmd().args(["entries", "list", "-o", "json"]).output().unwrap();
    let listed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(listed[0]["unique_id"], "2024166");
    assert_eq!(listed[0]["password_source"], "plaintext");
    assert!(listed[0].get("password").is_none());
}

#[test]
fn adding_the_same_controller_twice_conflicts() {
    let sandbox = Sandbox::new();
    sandbox.add_entry();
    sandbox
        .cmd()
        .args(["entries", "add", "--host", "10.20.0.5", "--password", "hunter2"])
        .assert()
        .code(6);
}

#[test]
fn wrong_password_is_an_auth_error() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["entries", "add", "--host", "10.20.0.5"])
        .args(["--password", "wrong", "--store", "plaintext"])
        .assert()
        .code(3);
    assert!(!sandbox.config().exists());
}

#[test]
fn unknown_host_is_a_connection_error() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["entries", "add", "--host", "10.20.0.99", "--password", "x"])
        .assert()
        .code(7);
}

#[test]
fn remove_requires_confirmation_when_not_interactive() {
    let sandbox = Sandbox::new();
    sandbox.add_entry();

    sandbox
        .cmd()
        .args(["entries", "remove", "2024166"])
        .assert()
        .code(2);
    sandbox
        .cmd()
        .args(["entries", "remove", "2024166", "--yes"])
        .assert()
        .success();
    assert!(!read(&sandbox.config()).contains("2024166"));
}

// ── Tasks ───────────────────────────────────────────────────────────

#[test]
fn task_start_by_name() {
    let sandbox = Sandbox::new();
    sandbox.add_entry();
    sandbox
        .cmd()
        .args(["task", "start", "--name", "Toggle Office Lights", "-o", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::diff("683\n"));
}

#[test]
fn ambiguous_task_name_conflicts() {
    let sandbox = Sandbox::new();
    sandbox.add_entry();
    sandbox
        .cmd()
        .args(["task", "stop", "--name", "All Off"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("ambiguous"));
}

#[test]
fn task_selector_needs_exactly_one_field() {
    let sandbox = Sandbox::new();
    sandbox.cmd().args(["task", "start"]).assert().code(2);
    sandbox
        .cmd()
        .args(["task", "start", "--id", "683", "--name", "All Off"])
        .assert()
        .code(2);
}

#[test]
fn task_without_entries_explains_how_to_add_one() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["task", "start", "--id", "683"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No config entries"));
}

// ── Run ─────────────────────────────────────────────────────────────

#[test]
fn run_streams_bus_events() {
    let sandbox = Sandbox::new();
    sandbox.add_entry();
    sandbox
        .cmd()
        .args(["run", "--duration", "1s", "-o", "json-compact"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"event_type\":\"vantage_task_started\""))
        .stderr(predicate::str::contains("loaded, 1 entities"));
}
