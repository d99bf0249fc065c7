//! End-to-end tests for Offload CLI commands.
//!
//! These tests run the `offload` binary against its built-in callables.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin for tests

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

const OFFLOAD_VARS: &[&str] = &[
    "OFFLOAD_LIFECYCLE",
    "OFFLOAD_THREAD_NAME",
    "OFFLOAD_STACK_SIZE",
    "OFFLOAD_MAX_ENVELOPE_BYTES",
];

fn offload() -> Command {
    let mut cmd = Command::cargo_bin("offload").expect("offload binary");
    for var in OFFLOAD_VARS {
        cmd.env_remove(var);
    }
    cmd
}

/// A dispatcher config file in a temporary directory.
struct TestConfig {
    _temp_dir: TempDir,
    path: PathBuf,
}

impl TestConfig {
    fn new(source: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("offload.json");
        fs::write(&path, source).expect("Failed to write config");
        Self {
            _temp_dir: temp_dir,
            path,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_list() {
    offload()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("sum_range"))
        .stdout(predicate::str::contains("spin"));
}

#[test]
fn test_run_sum_range() {
    offload()
        .args(["run", "sum_range", "5"])
        .assert()
        .success()
        .stdout(predicate::str::diff("10\n"));
}

#[test]
fn test_run_per_call() {
    offload()
        .args(["run", "sum_range", "4", "--lifecycle", "per-call"])
        .assert()
        .success()
        .stdout(predicate::str::diff("6\n"));
}

#[test]
fn test_run_singleton() {
    offload()
        .args(["run", "echo", "[1,\"a\"]", "--lifecycle", "singleton"])
        .assert()
        .success()
        .stdout(predicate::str::diff("[1,\"a\"]\n"));
}

#[test]
fn test_run_failure_exits_non_zero() {
    offload()
        .args(["run", "fail", "boom"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("boom"));
}

#[test]
fn test_run_unknown_callable() {
    offload()
        .args(["run", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown callable `nope`"));
}

#[test]
fn test_run_timeout_kills_context() {
    offload()
        .args(["run", "spin", "60000", "--timeout-ms", "100"])
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .failure()
        .stderr(predicate::str::contains("context killed"));
}

#[test]
fn test_run_with_config_file() {
    let config = TestConfig::new(r#"{"lifecycle": "per_call"}"#);
    offload()
        .args(["run", "nap", "5", "--config"])
        .arg(&config.path)
        .assert()
        .success()
        .stdout(predicate::str::diff("5\n"));
}

#[test]
fn test_run_rejects_gated_config() {
    let config = TestConfig::new(
        r#"{"lifecycle": "gated", "arguments": {"shape": "fixed", "input": 1}}"#,
    );
    offload()
        .args(["run", "echo", "x", "--config"])
        .arg(&config.path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("offload gate"));
}

#[test]
fn test_gate_sequence() {
    offload()
        .args(["gate", "sum_range", "--input", "5"])
        .args(["--trigger", "0", "1", "1", "2", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("trigger 0"))
        .stdout(predicate::str::contains("idle"))
        .stdout(predicate::str::contains("running"))
        .stdout(predicate::str::contains("result"))
        .stdout(predicate::str::contains("10"));
}
