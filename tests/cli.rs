//! Integration tests for the swebox CLI.
//!
//! These tests verify the CLI binary behavior by running the actual
//! executable and checking output and exit codes.

use assert_cmd::Command;
use predicates::prelude::*;

/// Creates a Command for the swebox binary.
#[allow(deprecated)]
fn swebox() -> Command {
    Command::cargo_bin("swebox").expect("failed to find swebox binary")
}

#[test]
fn test_help_shows_all_commands() {
    swebox()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("swebox"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("image"));
}

#[test]
fn test_version_shows_version() {
    swebox()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("swebox"));
}

#[test]
fn test_run_help_shows_all_options() {
    swebox()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--problem"))
        .stdout(predicate::str::contains("--repo-file"))
        .stdout(predicate::str::contains("--instance-id"))
        .stdout(predicate::str::contains("--agent-config"));
}

#[test]
fn test_image_help_shows_subcommands() {
    swebox()
        .args(["image", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_run_requires_problem() {
    swebox().arg("run").assert().failure();
}

#[test]
fn test_run_rejects_missing_repo_file() {
    swebox()
        .args([
            "run",
            "--problem",
            "x",
            "--repo-file",
            "/nonexistent/seed.json",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read repo file"));
}
