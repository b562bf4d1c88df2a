//! Integration tests for the `mboxmd` binary.

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Binary with user configuration and log files kept out of the way.
fn cli(home: &TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_mboxmd"));
    cmd.env("MBOXMD_CONFIG", home.path().join("missing.toml"))
        .env("XDG_CACHE_HOME", home.path().join("cache"))
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_convert_prints_one_line_per_message() {
    let home = TempDir::new().unwrap();
    let out = home.path().join("out");

    cli(&home)
        .arg("convert")
        .arg(fixture("simple.mbox"))
        .arg("-o")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Processed email 1 and saved to 20240101_Hello_World.md",
        ))
        .stdout(predicate::str::contains(
            "Processed email 4 and saved to 20240104_Caf__cr_me.md",
        ))
        .stdout(predicate::str::contains("Conversion complete"));

    assert!(out.join("20240102_Multipart_test.md").exists());
}

#[test]
fn test_convert_json_summary() {
    let home = TempDir::new().unwrap();
    let out = home.path().join("out");

    let assert = cli(&home)
        .arg("convert")
        .arg(fixture("malformed.mbox"))
        .arg("-o")
        .arg(&out)
        .arg("--json")
        .assert()
        .success()
        .stderr(predicate::str::contains("Processed email 1"))
        .stderr(predicate::str::contains("Skipped email 2"));

    // Per-message lines go to stderr; stdout is a single JSON document.
    let summary: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(summary["messages"], 3);
    assert_eq!(summary["written"], 2);
    assert_eq!(summary["failed"], 1);
}

#[test]
fn test_strict_dates_exit_with_error() {
    let home = TempDir::new().unwrap();
    let out = home.path().join("out");

    cli(&home)
        .arg("convert")
        .arg(fixture("bad_date.mbox"))
        .arg("-o")
        .arg(&out)
        .arg("--strict-dates")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Processed email 1"))
        .stdout(predicate::str::contains("Processed email 3").not())
        .stderr(predicate::str::contains("not a date"));

    assert!(out.join("20240101_First.md").exists());
    assert!(!out.join("20240103_Third.md").exists());
}

#[test]
fn test_rename_policy_flag() {
    let home = TempDir::new().unwrap();
    let out = home.path().join("out");

    cli(&home)
        .arg("convert")
        .arg(fixture("duplicates.mbox"))
        .arg("-o")
        .arg(&out)
        .args(["--policy", "rename"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Processed email 2 and saved to 20240101_Weekly_report_1.md",
        ));
}

#[test]
fn test_unknown_policy_is_rejected() {
    let home = TempDir::new().unwrap();

    cli(&home)
        .arg("convert")
        .arg(fixture("duplicates.mbox"))
        .args(["--policy", "merge"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown write policy"));
}

#[test]
fn test_missing_file_fails() {
    let home = TempDir::new().unwrap();

    cli(&home)
        .arg("convert")
        .arg(home.path().join("nope.mbox"))
        .arg("-o")
        .arg(home.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("file not found"));
}

#[test]
fn test_completions_generate() {
    let home = TempDir::new().unwrap();

    cli(&home)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mboxmd"));
}
