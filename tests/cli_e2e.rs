//! End-to-end CLI tests for the harvester binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Binary running in an empty directory with no inherited configuration.
fn harvester(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("harvester").unwrap();
    cmd.current_dir(dir.path()).env("NO_COLOR", "1");
    for var in [
        "START_URL",
        "CHROME_BINARY",
        "WEBDRIVER_URL",
        "OCR_COMMAND",
        "POSTPROC_COMMAND",
        "MANIFEST_DIR",
        "DOWNLOAD_DIR",
        "STATE_DB",
        "RUST_LOG",
        "BROWSER_HEADLESS",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_help_lists_stages() {
    let dir = TempDir::new().unwrap();
    harvester(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("scrape"))
        .stdout(predicate::str::contains("--max-listing-pages"))
        .stdout(predicate::str::contains("--retry-failed"));
}

#[test]
fn test_help_explains_headless_values() {
    let dir = TempDir::new().unwrap();
    harvester(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("BROWSER_HEADLESS=0 or false shows the window"));
}

#[test]
fn test_version_names_binary() {
    let dir = TempDir::new().unwrap();
    harvester(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("harvester"));
}

#[test]
fn test_unknown_stage_is_usage_error() {
    let dir = TempDir::new().unwrap();
    harvester(&dir)
        .arg("index")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_invalid_start_url_is_configuration_error() {
    let dir = TempDir::new().unwrap();
    harvester(&dir)
        .args(["scrape", "--start-url", "ftp://catalog.test/laws"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("configuration error"));
}

#[test]
fn test_concurrency_out_of_range_is_rejected() {
    let dir = TempDir::new().unwrap();
    harvester(&dir)
        .args(["download", "-c", "0"])
        .assert()
        .failure();
}

#[test]
fn test_unconfigured_ocr_stage_succeeds() {
    let dir = TempDir::new().unwrap();
    harvester(&dir).arg("ocr").assert().code(0);
}

#[test]
fn test_download_without_manifest_fails() {
    let dir = TempDir::new().unwrap();
    harvester(&dir)
        .args(["download", "--manifest-dir", "missing"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("missing"));
}
