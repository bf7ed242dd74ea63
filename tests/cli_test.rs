#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn icrbuild(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("icrbuild").unwrap();
    cmd.env("HOME", home.path())
        .env_remove("IBMCLOUD_API_KEY")
        .env_remove("IC_API_KEY")
        .env_remove("BLUEMIX_API_KEY")
        .env_remove("BM_API_KEY")
        .env("IBMCLOUD_IAM_ENDPOINT", "http://127.0.0.1:9");
    cmd
}

/// Help lists the build flags
#[test]
fn test_cli_help() {
    let home = TempDir::new().unwrap();
    icrbuild(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--tag"))
        .stdout(predicate::str::contains("--build-arg"))
        .stdout(predicate::str::contains("--no-cache"))
        .stdout(predicate::str::contains("DIRECTORY"));
}

#[test]
fn test_cli_version() {
    let home = TempDir::new().unwrap();
    icrbuild(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("icrbuild"))
        .stdout(predicate::str::contains("GitCommit:"));
}

#[test]
fn test_tag_is_required() {
    let home = TempDir::new().unwrap();
    icrbuild(&home)
        .arg(".")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--tag"));
}

#[test]
fn test_single_directory() {
    let home = TempDir::new().unwrap();
    icrbuild(&home).args(["-t", "us.icr.io/ns/app", "a", "b"]).assert().failure();
}

#[test]
fn test_invalid_tag() {
    let home = TempDir::new().unwrap();
    icrbuild(&home)
        .args(["-t", "app/Upper", "."])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Image Name is not correct format!"));
}

/// Without any credentials the session can not be created
#[test]
fn test_missing_credentials() {
    let home = TempDir::new().unwrap();
    icrbuild(&home)
        .args(["-t", "us.icr.io/ns/app:1", "."])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unable to Connect to IBM Cloud"));
}
