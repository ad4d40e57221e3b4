use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn ditto() -> Command {
    let mut cmd = Command::cargo_bin("ditto").unwrap();
    cmd.env_remove("SOURCE_DATE_EPOCH")
        .env_remove("DITTO_CONFIG")
        .env("RUST_LOG", "warn");
    cmd
}

fn scenario_tree() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    std::fs::create_dir_all(&input).unwrap();
    std::fs::write(input.join("b.txt"), b"BB").unwrap();
    std::fs::write(input.join("a.txt"), b"AAA").unwrap();
    dir
}

fn root_arg(dir: &Path) -> String {
    dir.join("in").display().to_string()
}

#[test]
fn build_writes_archive_and_prints_fingerprint() {
    let dir = scenario_tree();
    let out = dir.path().join("out/scenario.zip");

    ditto()
        .args(["build", "--root", &root_arg(dir.path())])
        .args(["--timestamp", "1986-01-01T03:00:00", "-o"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("sha256:"))
        .stdout(predicate::str::contains("scenario.zip"));

    let bytes = std::fs::read(&out).unwrap();
    assert_eq!(bytes.len(), 199);
    assert_eq!(&bytes[..4], b"PK\x03\x04");
}

#[test]
fn repeated_builds_are_identical() {
    let dir = scenario_tree();
    let first = dir.path().join("first.zip");
    let second = dir.path().join("second.zip");

    for (out, extra) in [(&first, None), (&second, Some("--parallel"))] {
        let mut cmd = ditto();
        cmd.args(["build", "--strategy", "deflate", "--root", &root_arg(dir.path())])
            .env("SOURCE_DATE_EPOCH", "1700000000")
            .arg("-o")
            .arg(out);
        if let Some(flag) = extra {
            cmd.arg(flag);
        }
        cmd.assert().success();
    }

    assert_eq!(std::fs::read(first).unwrap(), std::fs::read(second).unwrap());
}

#[test]
fn verify_json_report() {
    let dir = scenario_tree();
    let output = ditto()
        .args(["verify", "--format", "json", "--runs", "3"])
        .args(["--root", &root_arg(dir.path())])
        .output()
        .unwrap();
    assert!(output.status.success(), "{:?}", output);

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let records = report["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["strategy_name"], "store");
    assert_eq!(records[0]["match_status"], "match");
    assert_eq!(records[0]["byte_length"], 199);
    assert_eq!(records[0]["runs"], 3);
    assert_eq!(records[1]["strategy_name"], "deflate");
    assert_eq!(records[1]["match_status"], "structural_match");
}

#[test]
fn verify_writes_artifacts() {
    let dir = scenario_tree();
    let out_dir = dir.path().join("artifacts");

    ditto()
        .args(["verify", "--stem", "scenario", "--root", &root_arg(dir.path())])
        .arg("--out-dir")
        .arg(&out_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("store"));

    assert!(out_dir.join("scenario-store.zip").is_file());
    assert!(out_dir.join("scenario-deflate.zip").is_file());
}

#[test]
fn invalid_timestamp_is_a_config_error() {
    let dir = scenario_tree();
    ditto()
        .args(["build", "--timestamp", "1979-12-31T23:59:59", "--root", &root_arg(dir.path())])
        .arg("-o")
        .arg(dir.path().join("x.zip"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid --timestamp"));
}

#[test]
fn empty_selection_respects_require_entries() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("empty.zip");

    ditto()
        .args(["build", "--root"])
        .arg(dir.path())
        .arg("--include")
        .arg("nothing/**")
        .arg("-o")
        .arg(&out)
        .assert()
        .success();
    assert_eq!(std::fs::read(&out).unwrap().len(), 22);

    ditto()
        .args(["build", "--require-entries", "--root"])
        .arg(dir.path())
        .arg("--include")
        .arg("nothing/**")
        .arg("-o")
        .arg(dir.path().join("empty2.zip"))
        .assert()
        .code(2);
}

#[test]
fn pinned_fingerprint_mismatch_fails() {
    let dir = scenario_tree();
    let config = dir.path().join("verify.yaml");
    std::fs::write(&config, "strategies: [store]\nexpected:\n  store: \"sha256:00\"\n").unwrap();

    ditto()
        .args(["verify", "--root", &root_arg(dir.path())])
        .arg("--config")
        .arg(&config)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("divergence"));

    ditto()
        .args(["verify", "--advisory", "--root", &root_arg(dir.path())])
        .arg("--config")
        .arg(&config)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("DIVERGENCE"));
}

#[test]
fn unknown_config_key_is_a_config_error() {
    let dir = scenario_tree();
    let config = dir.path().join("verify.yaml");
    std::fs::write(&config, "runz: 2\n").unwrap();

    ditto()
        .args(["verify", "--root", &root_arg(dir.path())])
        .arg("--config")
        .arg(&config)
        .assert()
        .code(2);
}
