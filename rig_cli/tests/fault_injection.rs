//! Failure paths driven through the simulator's environment hooks.

mod common;

use assert_cmd::prelude::*;
use common::{SIM_CONFIG, first_json, rig, write_config};
use predicates::prelude::*;
use rstest::rstest;
use tempfile::tempdir;

#[rstest]
fn one_failed_write_is_recovered() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SIM_CONFIG);
    rig(&cfg)
        .env("RIG_SIM_FAIL_WRITES", "1")
        .args(["move", "--axis", "X", "--steps", "80"])
        .assert()
        .success()
        .stdout(predicate::str::contains("X:1.000"));
}

#[rstest]
fn two_failed_writes_are_a_connection_error() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SIM_CONFIG);
    rig(&cfg)
        .env("RIG_SIM_FAIL_WRITES", "2")
        .arg("position")
        .assert()
        .code(3)
        .stderr(predicate::str::contains(
            "What happened: Lost the connection to sim://marlin after 2 attempt(s)",
        ));
}

#[rstest]
fn single_attempt_policy_fails_on_first_write() {
    let dir = tempdir().unwrap();
    let body = SIM_CONFIG.replace("[recovery]", "[recovery]\nmax_attempts = 1");
    let cfg = write_config(&dir, &body);
    let out = rig(&cfg)
        .env("RIG_SIM_FAIL_WRITES", "1")
        .arg("--json")
        .arg("enable")
        .assert()
        .code(3)
        .get_output()
        .stdout
        .clone();
    let v = first_json(&out);
    assert_eq!(v["reason"], "Connection");
    assert_eq!(v["details"]["attempts"], 1);
    assert_eq!(v["details"]["target"], "sim://marlin");
}

#[rstest]
fn garbled_scale_lines_are_counted_not_fatal() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SIM_CONFIG);
    let out = rig(&cfg)
        .env("RIG_SIM_GARBLE", "3")
        .arg("--json")
        .arg("weigh")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v = first_json(&out);
    assert_eq!(v["converged"], true);
    assert!(v["failures"].as_u64().unwrap() > 0);
    assert!((v["value"].as_f64().unwrap() - 100.0).abs() < 0.01);
}

#[rstest]
fn unsettled_weigh_reports_the_mean_unless_strict() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SIM_CONFIG);
    rig(&cfg)
        .args(["weigh", "--timeout-ms", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("timed out, window mean"));
    rig(&cfg)
        .args(["weigh", "--timeout-ms", "5", "--strict"])
        .assert()
        .code(9)
        .stderr(predicate::str::contains("did not settle"));
}

#[rstest]
fn zero_timeout_is_a_config_error() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SIM_CONFIG);
    rig(&cfg)
        .args(["weigh", "--timeout-ms", "0"])
        .assert()
        .code(8)
        .stderr(predicate::str::contains("Invalid configuration"));
}
