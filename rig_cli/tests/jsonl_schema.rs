//! `--json` output: one object per line on stdout, stable field names.

mod common;

use assert_cmd::prelude::*;
use common::{SIM_CONFIG, first_json, rig, write_config};
use rstest::rstest;
use tempfile::tempdir;

#[rstest]
fn position_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SIM_CONFIG);
    let out = rig(&cfg)
        .arg("--json")
        .args(["move", "--axis", "Y", "--steps", "160"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v = first_json(&out);

    assert_eq!(v["command"], "move");
    assert_eq!(v["axis"], "Y");
    assert_eq!(v["steps"], 160);
    assert_eq!(v["distance"].as_f64(), Some(2.0));
    let positions = v["positions"].as_object().expect("positions object");
    assert_eq!(positions.len(), 10);
    assert_eq!(positions["Y"].as_f64(), Some(2.0));
    assert_eq!(positions["E"].as_f64(), Some(0.0));
}

#[rstest]
fn weigh_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SIM_CONFIG);
    let out = rig(&cfg)
        .env("RIG_SIM_MASS", "42.5")
        .arg("--json")
        .arg("weigh")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v = first_json(&out);

    assert_eq!(v["command"], "weigh");
    assert_eq!(v["converged"], true);
    let value = v["value"].as_f64().expect("numeric value");
    assert!((value - 42.5).abs() < 0.01, "value {value}");
    assert!(v["samples"].as_u64().unwrap() >= 3);
    assert_eq!(v["failures"].as_u64(), Some(0));
    assert!(v["elapsed_ms"].as_u64().is_some());
}

#[rstest]
fn send_schema_tags_line_kinds() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SIM_CONFIG);
    let out = rig(&cfg)
        .arg("--json")
        .args(["send", "G28 X"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v = first_json(&out);

    let kinds: Vec<&str> = v["response"]
        .as_array()
        .expect("response array")
        .iter()
        .map(|l| l["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["plain", "terminal"]);
}

#[rstest]
fn watch_emits_sequenced_lines() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SIM_CONFIG);
    let out = rig(&cfg)
        .arg("--json")
        .args(["watch", "--count", "4"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8_lossy(&out);
    let seqs: Vec<u64> = stdout
        .lines()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).expect("valid JSON"))
        .map(|v| v["seq"].as_u64().unwrap())
        .collect();
    assert_eq!(seqs, vec![1, 2, 3, 4]);
}

/// Errors under `--json` are objects on stdout with a stable reason and exit code.
#[rstest]
#[case(&["move", "--axis", "Q", "--steps", "1"], "InvalidAxis", 7)]
#[case(&["weigh", "--strict", "--timeout-ms", "5"], "NotSettled", 9)]
fn error_schema(#[case] args: &[&str], #[case] reason: &str, #[case] code: i32) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SIM_CONFIG);
    let out = rig(&cfg)
        .arg("--json")
        .args(args)
        .assert()
        .code(code)
        .get_output()
        .stdout
        .clone();
    let v = first_json(&out);

    assert_eq!(v["reason"], reason);
    assert_eq!(v["exit_code"], code);
    assert!(v["details"].is_object());
    assert!(v["message"].as_str().unwrap().starts_with("What happened:"));
}
