mod common;

use assert_cmd::prelude::*;
use common::{SIM_CONFIG, rig, write_config};
use predicates::prelude::*;
use rstest::rstest;
use std::process::Command;
use tempfile::tempdir;

#[rstest]
#[case(&["move", "--axis", "X", "--steps", "800"], 0, "X:10.000", "stdout")]
#[case(&["move", "--axis", "z", "--steps", "-400"], 0, "Z:-5.000", "stdout")]
#[case(&["move", "--axis", "E", "--steps", "250"], 0, "E:0.500", "stdout")]
#[case(&["move-to", "X=12", "Y=3.5"], 0, "X:12.000 Y:3.500", "stdout")]
#[case(&["position"], 0, "X:0.000", "stdout")]
#[case(&["set-position", "X=4", "E=1.25"], 0, "E:1.250", "stdout")]
#[case(&["home", "X", "Y"], 0, "homed", "stdout")]
#[case(&["enable"], 0, "steppers enabled", "stdout")]
#[case(&["disable"], 0, "steppers disabled", "stdout")]
#[case(&["send", "M114"], 0, "Count", "stdout")]
#[case(&["send", "M999"], 0, "Unknown command", "stdout")]
#[case(&["move", "--axis", "Q", "--steps", "1"], 7, "Axis 'Q' is not configured", "stderr")]
#[case(&["move-to", "Q=1"], 7, "not configured", "stderr")]
#[case(&["move"], 2, "required", "stderr")]
#[case(&["move-to", "X"], 2, "AXIS=VALUE", "stderr")]
#[case(&["send", "  "], 6, "refused", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SIM_CONFIG);

    let mut cmd = rig(&cfg);
    for a in args {
        cmd.arg(a);
    }
    let assert = cmd.assert().code(exit_code);

    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("rig")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("move-to").and(predicate::str::contains("self-check")));
}

#[test]
fn set_position_keep_others_leaves_unlisted_axes() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SIM_CONFIG);
    // Each run is a fresh simulated board, so only the listed axis changes here.
    rig(&cfg)
        .args(["set-position", "--keep-others", "E=2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("X:0.000").and(predicate::str::contains("E:2.000")));
}

#[test]
fn home_skips_the_extruder() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SIM_CONFIG);
    rig(&cfg)
        .args(["home", "E"])
        .assert()
        .success()
        .stdout(predicate::str::contains("homed"));
}

#[test]
fn custom_axis_table_drives_conversion() {
    let dir = tempdir().unwrap();
    let body = format!(
        "{SIM_CONFIG}\n[[axes]]\nname = \"X\"\nsteps_per_unit = 100.0\n\n[[axes]]\nname = \"A\"\nsteps_per_unit = 10.0\n"
    );
    let cfg = write_config(&dir, &body);
    rig(&cfg)
        .args(["move", "--axis", "A", "--steps", "25"])
        .assert()
        .success()
        .stdout(predicate::str::contains("A:2.500"));
    rig(&cfg)
        .args(["move", "--axis", "Y", "--steps", "1"])
        .assert()
        .code(7);
}

#[test]
fn weigh_settles_on_the_simulated_mass() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SIM_CONFIG);
    rig(&cfg)
        .env("RIG_SIM_MASS", "42.5")
        .arg("weigh")
        .assert()
        .success()
        .stdout(predicate::str::contains("(stable,"));
}

#[test]
fn watch_stops_after_count() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SIM_CONFIG);
    let out = rig(&cfg)
        .args(["watch", "--count", "3"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8_lossy(&out);
    assert_eq!(stdout.lines().count(), 3, "stdout was: {stdout}");
}

#[test]
fn self_check_reports_both_devices() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, SIM_CONFIG);
    rig(&cfg)
        .arg("self-check")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("sim://marlin")
                .and(predicate::str::contains("10 axes"))
                .and(predicate::str::contains("self-check ok")),
        );
}

#[test]
fn missing_config_file_is_explained() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    rig(&missing)
        .arg("position")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Could not read the config file"));
}

#[test]
fn invalid_config_is_rejected_before_connecting() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[recovery]\nmax_attempts = 3\n");
    rig(&cfg)
        .arg("position")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration is invalid"));
}

#[test]
fn real_ports_need_the_hardware_backend() {
    let dir = tempdir().unwrap();
    let body = SIM_CONFIG.replace("[motion]", "[motion]\nport = \"/dev/rig-test-no-such-port\"");
    let cfg = write_config(&dir, &body);
    // Without --sim: either the binary has no serial backend or the port is absent.
    Command::cargo_bin("rig")
        .unwrap()
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("position")
        .assert()
        .failure();
}
