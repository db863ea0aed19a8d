#![allow(dead_code)]

use assert_cmd::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

/// Default axes, no startup wait and no recovery pauses, fast scale polling.
pub const SIM_CONFIG: &str = r#"
[motion]
read_timeout_ms = 100
response_timeout_ms = 2000
startup_delay_ms = 0

[recovery]
close_delay_ms = 0
settle_delay_ms = 0

[stabilize]
window = 3
threshold = 0.001
timeout_ms = 3000
poll_ms = 1
sample_hz = 200
"#;

pub fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("rig.toml");
    fs::write(&path, body).unwrap();
    path
}

/// `rig --sim --log-level error --config <cfg>` with the simulator env cleared.
pub fn rig(cfg: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("rig").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("RIG_SIM_FAIL_WRITES")
        .env_remove("RIG_SIM_MASS")
        .env_remove("RIG_SIM_GARBLE")
        .arg("--sim")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(cfg);
    cmd
}

/// Parse the first stdout line that is a JSON object.
pub fn first_json(stdout: &[u8]) -> serde_json::Value {
    let text = String::from_utf8_lossy(stdout);
    let line = text
        .lines()
        .find(|l| l.trim_start().starts_with('{'))
        .unwrap_or_else(|| panic!("no JSON line in stdout: {text}"));
    serde_json::from_str(line).expect("valid JSON")
}
