//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "rig", version, about = "Motion rig and scale driver")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/rig_config.toml")]
    pub config: PathBuf,

    /// Print results and logs as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Talk to the in-process simulators instead of serial ports
    #[arg(long, action = ArgAction::SetTrue)]
    pub sim: bool,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// `AXIS=VALUE` pair as typed on the command line; the axis letter is
/// checked against the configured set when the command runs.
#[derive(Clone, Debug, PartialEq)]
pub struct Assignment {
    pub axis: String,
    pub value: f64,
}

pub fn parse_assignment(s: &str) -> Result<Assignment, String> {
    let (axis, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected AXIS=VALUE, got '{s}'"))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    if !value.is_finite() {
        return Err(format!("'{s}' is not a finite value"));
    }
    Ok(Assignment {
        axis: axis.trim().to_string(),
        value,
    })
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Move one axis by a signed number of motor steps (relative move)
    Move {
        /// Axis letter (X, Y, Z, E, ...)
        #[arg(long)]
        axis: String,
        /// Signed step count
        #[arg(long, allow_hyphen_values = true)]
        steps: i64,
        /// Feed rate in units/min (defaults to motion.default_rate)
        #[arg(long, value_name = "UNITS_PER_MIN")]
        rate: Option<u32>,
    },
    /// Move to absolute coordinates, e.g. `move-to X=10 Y=5`
    MoveTo {
        #[arg(required = true, value_parser = parse_assignment, allow_hyphen_values = true)]
        targets: Vec<Assignment>,
        /// Feed rate in units/min (defaults to motion.default_rate)
        #[arg(long, value_name = "UNITS_PER_MIN")]
        rate: Option<u32>,
        /// Return without waiting for the move to finish
        #[arg(long, action = ArgAction::SetTrue)]
        no_wait: bool,
    },
    /// Query and print the device's current position
    Position,
    /// Override the current position without moving, e.g. `set-position E=0`
    SetPosition {
        #[arg(required = true, value_parser = parse_assignment, allow_hyphen_values = true)]
        values: Vec<Assignment>,
        /// Only touch the listed axes; by default unlisted axes become 0
        #[arg(long, action = ArgAction::SetTrue)]
        keep_others: bool,
    },
    /// Home the listed axes (all homeable axes when none are given)
    Home {
        axes: Vec<String>,
        /// Return without waiting for homing moves to finish
        #[arg(long, action = ArgAction::SetTrue)]
        no_wait: bool,
    },
    /// Energize the stepper drivers
    Enable,
    /// De-energize the stepper drivers
    Disable,
    /// Send one raw G-code line and print the response
    Send {
        /// The line to send, e.g. "M114"
        line: String,
    },
    /// Wait for the scale to settle and print the reading
    Weigh {
        /// Override stabilize.timeout_ms
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
        /// Exit non-zero when the reading did not settle in time
        #[arg(long, action = ArgAction::SetTrue)]
        strict: bool,
    },
    /// Print scale readings continuously until Ctrl-C
    Watch {
        /// Stop after this many readings
        #[arg(long, value_name = "N")]
        count: Option<u64>,
    },
    /// Quick health check: connect to both devices and read once
    SelfCheck,
}
