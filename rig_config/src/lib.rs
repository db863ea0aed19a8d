#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the motion/scale rig.
//!
//! - `Config` and its sections are deserialized from TOML; every section has
//!   defaults so a minimal file only names the ports.
//! - `validate()` rejects values the driver cannot run with (non-positive
//!   steps-per-unit, duplicate axes, empty stabilization window, ...).
use serde::Deserialize;

/// Outbound line terminator for the motion controller.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    Lf,
    #[default]
    Crlf,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Positioning {
    Absolute,
    Relative,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MotionCfg {
    pub port: String,
    pub baud_rate: u32,
    /// Transport read timeout per read call (ms)
    pub read_timeout_ms: u64,
    /// Deadline for a terminal `ok` after a command is written (ms)
    pub response_timeout_ms: u64,
    pub line_ending: LineEnding,
    /// Wait after opening the port; many boards reset on connect
    pub startup_delay_ms: u64,
    /// Send M17 right after connecting
    pub auto_enable: bool,
    /// Positioning mode to select after connecting; none leaves the firmware default
    pub initial_positioning: Option<Positioning>,
    /// Send M18 before closing
    pub disable_on_shutdown: bool,
    /// Feed rate used when a command does not specify one (units/min)
    pub default_rate: u32,
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 2000,
            response_timeout_ms: 30_000,
            line_ending: LineEnding::Crlf,
            startup_delay_ms: 2000,
            auto_enable: true,
            initial_positioning: None,
            disable_on_shutdown: true,
            default_rate: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RecoveryCfg {
    /// Total write attempts per command, the first one included
    pub max_attempts: u32,
    /// Pause between closing the old port and opening the new one (ms)
    pub close_delay_ms: u64,
    /// Pause after reopening before the retried write (ms)
    pub settle_delay_ms: u64,
}

impl Default for RecoveryCfg {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            close_delay_ms: 300,
            settle_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AxisCfg {
    /// Single-letter axis identifier as the firmware names it (X, Y, Z, E, ...)
    pub name: String,
    pub steps_per_unit: f64,
    /// Owning tool index for tool-scoped axes (extruders)
    #[serde(default)]
    pub tool: Option<u8>,
}

impl AxisCfg {
    fn linear(name: &str, steps_per_unit: f64) -> Self {
        Self {
            name: name.to_string(),
            steps_per_unit,
            tool: None,
        }
    }
}

/// Ten-axis Marlin layout: nine linear axes and one extruder on tool 0.
pub fn default_axes() -> Vec<AxisCfg> {
    let mut axes: Vec<AxisCfg> = ["X", "Y", "Z", "I", "J", "K", "U", "V", "W"]
        .iter()
        .map(|n| AxisCfg::linear(n, 80.0))
        .collect();
    axes.push(AxisCfg {
        name: "E".to_string(),
        steps_per_unit: 500.0,
        tool: Some(0),
    });
    axes
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScaleCfg {
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    /// Wait after opening before the first read (ms)
    pub open_delay_ms: u64,
}

impl Default for ScaleCfg {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            read_timeout_ms: 50,
            open_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StabilizeCfg {
    /// Number of most recent samples compared
    pub window: usize,
    /// Converged when max - min of the window is below this (scale units)
    pub threshold: f64,
    /// Give up and report the window mean after this long (ms)
    pub timeout_ms: u64,
    /// Delay between read attempts (ms)
    pub poll_ms: u64,
    /// Background sampler rate for `watch` (Hz)
    pub sample_hz: u32,
}

impl Default for StabilizeCfg {
    fn default() -> Self {
        Self {
            window: 3,
            threshold: 0.001,
            timeout_ms: 6000,
            poll_ms: 50,
            sample_hz: 20,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub motion: MotionCfg,
    pub recovery: RecoveryCfg,
    pub axes: Vec<AxisCfg>,
    pub scale: ScaleCfg,
    pub stabilize: StabilizeCfg,
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            motion: MotionCfg::default(),
            recovery: RecoveryCfg::default(),
            axes: default_axes(),
            scale: ScaleCfg::default(),
            stabilize: StabilizeCfg::default(),
            logging: Logging::default(),
        }
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Motion
        if self.motion.port.trim().is_empty() {
            eyre::bail!("motion.port must not be empty");
        }
        if self.motion.baud_rate == 0 {
            eyre::bail!("motion.baud_rate must be > 0");
        }
        if self.motion.read_timeout_ms == 0 {
            eyre::bail!("motion.read_timeout_ms must be >= 1");
        }
        if self.motion.response_timeout_ms < self.motion.read_timeout_ms {
            eyre::bail!("motion.response_timeout_ms must be >= motion.read_timeout_ms");
        }
        if self.motion.default_rate == 0 {
            eyre::bail!("motion.default_rate must be > 0");
        }

        // Recovery
        if self.recovery.max_attempts == 0 {
            eyre::bail!("recovery.max_attempts must be >= 1");
        }
        if self.recovery.max_attempts > 2 {
            eyre::bail!("recovery.max_attempts must be <= 2 (one reopen-and-retry)");
        }

        // Axes
        if self.axes.is_empty() {
            eyre::bail!("at least one [[axes]] entry is required");
        }
        let mut seen = Vec::with_capacity(self.axes.len());
        for axis in &self.axes {
            let mut chars = axis.name.chars();
            let valid_name = matches!(
                (chars.next(), chars.next()),
                (Some(c), None) if c.is_ascii_alphabetic()
            );
            if !valid_name {
                eyre::bail!("axis name '{}' must be a single ASCII letter", axis.name);
            }
            let upper = axis.name.to_ascii_uppercase();
            if seen.contains(&upper) {
                eyre::bail!("axis '{}' is configured twice", upper);
            }
            if !(axis.steps_per_unit.is_finite() && axis.steps_per_unit > 0.0) {
                eyre::bail!("axis {} steps_per_unit must be > 0", upper);
            }
            seen.push(upper);
        }

        // Scale
        if self.scale.port.trim().is_empty() {
            eyre::bail!("scale.port must not be empty");
        }
        if self.scale.baud_rate == 0 {
            eyre::bail!("scale.baud_rate must be > 0");
        }
        if self.scale.read_timeout_ms == 0 {
            eyre::bail!("scale.read_timeout_ms must be >= 1");
        }

        // Stabilization
        if self.stabilize.window == 0 {
            eyre::bail!("stabilize.window must be >= 1");
        }
        if !(self.stabilize.threshold.is_finite() && self.stabilize.threshold > 0.0) {
            eyre::bail!("stabilize.threshold must be > 0");
        }
        if self.stabilize.timeout_ms == 0 {
            eyre::bail!("stabilize.timeout_ms must be >= 1");
        }
        if self.stabilize.poll_ms == 0 {
            eyre::bail!("stabilize.poll_ms must be >= 1");
        }
        if self.stabilize.poll_ms > self.stabilize.timeout_ms {
            eyre::bail!("stabilize.poll_ms must not exceed stabilize.timeout_ms");
        }
        if self.stabilize.sample_hz == 0 {
            eyre::bail!("stabilize.sample_hz must be > 0");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}
