//! Outbound command lines for the motion controller (Marlin G-code dialect).

use std::fmt::Write as _;

use crate::axis::AxisId;

/// Positioning mode selected with G90/G91.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Positioning {
    Absolute,
    Relative,
}

/// Outbound line terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    Lf,
    #[default]
    CrLf,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// One outbound command line.
///
/// `retryable` says whether the line may be written again on a freshly
/// reopened connection. Lines whose meaning depends on modal state the
/// device may have lost on reconnect (moves) are not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    line: String,
    retryable: bool,
}

impl Command {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            retryable: true,
        }
    }

    /// A command that is written at most once.
    pub fn once(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            retryable: false,
        }
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Bytes to write, terminator included.
    pub fn encode(&self, ending: LineEnding) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.line.len() + 2);
        out.extend_from_slice(self.line.trim_end().as_bytes());
        out.extend_from_slice(ending.as_str().as_bytes());
        out
    }

    pub fn enable_steppers() -> Self {
        Self::new("M17")
    }

    pub fn disable_steppers() -> Self {
        Self::new("M18")
    }

    pub fn positioning(mode: Positioning) -> Self {
        match mode {
            Positioning::Absolute => Self::new("G90"),
            Positioning::Relative => Self::new("G91"),
        }
    }

    /// G92 with one `<axis><value>` word per entry.
    pub fn set_position<I>(values: I) -> Self
    where
        I: IntoIterator<Item = (AxisId, f64)>,
    {
        let mut line = String::from("G92");
        for (axis, value) in values {
            let _ = write!(line, " {axis}{value}");
        }
        Self::new(line)
    }

    pub fn select_tool(index: u8) -> Self {
        Self::new(format!("T{index}"))
    }

    /// Linear move of one axis; the distance is interpreted per the active
    /// positioning mode, so the line is never re-sent after a reconnect.
    pub fn linear_move(axis: AxisId, distance: f64, rate: u32) -> Self {
        Self::once(format!("G1 {axis}{distance:.4} F{rate}"))
    }

    /// Linear move of several axes at once (absolute targets in G90).
    pub fn linear_move_many<I>(targets: I, rate: u32) -> Self
    where
        I: IntoIterator<Item = (AxisId, f64)>,
    {
        let mut line = String::from("G1");
        for (axis, value) in targets {
            let _ = write!(line, " {axis}{value}");
        }
        let _ = write!(line, " F{rate}");
        Self::once(line)
    }

    pub fn report_position() -> Self {
        Self::new("M114")
    }

    /// G28 on the listed axes, or on every homeable axis when empty.
    pub fn home(axes: &[AxisId]) -> Self {
        let mut line = String::from("G28");
        for axis in axes {
            let _ = write!(line, " {axis}");
        }
        Self::new(line)
    }

    pub fn finish_moves() -> Self {
        Self::new("M400")
    }

    pub fn software_endstops(enabled: bool) -> Self {
        Self::new(format!("M211 S{}", u8::from(enabled)))
    }
}
