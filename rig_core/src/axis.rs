//! Axis identifiers, per-axis conversion factors and the tracked position map.

use std::fmt;
use std::str::FromStr;

use crate::error::{BuildError, RigError};

/// One controllable degree of freedom, named by the letter the firmware uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AxisId(char);

impl AxisId {
    /// Accepts a single ASCII letter in either case.
    pub fn new(c: char) -> Option<Self> {
        c.is_ascii_alphabetic().then(|| Self(c.to_ascii_uppercase()))
    }

    #[inline]
    pub fn letter(self) -> char {
        self.0
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AxisId {
    type Err = RigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => AxisId::new(c).ok_or_else(|| RigError::InvalidAxis(s.to_string())),
            _ => Err(RigError::InvalidAxis(s.to_string())),
        }
    }
}

/// Static description of a configured axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisSpec {
    pub id: AxisId,
    /// Motor steps per unit of travel (mm for linear axes). Always > 0.
    pub steps_per_unit: f64,
    /// Tool that must be selected before this axis moves (extruders).
    pub tool: Option<u8>,
}

impl AxisSpec {
    pub fn linear(id: AxisId, steps_per_unit: f64) -> Self {
        Self {
            id,
            steps_per_unit,
            tool: None,
        }
    }

    pub fn tool_scoped(id: AxisId, steps_per_unit: f64, tool: u8) -> Self {
        Self {
            id,
            steps_per_unit,
            tool: Some(tool),
        }
    }

    #[inline]
    pub fn is_tool_scoped(&self) -> bool {
        self.tool.is_some()
    }
}

/// The active axis configuration, in firmware order. The first axis is the
/// primary one: telemetry lines are recognized by its `NAME:` prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisSet {
    axes: Vec<AxisSpec>,
}

impl AxisSet {
    pub fn new(axes: Vec<AxisSpec>) -> Result<Self, BuildError> {
        if axes.is_empty() {
            return Err(BuildError::MissingAxes);
        }
        for (i, a) in axes.iter().enumerate() {
            if !(a.steps_per_unit.is_finite() && a.steps_per_unit > 0.0) {
                return Err(BuildError::InvalidConfig("steps_per_unit must be > 0"));
            }
            if axes[..i].iter().any(|b| b.id == a.id) {
                return Err(BuildError::InvalidConfig("duplicate axis identifier"));
            }
        }
        Ok(Self { axes })
    }

    /// Nine linear axes (80 steps/mm) plus extruder E on tool 0 (500 steps/mm).
    pub fn marlin_default() -> Self {
        let mut axes: Vec<AxisSpec> = "XYZIJKUVW"
            .chars()
            .filter_map(AxisId::new)
            .map(|id| AxisSpec::linear(id, 80.0))
            .collect();
        if let Some(e) = AxisId::new('E') {
            axes.push(AxisSpec::tool_scoped(e, 500.0, 0));
        }
        Self { axes }
    }

    pub fn primary(&self) -> AxisId {
        // Non-empty by construction.
        self.axes[0].id
    }

    pub fn get(&self, id: AxisId) -> Option<&AxisSpec> {
        self.axes.iter().find(|a| a.id == id)
    }

    /// Look up a configured axis or fail with `InvalidAxis`.
    pub fn require(&self, id: AxisId) -> Result<&AxisSpec, RigError> {
        self.get(id)
            .ok_or_else(|| RigError::InvalidAxis(id.to_string()))
    }

    pub fn contains(&self, id: AxisId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AxisSpec> {
        self.axes.iter()
    }

    pub fn len(&self) -> usize {
        self.axes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }
}

/// Last known position of every configured axis, in physical units.
///
/// The device is authoritative: values change only through explicit position
/// overrides or parsed telemetry, never from a requested move distance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MotorState {
    /// In configured axis order.
    positions: Vec<(AxisId, f64)>,
}

impl MotorState {
    /// All configured axes at zero.
    pub fn zeroed(axes: &AxisSet) -> Self {
        Self {
            positions: axes.iter().map(|a| (a.id, 0.0)).collect(),
        }
    }

    pub fn get(&self, id: AxisId) -> Option<f64> {
        self.positions
            .iter()
            .find(|(axis, _)| *axis == id)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AxisId, f64)> + '_ {
        self.positions.iter().copied()
    }

    /// Only axes already tracked are updated; unknown axes are ignored.
    pub(crate) fn set(&mut self, id: AxisId, value: f64) -> bool {
        match self.positions.iter_mut().find(|(axis, _)| *axis == id) {
            Some((_, slot)) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}
