//! Conversions from `rig_config` sections into runtime types.

use std::time::Duration;

use crate::axis::{AxisId, AxisSet, AxisSpec};
use crate::command::{LineEnding, Positioning};
use crate::error::BuildError;
use crate::protocol::ProtocolSettings;
use crate::recovery::RetryPolicy;
use crate::stabilize::StabilizeParams;

impl From<rig_config::LineEnding> for LineEnding {
    fn from(c: rig_config::LineEnding) -> Self {
        match c {
            rig_config::LineEnding::Lf => LineEnding::Lf,
            rig_config::LineEnding::Crlf => LineEnding::CrLf,
        }
    }
}

impl From<rig_config::Positioning> for Positioning {
    fn from(c: rig_config::Positioning) -> Self {
        match c {
            rig_config::Positioning::Absolute => Positioning::Absolute,
            rig_config::Positioning::Relative => Positioning::Relative,
        }
    }
}

impl From<&rig_config::MotionCfg> for ProtocolSettings {
    fn from(c: &rig_config::MotionCfg) -> Self {
        Self {
            line_ending: c.line_ending.into(),
            response_timeout: Duration::from_millis(c.response_timeout_ms),
            disable_on_shutdown: c.disable_on_shutdown,
        }
    }
}

impl From<&rig_config::RecoveryCfg> for RetryPolicy {
    fn from(c: &rig_config::RecoveryCfg) -> Self {
        Self {
            max_attempts: c.max_attempts,
            close_delay: Duration::from_millis(c.close_delay_ms),
            settle_delay: Duration::from_millis(c.settle_delay_ms),
        }
    }
}

impl From<&rig_config::StabilizeCfg> for StabilizeParams {
    fn from(c: &rig_config::StabilizeCfg) -> Self {
        Self {
            window: c.window,
            threshold: c.threshold,
            timeout: Duration::from_millis(c.timeout_ms),
            poll: Duration::from_millis(c.poll_ms),
        }
    }
}

impl TryFrom<&rig_config::AxisCfg> for AxisSpec {
    type Error = BuildError;

    fn try_from(c: &rig_config::AxisCfg) -> Result<Self, Self::Error> {
        let id = c
            .name
            .parse::<AxisId>()
            .map_err(|_| BuildError::InvalidConfig("axis name must be a single letter"))?;
        Ok(Self {
            id,
            steps_per_unit: c.steps_per_unit,
            tool: c.tool,
        })
    }
}

impl TryFrom<&[rig_config::AxisCfg]> for AxisSet {
    type Error = BuildError;

    fn try_from(c: &[rig_config::AxisCfg]) -> Result<Self, Self::Error> {
        let specs = c
            .iter()
            .map(AxisSpec::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        AxisSet::new(specs)
    }
}
