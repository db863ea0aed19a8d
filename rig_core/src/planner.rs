//! Step-count motion on top of the command protocol.

use rig_traits::Connector;

use crate::axis::{AxisId, MotorState};
use crate::command::Positioning;
use crate::error::Result;
use crate::protocol::CommandProtocol;

/// Physical distance for a signed step count.
#[inline]
pub fn steps_to_distance(steps: i64, steps_per_unit: f64) -> f64 {
    steps as f64 / steps_per_unit
}

/// Issues moves in motor steps and owns the ordering that makes them safe:
/// select the owning tool, then relative mode, then the move.
///
/// Travel limits are not checked here; endstops are the firmware's job.
pub struct MotionPlanner<C: Connector> {
    protocol: CommandProtocol<C>,
}

impl<C: Connector> MotionPlanner<C> {
    pub fn new(protocol: CommandProtocol<C>) -> Self {
        Self { protocol }
    }

    pub fn protocol(&self) -> &CommandProtocol<C> {
        &self.protocol
    }

    pub fn protocol_mut(&mut self) -> &mut CommandProtocol<C> {
        &mut self.protocol
    }

    pub fn into_protocol(self) -> CommandProtocol<C> {
        self.protocol
    }

    /// Move `axis` by `steps` motor steps at `rate`; returns the distance sent.
    pub fn move_by_steps(&mut self, axis: AxisId, steps: i64, rate: u32) -> Result<f64> {
        let spec = *self.protocol.axes().require(axis)?;
        let distance = steps_to_distance(steps, spec.steps_per_unit);
        tracing::info!(%axis, steps, distance, rate, "move by steps");
        self.move_by_distance(axis, distance, rate)?;
        Ok(distance)
    }

    /// Move `axis` by a signed physical distance at `rate`.
    pub fn move_by_distance(&mut self, axis: AxisId, distance: f64, rate: u32) -> Result<()> {
        let spec = *self.protocol.axes().require(axis)?;
        // A reconnect inside the preamble wipes the modes it set; run it
        // again on the new link. A second reconnect leaves the move refused.
        for _ in 0..2 {
            let generation = self.protocol.session().generation;
            if let Some(tool) = spec.tool {
                self.protocol.select_tool(tool)?;
            }
            self.protocol.set_positioning(Positioning::Relative)?;
            if self.protocol.session().generation == generation {
                break;
            }
            tracing::info!(%axis, "link reopened during move setup; selecting modes again");
        }
        self.protocol.move_relative(axis, distance, rate)
    }

    pub fn query_position(&mut self) -> Result<MotorState> {
        self.protocol.query_position()
    }

    pub fn shutdown(self) -> Result<()> {
        self.protocol.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::{AxisSet, AxisSpec};
    use crate::error::RigError;
    use crate::mocks::{ScriptedConnector, ScriptedDevice};
    use crate::protocol::ProtocolSettings;
    use crate::recovery::{ConnectionRecovery, RetryPolicy};
    use rig_traits::clock::Clock;
    use rig_traits::clock::test_clock::TestClock;
    use std::sync::Arc;

    fn id(c: char) -> AxisId {
        AxisId::new(c).unwrap()
    }

    fn planner(device: &ScriptedDevice) -> MotionPlanner<ScriptedConnector> {
        let clock: Arc<dyn Clock + Send + Sync> = Arc::new(TestClock::new());
        let link = ConnectionRecovery::open(device.connector(), RetryPolicy::default(), clock.clone())
            .unwrap();
        let axes = AxisSet::new(vec![
            AxisSpec::linear(id('I'), 80.0),
            AxisSpec::linear(id('Z'), 400.0),
            AxisSpec::tool_scoped(id('E'), 500.0, 0),
        ])
        .unwrap();
        MotionPlanner::new(CommandProtocol::new(
            link,
            axes,
            ProtocolSettings::default(),
            clock,
        ))
    }

    #[test]
    fn linear_axis_move_sets_relative_mode_first() {
        let device = ScriptedDevice::new();
        let mut p = planner(&device);

        let d = p.move_by_steps(id('I'), 400_000, 2000).unwrap();

        assert_eq!(d, 5000.0);
        assert_eq!(device.written_lines(), vec!["G91", "G1 I5000.0000 F2000"]);
    }

    #[test]
    fn tool_axis_selects_tool_then_relative_mode() {
        let device = ScriptedDevice::new();
        let mut p = planner(&device);

        p.move_by_steps(id('E'), -250, 300).unwrap();

        assert_eq!(device.written_lines(), vec!["T0", "G91", "G1 E-0.5000 F300"]);
    }

    #[test]
    fn reconnect_before_mode_switch_redoes_setup() {
        let device = ScriptedDevice::new();
        let mut p = planner(&device);
        device.fail_next_write_of("G91");

        p.move_by_steps(id('E'), 500, 300).unwrap();

        assert_eq!(device.opens(), 2);
        assert_eq!(
            device.written_lines(),
            vec!["T0", "G91", "T0", "G91", "G1 E1.0000 F300"]
        );
    }

    #[test]
    fn reconnect_on_tool_select_keeps_the_new_session() {
        let device = ScriptedDevice::new();
        let mut p = planner(&device);
        device.fail_next_write_of("T0");

        p.move_by_steps(id('E'), -250, 300).unwrap();

        assert_eq!(device.opens(), 2);
        assert_eq!(p.protocol().session().tool, Some(0));
        assert_eq!(
            device.written_lines().last().map(String::as_str),
            Some("G1 E-0.5000 F300")
        );
    }

    #[test]
    fn unknown_axis_is_rejected_before_any_command() {
        let device = ScriptedDevice::new();
        let mut p = planner(&device);

        let err = p.move_by_steps(id('X'), 10, 100).unwrap_err();

        assert_eq!(err, RigError::InvalidAxis("X".to_string()));
        assert!(device.written_lines().is_empty());
    }

    #[test]
    fn failed_mode_switch_does_not_move() {
        let device = ScriptedDevice::new();
        let mut p = planner(&device);
        device.fail_next_writes(2);

        let err = p.move_by_steps(id('Z'), 400, 100).unwrap_err();

        assert!(matches!(err, RigError::Connection { .. }));
        assert!(device.written_lines().iter().all(|l| !l.starts_with("G1")));
    }
}
