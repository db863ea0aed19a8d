//! Request/response driver for the motion controller.
//!
//! One command is in flight at a time: `send` writes a line and blocks until
//! the device answers with a terminal `ok`, folding any position telemetry
//! into `MotorState` on the way. The typed operations are thin templates over
//! `send`.

use std::sync::Arc;
use std::time::Duration;

use rig_traits::Connector;
use rig_traits::clock::Clock;

use crate::axis::{AxisId, AxisSet, MotorState};
use crate::command::{Command, LineEnding, Positioning};
use crate::error::{Result, RigError};
use crate::framing::{LineFramer, LineKind, ResponseLine, apply_telemetry, classify};
use crate::recovery::ConnectionRecovery;
use crate::util::as_millis_u64;

/// Protocol knobs that do not belong to the link itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolSettings {
    pub line_ending: LineEnding,
    /// Total budget for a terminal line, counted from when the command is on
    /// the wire. Continuation lines do not extend it.
    pub response_timeout: Duration,
    /// Send M18 from `shutdown`.
    pub disable_on_shutdown: bool,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            line_ending: LineEnding::CrLf,
            response_timeout: Duration::from_secs(30),
            disable_on_shutdown: true,
        }
    }
}

/// Modal state the device was told during the current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Session {
    pub generation: u64,
    pub positioning: Option<Positioning>,
    pub tool: Option<u8>,
}

pub struct CommandProtocol<C: Connector> {
    link: ConnectionRecovery<C>,
    axes: AxisSet,
    state: MotorState,
    session: Session,
    framer: LineFramer,
    settings: ProtocolSettings,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl<C: Connector> CommandProtocol<C> {
    pub fn new(
        link: ConnectionRecovery<C>,
        axes: AxisSet,
        settings: ProtocolSettings,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let state = MotorState::zeroed(&axes);
        let session = Session {
            generation: link.generation(),
            ..Session::default()
        };
        Self {
            link,
            axes,
            state,
            session,
            framer: LineFramer::new(),
            settings,
            clock,
        }
    }

    pub fn axes(&self) -> &AxisSet {
        &self.axes
    }

    /// Snapshot of the last known positions.
    pub fn motor_state(&self) -> MotorState {
        self.state.clone()
    }

    pub fn session(&self) -> Session {
        self.session
    }

    pub fn settings(&self) -> ProtocolSettings {
        self.settings
    }

    pub fn target(&self) -> String {
        self.link.target()
    }

    /// Write `cmd` and collect its response up to and including the terminal line.
    pub fn send(&mut self, cmd: &Command) -> Result<Vec<ResponseLine>> {
        self.framer.reset();
        self.link
            .write(&cmd.encode(self.settings.line_ending), cmd.is_retryable())?;
        self.sync_session();
        tracing::debug!(command = cmd.line(), "sent");

        let lines = self.collect_response(cmd).inspect_err(|_| self.framer.reset())?;
        self.note_modal(cmd.line());
        Ok(lines)
    }

    /// Send an arbitrary line through the same framing. Motion words
    /// (G0/G1/G2/G3) are never retried after a reconnect.
    pub fn send_raw(&mut self, line: &str) -> Result<Vec<ResponseLine>> {
        let line = line.trim();
        if line.is_empty() {
            return Err(RigError::State("refusing to send an empty line".to_string()));
        }
        let word = line.split_whitespace().next().unwrap_or_default();
        let cmd = if is_motion_word(word) {
            Command::once(line)
        } else {
            Command::new(line)
        };
        self.send(&cmd)
    }

    fn collect_response(&mut self, cmd: &Command) -> Result<Vec<ResponseLine>> {
        let primary = self.axes.primary();
        let mut lines = Vec::new();
        let started = self.clock.now();
        let mut buf = [0u8; 256];
        loop {
            while let Some(raw) = self.framer.next_line() {
                let text = raw.trim();
                if text.is_empty() {
                    continue;
                }
                let kind = classify(text, primary);
                match kind {
                    LineKind::Telemetry => {
                        let n = apply_telemetry(text, &self.axes, &mut self.state);
                        tracing::trace!(line = text, updated = n, "telemetry");
                    }
                    LineKind::Continuation | LineKind::Terminal | LineKind::Plain => {
                        tracing::trace!(line = text, "received");
                    }
                }
                lines.push(ResponseLine {
                    kind,
                    text: text.to_string(),
                });
                if kind == LineKind::Terminal {
                    return Ok(lines);
                }
            }

            if self.clock.expired(started, self.settings.response_timeout) {
                tracing::error!(command = cmd.line(), lines = lines.len(), "response timed out");
                return Err(RigError::ProtocolTimeout {
                    command: cmd.line().to_string(),
                    waited_ms: as_millis_u64(self.clock.elapsed(started)),
                });
            }
            let n = self.link.read(&mut buf)?;
            self.framer.push(&buf[..n]);
        }
    }

    /// A new link generation means the board may have reset.
    fn sync_session(&mut self) {
        let generation = self.link.generation();
        if generation != self.session.generation {
            tracing::warn!(generation, "new link session; positioning mode and tool are unknown");
            self.session = Session {
                generation,
                ..Session::default()
            };
        }
    }

    /// Track G90/G91/Tn however they were sent.
    fn note_modal(&mut self, line: &str) {
        let word = line.split_whitespace().next().unwrap_or_default();
        match word.to_ascii_uppercase().as_str() {
            "G90" => self.session.positioning = Some(Positioning::Absolute),
            "G91" => self.session.positioning = Some(Positioning::Relative),
            w => {
                if let Some(tool) = w.strip_prefix('T').and_then(|n| n.parse::<u8>().ok()) {
                    self.session.tool = Some(tool);
                }
            }
        }
    }

    pub fn enable_steppers(&mut self) -> Result<()> {
        self.send(&Command::enable_steppers()).map(drop)
    }

    pub fn disable_steppers(&mut self) -> Result<()> {
        self.send(&Command::disable_steppers()).map(drop)
    }

    pub fn set_positioning(&mut self, mode: Positioning) -> Result<()> {
        self.send(&Command::positioning(mode)).map(drop)
    }

    /// Select the active tool. Cheap enough to call before every tool move.
    pub fn select_tool(&mut self, index: u8) -> Result<()> {
        self.send(&Command::select_tool(index)).map(drop)
    }

    /// Override the position of every configured axis (unlisted axes become 0),
    /// then query the device to confirm.
    pub fn set_current_position<I>(&mut self, values: I) -> Result<MotorState>
    where
        I: IntoIterator<Item = (AxisId, f64)>,
    {
        let mut target = MotorState::zeroed(&self.axes);
        for (axis, value) in values {
            self.axes.require(axis)?;
            target.set(axis, value);
        }
        self.send(&Command::set_position(target.iter()))?;
        self.state = target;
        self.query_position()
    }

    /// Override a single axis, e.g. zero the extruder without homing.
    pub fn set_axis_position(&mut self, axis: AxisId, value: f64) -> Result<()> {
        self.axes.require(axis)?;
        self.send(&Command::set_position([(axis, value)]))?;
        self.state.set(axis, value);
        Ok(())
    }

    /// Move one axis by a signed distance.
    ///
    /// Relative mode must be active in the current session, and a tool-scoped
    /// axis needs its tool selected; otherwise nothing is sent.
    pub fn move_relative(&mut self, axis: AxisId, distance: f64, rate: u32) -> Result<()> {
        let spec = *self.axes.require(axis)?;
        if self.session.positioning != Some(Positioning::Relative) {
            return Err(RigError::State(format!(
                "relative positioning is not active; refusing to move {axis}"
            )));
        }
        if let Some(tool) = spec.tool
            && self.session.tool != Some(tool)
        {
            return Err(RigError::State(format!(
                "tool {tool} is not selected; refusing to move {axis}"
            )));
        }
        self.send(&Command::linear_move(axis, distance, rate)).map(drop)
    }

    /// Move the listed axes to absolute targets. Absolute mode must be active.
    pub fn move_to<I>(&mut self, targets: I, rate: u32) -> Result<()>
    where
        I: IntoIterator<Item = (AxisId, f64)>,
    {
        let targets: Vec<(AxisId, f64)> = targets.into_iter().collect();
        if targets.is_empty() {
            return Err(RigError::State("move_to needs at least one axis".to_string()));
        }
        for (axis, _) in &targets {
            let spec = self.axes.require(*axis)?;
            if let Some(tool) = spec.tool
                && self.session.tool != Some(tool)
            {
                return Err(RigError::State(format!(
                    "tool {tool} is not selected; refusing to move {axis}"
                )));
            }
        }
        if self.session.positioning != Some(Positioning::Absolute) {
            return Err(RigError::State(
                "absolute positioning is not active; refusing absolute move".to_string(),
            ));
        }
        self.send(&Command::linear_move_many(targets, rate)).map(drop)
    }

    /// Ask the device for its position and return the refreshed snapshot.
    pub fn query_position(&mut self) -> Result<MotorState> {
        self.send(&Command::report_position())?;
        Ok(self.state.clone())
    }

    /// Home the given axes (all homeable axes when empty), optionally wait for
    /// motion to finish, then refresh positions.
    ///
    /// Tool-scoped axes have no endstop and are skipped; a list naming only
    /// tool axes sends nothing.
    pub fn home(&mut self, axes: &[AxisId], wait: bool) -> Result<Vec<ResponseLine>> {
        let mut selected = Vec::with_capacity(axes.len());
        for &axis in axes {
            if self.axes.require(axis)?.is_tool_scoped() {
                tracing::warn!(%axis, "tool axis has no endstop; not homing it");
            } else if !selected.contains(&axis) {
                selected.push(axis);
            }
        }
        if selected.is_empty() && !axes.is_empty() {
            // A bare G28 would home every axis.
            return Ok(Vec::new());
        }
        let resp = self.send(&Command::home(&selected))?;
        if wait {
            self.wait_for_moves()?;
        }
        self.query_position()?;
        Ok(resp)
    }

    /// Block until queued motion completes (M400).
    pub fn wait_for_moves(&mut self) -> Result<()> {
        self.send(&Command::finish_moves()).map(drop)
    }

    pub fn set_software_endstops(&mut self, enabled: bool) -> Result<()> {
        self.send(&Command::software_endstops(enabled)).map(drop)
    }

    /// Optionally de-energize the steppers, then close the link.
    pub fn shutdown(mut self) -> Result<()> {
        let res = if self.settings.disable_on_shutdown {
            self.disable_steppers()
        } else {
            Ok(())
        };
        self.link.close();
        res
    }
}

fn is_motion_word(word: &str) -> bool {
    matches!(
        word.to_ascii_uppercase().as_str(),
        "G0" | "G00" | "G1" | "G01" | "G2" | "G02" | "G3" | "G03"
    )
}
