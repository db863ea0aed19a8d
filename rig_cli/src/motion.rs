//! Motion subcommands: connect, run one command, shut the link down.

use std::time::Duration;

use eyre::{Result, WrapErr};
use rig_config::Config;
use rig_core::builder::Set;
use rig_core::{AxisId, LineKind, MotionPlanner, Positioning, ProtocolSettings, RigBuilder, RigError};
use rig_hardware::SimulatedMarlin;
use rig_traits::Connector;
use serde_json::json;

use crate::cli::{Assignment, Commands};
use crate::output::{emit, positions_json, positions_line};

/// Simulated board whose axes match the configured set, so position
/// reports parse the same way a real board's would.
pub fn sim_machine(cfg: &Config) -> SimulatedMarlin {
    let machine = SimulatedMarlin::with_axes(
        cfg.axes
            .iter()
            .filter_map(|a| a.name.chars().next().map(|c| (c, a.steps_per_unit))),
    );
    // Fault injection for CLI tests: fail this many writes before accepting data.
    if let Some(n) = std::env::var("RIG_SIM_FAIL_WRITES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
    {
        machine.fail_next_writes(n);
    }
    machine
}

fn builder(cfg: &Config, cmd: &Commands) -> Result<RigBuilder<rig_core::builder::NoConnector, Set>> {
    let mut settings = ProtocolSettings::from(&cfg.motion);
    // Switching the drivers on is pointless if shutdown switches them off again.
    if matches!(cmd, Commands::Enable) {
        settings.disable_on_shutdown = false;
    }
    let b = RigBuilder::from_config(cfg)
        .map_err(RigError::from)?
        .with_settings(settings);
    Ok(b)
}

/// Connect to the configured motion backend and run `cmd` against it.
pub fn run(cfg: &Config, sim: bool, cmd: &Commands) -> Result<()> {
    let b = builder(cfg, cmd)?;
    if sim {
        // The simulator has no reset-on-open to wait for.
        let b = b.startup_delay(Duration::ZERO).with_connector(sim_machine(cfg));
        return run_with(b, cfg, cmd);
    }

    #[cfg(feature = "hardware")]
    {
        let connector = rig_hardware::SerialConnector::new(
            cfg.motion.port.clone(),
            cfg.motion.baud_rate,
            Duration::from_millis(cfg.motion.read_timeout_ms),
        );
        run_with(b.with_connector(connector), cfg, cmd)
    }
    #[cfg(not(feature = "hardware"))]
    {
        eyre::bail!(
            "serial backend for {} needs the hardware feature; pass --sim to use the simulator",
            cfg.motion.port
        )
    }
}

fn run_with<C: Connector>(b: RigBuilder<C, Set>, cfg: &Config, cmd: &Commands) -> Result<()> {
    let mut planner = b.build().wrap_err("connect to motion controller")?;
    let res = dispatch(&mut planner, cfg, cmd);
    let closed = planner.shutdown();
    res?;
    closed.wrap_err("close motion link")?;
    Ok(())
}

fn parse_axes(names: &[String]) -> Result<Vec<AxisId>, RigError> {
    names.iter().map(|n| n.parse::<AxisId>()).collect()
}

fn parse_assignments(values: &[Assignment]) -> Result<Vec<(AxisId, f64)>, RigError> {
    values
        .iter()
        .map(|a| a.axis.parse::<AxisId>().map(|id| (id, a.value)))
        .collect()
}

fn dispatch<C: Connector>(
    planner: &mut MotionPlanner<C>,
    cfg: &Config,
    cmd: &Commands,
) -> Result<()> {
    match cmd {
        Commands::Move { axis, steps, rate } => {
            let axis: AxisId = axis.parse()?;
            let rate = rate.unwrap_or(cfg.motion.default_rate);
            let distance = planner.move_by_steps(axis, *steps, rate)?;
            planner.protocol_mut().wait_for_moves()?;
            let state = planner.query_position()?;
            emit(
                json!({
                    "command": "move",
                    "axis": axis.to_string(),
                    "steps": steps,
                    "distance": distance,
                    "positions": positions_json(&state),
                }),
                || format!("moved {axis} by {steps} steps ({distance:.4})\n{}", positions_line(&state)),
            );
        }
        Commands::MoveTo {
            targets,
            rate,
            no_wait,
        } => {
            let targets = parse_assignments(targets)?;
            let rate = rate.unwrap_or(cfg.motion.default_rate);
            let p = planner.protocol_mut();
            let mut tools: Vec<u8> = Vec::new();
            for (axis, _) in &targets {
                if let Some(tool) = p.axes().require(*axis)?.tool
                    && !tools.contains(&tool)
                {
                    tools.push(tool);
                }
            }
            // One tool per move; with several the protocol refuses the move.
            if let [tool] = tools.as_slice() {
                p.select_tool(*tool)?;
            }
            p.set_positioning(Positioning::Absolute)?;
            p.move_to(targets.iter().copied(), rate)?;
            if !no_wait {
                p.wait_for_moves()?;
            }
            let state = p.query_position()?;
            emit(
                json!({ "command": "move-to", "positions": positions_json(&state) }),
                || positions_line(&state),
            );
        }
        Commands::Position => {
            let state = planner.query_position()?;
            emit(
                json!({ "command": "position", "positions": positions_json(&state) }),
                || positions_line(&state),
            );
        }
        Commands::SetPosition {
            values,
            keep_others,
        } => {
            let values = parse_assignments(values)?;
            let p = planner.protocol_mut();
            let state = if *keep_others {
                for (axis, v) in &values {
                    p.set_axis_position(*axis, *v)?;
                }
                p.query_position()?
            } else {
                p.set_current_position(values.iter().copied())?
            };
            emit(
                json!({ "command": "set-position", "positions": positions_json(&state) }),
                || positions_line(&state),
            );
        }
        Commands::Home { axes, no_wait } => {
            let axes = parse_axes(axes)?;
            let p = planner.protocol_mut();
            p.home(&axes, !no_wait)?;
            let state = p.motor_state();
            emit(
                json!({ "command": "home", "positions": positions_json(&state) }),
                || format!("homed\n{}", positions_line(&state)),
            );
        }
        Commands::Enable => {
            planner.protocol_mut().enable_steppers()?;
            emit(json!({ "command": "enable", "steppers": "on" }), || {
                "steppers enabled".to_string()
            });
        }
        Commands::Disable => {
            planner.protocol_mut().disable_steppers()?;
            emit(json!({ "command": "disable", "steppers": "off" }), || {
                "steppers disabled".to_string()
            });
        }
        Commands::Send { line } => {
            let lines = planner.protocol_mut().send_raw(line)?;
            let response: Vec<_> = lines
                .iter()
                .map(|l| json!({ "kind": kind_name(l.kind), "text": l.text }))
                .collect();
            emit(
                json!({ "command": "send", "line": line, "response": response }),
                || {
                    lines
                        .iter()
                        .map(|l| l.text.as_str())
                        .collect::<Vec<_>>()
                        .join("\n")
                },
            );
        }
        Commands::Weigh { .. } | Commands::Watch { .. } | Commands::SelfCheck => {
            eyre::bail!("not a motion command")
        }
    }
    Ok(())
}

fn kind_name(kind: LineKind) -> &'static str {
    match kind {
        LineKind::Terminal => "terminal",
        LineKind::Continuation => "continuation",
        LineKind::Telemetry => "telemetry",
        LineKind::Plain => "plain",
    }
}

/// Connect, read the position once and disconnect. Used by `self-check`.
pub fn probe(cfg: &Config, sim: bool) -> Result<(String, usize)> {
    let b = RigBuilder::from_config(cfg).map_err(RigError::from)?;
    if sim {
        let b = b.startup_delay(Duration::ZERO).with_connector(sim_machine(cfg));
        return probe_with(b);
    }

    #[cfg(feature = "hardware")]
    {
        let connector = rig_hardware::SerialConnector::new(
            cfg.motion.port.clone(),
            cfg.motion.baud_rate,
            Duration::from_millis(cfg.motion.read_timeout_ms),
        );
        probe_with(b.with_connector(connector))
    }
    #[cfg(not(feature = "hardware"))]
    {
        eyre::bail!(
            "serial backend for {} needs the hardware feature; pass --sim to use the simulator",
            cfg.motion.port
        )
    }
}

fn probe_with<C: Connector>(b: RigBuilder<C, Set>) -> Result<(String, usize)> {
    let mut planner = b.build().wrap_err("connect to motion controller")?;
    let target = planner.protocol().target();
    let axes = planner.protocol().axes().len();
    let res = planner.query_position();
    let closed = planner.shutdown();
    res?;
    closed.wrap_err("close motion link")?;
    Ok((target, axes))
}
