//! Scale subcommands: one settled reading, or a continuous stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eyre::Result;
use rig_config::Config;
use rig_core::{RigError, Sampler, ScaleReader, StabilizationDetector, StabilizeParams};
use rig_hardware::SimulatedScaleLink;
use rig_traits::clock::{Clock, MonotonicClock};
use rig_traits::{MeasurementSource, Transport};
use serde_json::json;

use crate::error_fmt::NotSettled;
use crate::output::emit;

/// Mass the simulated balance settles on unless `RIG_SIM_MASS` says otherwise.
const SIM_MASS: f64 = 100.0;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn sim_scale() -> SimulatedScaleLink {
    let link = SimulatedScaleLink::new(0.0, env_parse("RIG_SIM_MASS").unwrap_or(SIM_MASS));
    match env_parse::<u64>("RIG_SIM_GARBLE") {
        Some(n) => link.garble_every(n),
        None => link,
    }
}

/// Open the scale's byte stream: the simulator, or the configured port.
pub fn open_scale(cfg: &Config, sim: bool) -> Result<Box<dyn Transport>> {
    if sim {
        return Ok(Box::new(sim_scale()));
    }

    #[cfg(feature = "hardware")]
    {
        use rig_traits::Connector;
        let connector = rig_hardware::SerialConnector::new(
            cfg.scale.port.clone(),
            cfg.scale.baud_rate,
            Duration::from_millis(cfg.scale.read_timeout_ms),
        )
        .with_open_delay(Duration::from_millis(cfg.scale.open_delay_ms));
        let transport = connector
            .open()
            .map_err(|e| eyre::eyre!("open scale {}: {e}", connector.target()))?;
        tracing::info!(target = %connector.target(), "scale open");
        Ok(Box::new(transport))
    }
    #[cfg(not(feature = "hardware"))]
    {
        eyre::bail!(
            "serial backend for {} needs the hardware feature; pass --sim to use the simulator",
            cfg.scale.port
        )
    }
}

fn detector(params: StabilizeParams) -> Result<StabilizationDetector> {
    StabilizationDetector::new(params).map_err(|e| eyre::Report::new(RigError::from(e)))
}

pub fn weigh(cfg: &Config, sim: bool, timeout_ms: Option<u64>, strict: bool) -> Result<()> {
    let mut params = StabilizeParams::from(&cfg.stabilize);
    if let Some(ms) = timeout_ms {
        params.timeout = Duration::from_millis(ms);
    }
    let det = detector(params)?;
    let transport = open_scale(cfg, sim)?;
    let r = det.await_stable(ScaleReader::new(transport));
    let elapsed_ms = rig_core::util::as_millis_u64(r.elapsed);

    if strict && !r.converged() {
        return Err(NotSettled {
            value: r.value,
            waited_ms: elapsed_ms,
        }
        .into());
    }
    emit(
        json!({
            "command": "weigh",
            "value": r.value,
            "converged": r.converged(),
            "samples": r.samples,
            "failures": r.failures,
            "elapsed_ms": elapsed_ms,
        }),
        || {
            let note = if r.converged() { "stable" } else { "timed out, window mean" };
            format!("{:.4} ({note}, {} samples)", r.value, r.samples)
        },
    );
    Ok(())
}

/// Stream readings through the background sampler until Ctrl-C or `count`.
pub fn watch(cfg: &Config, sim: bool, count: Option<u64>) -> Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
        tracing::warn!(error = %e, "failed to install Ctrl-C handler");
    }

    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let transport = open_scale(cfg, sim)?;
    let hz = cfg.stabilize.sample_hz;
    let mut sampler = Sampler::spawn(ScaleReader::new(transport), hz, clock);
    let idle = Duration::from_millis(rig_core::util::period_ms(hz));
    let stall_ms = cfg.stabilize.timeout_ms;
    let mut stall_reported = false;
    let mut seen = 0u64;

    while !stop.load(Ordering::Relaxed) && count.is_none_or(|n| seen < n) {
        match sampler.try_read() {
            Ok(Some(v)) => {
                seen += 1;
                stall_reported = false;
                emit(json!({ "command": "watch", "seq": seen, "value": v }), || {
                    format!("{v:.4}")
                });
            }
            Ok(None) => {
                if !stall_reported && sampler.stalled_for() > stall_ms {
                    tracing::warn!(
                        stalled_ms = sampler.stalled_for(),
                        failures = sampler.failures(),
                        "no scale readings"
                    );
                    stall_reported = true;
                }
                std::thread::sleep(idle);
            }
            Err(e) => return Err(eyre::eyre!("scale sampler stopped: {e}")),
        }
    }
    tracing::info!(readings = seen, failures = sampler.failures(), "watch finished");
    Ok(())
}

/// Open the scale and wait for the first parseable reading.
pub fn probe(cfg: &Config, sim: bool) -> Result<f64> {
    let params = StabilizeParams {
        window: 1,
        ..StabilizeParams::from(&cfg.stabilize)
    };
    let det = detector(params)?;
    let transport = open_scale(cfg, sim)?;
    let r = det.await_stable(ScaleReader::new(transport));
    if r.samples == 0 {
        eyre::bail!(
            "open scale: no readings within {} ms ({} unparseable lines)",
            cfg.stabilize.timeout_ms,
            r.failures
        );
    }
    Ok(r.value)
}
