//! In-process stand-ins for the motion controller and the scale.
//!
//! `SimulatedMarlin` answers the G-code subset the driver uses the way a
//! Marlin board does (`ok` terminals, `X:.. Count ..` position reports,
//! `echo:` chatter). `SimulatedScaleLink` streams balance lines that settle
//! exponentially toward a target mass.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard};

use rig_traits::{BoxError, Connector, Transport};

use crate::error::HwError;

#[derive(Debug)]
struct MarlinState {
    /// Axis letter, position, steps per unit (for the `Count` section).
    axes: Vec<(char, f64, f64)>,
    relative: bool,
    tool: u8,
    steppers_on: bool,
    soft_endstops: bool,
    outbound: VecDeque<u8>,
    /// Writes to fail before accepting data again.
    fail_writes: u32,
    opens: u32,
}

/// Simulated Marlin board. Clones share the same machine.
#[derive(Debug, Clone)]
pub struct SimulatedMarlin {
    state: Arc<Mutex<MarlinState>>,
}

impl Default for SimulatedMarlin {
    fn default() -> Self {
        Self::with_axes("XYZIJKUVW".chars().map(|c| (c, 80.0)).chain([('E', 500.0)]))
    }
}

impl SimulatedMarlin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Machine with the given `(letter, steps_per_unit)` axes, in report order.
    pub fn with_axes(axes: impl IntoIterator<Item = (char, f64)>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MarlinState {
                axes: axes
                    .into_iter()
                    .map(|(c, k)| (c.to_ascii_uppercase(), 0.0, k))
                    .collect(),
                relative: false,
                tool: 0,
                steppers_on: false,
                soft_endstops: true,
                outbound: VecDeque::new(),
                fail_writes: 0,
                opens: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MarlinState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn position(&self, axis: char) -> Option<f64> {
        let st = self.lock();
        st.axes
            .iter()
            .find(|(c, _, _)| *c == axis.to_ascii_uppercase())
            .map(|(_, p, _)| *p)
    }

    pub fn steppers_on(&self) -> bool {
        self.lock().steppers_on
    }

    pub fn is_relative(&self) -> bool {
        self.lock().relative
    }

    pub fn tool(&self) -> u8 {
        self.lock().tool
    }

    /// Make the next `n` writes fail, as an unplugged cable would.
    pub fn fail_next_writes(&self, n: u32) {
        self.lock().fail_writes = n;
    }

    pub fn opens(&self) -> u32 {
        self.lock().opens
    }
}

impl Connector for SimulatedMarlin {
    type Transport = SimulatedMarlinLink;

    fn open(&self) -> Result<SimulatedMarlinLink, BoxError> {
        let mut st = self.lock();
        st.opens += 1;
        // A port open resets the board.
        st.relative = false;
        st.tool = 0;
        st.outbound.clear();
        st.outbound.extend(b"start\necho:SIM Marlin ready\n");
        Ok(SimulatedMarlinLink {
            machine: self.clone(),
        })
    }

    fn target(&self) -> String {
        "sim://marlin".to_string()
    }
}

pub struct SimulatedMarlinLink {
    machine: SimulatedMarlin,
}

impl Transport for SimulatedMarlinLink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), BoxError> {
        let mut st = self.machine.lock();
        if st.fail_writes > 0 {
            st.fail_writes -= 1;
            return Err(HwError::Closed.into());
        }
        let text = String::from_utf8_lossy(bytes).into_owned();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let reply = execute(&mut st, line);
            st.outbound.extend(reply.bytes());
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BoxError> {
        let mut st = self.machine.lock();
        let n = buf.len().min(st.outbound.len());
        for (slot, b) in buf.iter_mut().zip(st.outbound.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }

    fn bytes_available(&mut self) -> Result<usize, BoxError> {
        Ok(self.machine.lock().outbound.len())
    }

    fn discard_input(&mut self) -> Result<(), BoxError> {
        self.machine.lock().outbound.clear();
        Ok(())
    }
}

/// `(letter, value)` words following the command word, e.g. `X1.5 F300`.
fn words(rest: &str) -> impl Iterator<Item = (char, Option<f64>)> + '_ {
    rest.split_whitespace().filter_map(|w| {
        let mut chars = w.chars();
        let letter = chars.next()?.to_ascii_uppercase();
        Some((letter, chars.as_str().parse::<f64>().ok()))
    })
}

fn execute(st: &mut MarlinState, line: &str) -> String {
    let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
    let cmd = cmd.to_ascii_uppercase();
    match cmd.as_str() {
        "G90" => st.relative = false,
        "G91" => st.relative = true,
        "M17" => st.steppers_on = true,
        "M18" | "M84" => st.steppers_on = false,
        "M400" => {}
        "G0" | "G1" => {
            let relative = st.relative;
            for (letter, value) in words(rest) {
                let Some(v) = value else { continue };
                if let Some(axis) = st.axes.iter_mut().find(|(c, _, _)| *c == letter) {
                    axis.1 = if relative { axis.1 + v } else { v };
                }
            }
        }
        "G92" => {
            for (letter, value) in words(rest) {
                if let (Some(v), Some(axis)) =
                    (value, st.axes.iter_mut().find(|(c, _, _)| *c == letter))
                {
                    axis.1 = v;
                }
            }
        }
        "G28" => {
            let listed: Vec<char> = words(rest).map(|(c, _)| c).collect();
            for axis in st.axes.iter_mut().filter(|(c, _, _)| *c != 'E') {
                if listed.is_empty() || listed.contains(&axis.0) {
                    axis.1 = 0.0;
                }
            }
            return "echo:busy: processing\nok\n".to_string();
        }
        "M114" => return position_report(st),
        "M211" => {
            if let Some((_, Some(s))) = words(rest).find(|(c, _)| *c == 'S') {
                st.soft_endstops = s != 0.0;
            }
            let state = if st.soft_endstops { "On" } else { "Off" };
            return format!("echo:Soft endstops: {state}\nok\n");
        }
        c if c.starts_with('T') => match c[1..].parse::<u8>() {
            Ok(t) => st.tool = t,
            Err(_) => return format!("echo:Invalid extruder {c}\nok\n"),
        },
        _ => return format!("echo:Unknown command: \"{line}\"\nok\n"),
    }
    "ok\n".to_string()
}

fn position_report(st: &MarlinState) -> String {
    let mut out = String::new();
    for (i, (c, p, _)) in st.axes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{c}:{p:.2}");
    }
    out.push_str(" Count");
    for (c, p, k) in st.axes.iter().filter(|(c, _, _)| *c != 'E') {
        let _ = write!(out, " {c}:{}", (p * k).round() as i64);
    }
    out.push_str("\nok\n");
    out
}

#[derive(Debug)]
struct ScaleState {
    target: f64,
    current: f64,
    /// Fraction of the remaining distance covered per reading.
    rate: f64,
    pending: VecDeque<u8>,
    garble_every: Option<u64>,
    produced: u64,
}

/// A balance streaming `ST,GS,  <mass> g` lines that converge on a target.
///
/// A new line is produced whenever `bytes_available` finds the buffer empty,
/// so every non-blocking poll sees exactly one fresh reading.
#[derive(Debug, Clone)]
pub struct SimulatedScaleLink {
    state: Arc<Mutex<ScaleState>>,
}

impl SimulatedScaleLink {
    pub fn new(start: f64, target: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScaleState {
                target,
                current: start,
                rate: 0.5,
                pending: VecDeque::new(),
                garble_every: None,
                produced: 0,
            })),
        }
    }

    /// Emit an unparseable `ERR` line every `n` readings.
    pub fn garble_every(self, n: u64) -> Self {
        self.lock().garble_every = Some(n.max(1));
        self
    }

    pub fn set_target(&self, target: f64) {
        self.lock().target = target;
    }

    fn lock(&self) -> MutexGuard<'_, ScaleState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl ScaleState {
    fn refill(&mut self) {
        if !self.pending.is_empty() {
            return;
        }
        self.produced += 1;
        if let Some(n) = self.garble_every
            && self.produced % n == 0
        {
            self.pending.extend(b"ERR\r\n");
            return;
        }
        self.current += (self.target - self.current) * self.rate;
        let line = format!("ST,GS,{:>10.4} g\r\n", self.current);
        self.pending.extend(line.bytes());
    }
}

impl Transport for SimulatedScaleLink {
    fn write_all(&mut self, _bytes: &[u8]) -> Result<(), BoxError> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BoxError> {
        let mut st = self.lock();
        let n = buf.len().min(st.pending.len());
        for (slot, b) in buf.iter_mut().zip(st.pending.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }

    fn bytes_available(&mut self) -> Result<usize, BoxError> {
        let mut st = self.lock();
        st.refill();
        Ok(st.pending.len())
    }
}

impl Connector for SimulatedScaleLink {
    type Transport = SimulatedScaleLink;

    fn open(&self) -> Result<SimulatedScaleLink, BoxError> {
        Ok(self.clone())
    }

    fn target(&self) -> String {
        "sim://scale".to_string()
    }
}
