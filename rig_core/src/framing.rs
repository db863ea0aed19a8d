//! Inbound line framing and response-line classification.
//!
//! Bytes from a transport are split on `\n` (a preceding `\r` is dropped) and
//! decoded lossily, so a stray non-ASCII byte never breaks the read loop.

use std::collections::VecDeque;

use crate::axis::{AxisId, AxisSet, MotorState};

/// Splits an inbound byte stream into text lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    partial: Vec<u8>,
    ready: VecDeque<String>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self {
            partial: Vec::with_capacity(256),
            ready: VecDeque::new(),
        }
    }

    /// Feed raw bytes; complete lines become available through `next_line`.
    pub fn push(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if b == b'\n' {
                if self.partial.last() == Some(&b'\r') {
                    self.partial.pop();
                }
                let line = String::from_utf8_lossy(&self.partial).into_owned();
                self.ready.push_back(line);
                self.partial.clear();
            } else {
                self.partial.push(b);
            }
        }
    }

    /// Next complete line, without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        self.ready.pop_front()
    }

    pub fn has_line(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Drop buffered bytes and queued lines (after a reconnect or timeout).
    pub fn reset(&mut self) {
        self.partial.clear();
        self.ready.clear();
    }
}

/// How a response line affects the read loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// `ok...`: the device finished the command.
    Terminal,
    /// `wait...`: still processing, keep reading.
    Continuation,
    /// `<primary axis>:...`: carries axis positions.
    Telemetry,
    /// Anything else; kept for diagnostics.
    Plain,
}

/// One decoded line of a device response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    pub kind: LineKind,
    pub text: String,
}

impl ResponseLine {
    pub fn is_terminal(&self) -> bool {
        self.kind == LineKind::Terminal
    }
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Classify a trimmed, non-empty line.
pub fn classify(line: &str, primary: AxisId) -> LineKind {
    let mut chars = line.chars();
    if chars.next() == Some(primary.letter()) && chars.next() == Some(':') {
        LineKind::Telemetry
    } else if starts_with_ignore_case(line, "ok") {
        LineKind::Terminal
    } else if starts_with_ignore_case(line, "wait") {
        LineKind::Continuation
    } else {
        LineKind::Plain
    }
}

/// Apply every `NAME:VALUE` token of a telemetry line to `state`.
///
/// Tokens naming an unconfigured axis are ignored and a non-numeric value
/// skips only that token. The token sequence ends at the first bare word
/// (Marlin's `Count` section reports step counts, not positions). Returns the
/// number of axes updated.
pub fn apply_telemetry(line: &str, axes: &AxisSet, state: &mut MotorState) -> usize {
    let mut updated = 0;
    for token in line.split_whitespace() {
        let Some((name, value)) = token.split_once(':') else {
            break;
        };
        let Ok(id) = name.parse::<AxisId>() else {
            continue;
        };
        if !axes.contains(id) {
            continue;
        }
        match value.parse::<f64>() {
            Ok(v) if v.is_finite() => {
                if state.set(id, v) {
                    updated += 1;
                }
            }
            _ => {
                tracing::warn!(token, "skipping malformed telemetry token");
            }
        }
    }
    updated
}
