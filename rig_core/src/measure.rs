//! Scale line protocol: one free-form ASCII line per reading, the first
//! decimal number in the line is the value.

use std::sync::LazyLock;

use regex::Regex;
use rig_traits::{BoxError, MeasurementSource, Transport};
use thiserror::Error;

use crate::framing::LineFramer;

#[allow(clippy::expect_used)]
static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-+]?(?:\d+(?:\.\d*)?|\.\d+)").expect("static regex"));

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadingError {
    #[error("cannot parse reading from '{0}'")]
    Unparseable(String),
}

/// Extract the first signed/unsigned decimal in `line`.
pub fn parse_reading(line: &str) -> Result<f64, ReadingError> {
    NUMBER
        .find(line)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .ok_or_else(|| ReadingError::Unparseable(line.trim().to_string()))
}

/// `MeasurementSource` over any transport speaking the scale line protocol.
///
/// `try_read` never blocks: it only consumes bytes the transport reports as
/// available and yields at most one reading per call.
pub struct ScaleReader<T: Transport> {
    transport: T,
    framer: LineFramer,
}

impl<T: Transport> ScaleReader<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            framer: LineFramer::new(),
        }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    fn next_complete_line(&mut self) -> Option<String> {
        while let Some(line) = self.framer.next_line() {
            if !line.trim().is_empty() {
                return Some(line);
            }
        }
        None
    }
}

impl<T: Transport> MeasurementSource for ScaleReader<T> {
    fn try_read(&mut self) -> Result<Option<f64>, BoxError> {
        if self.next_line_ready() {
            return self.parse_next();
        }
        let available = self.transport.bytes_available()?;
        if available == 0 {
            return Ok(None);
        }
        let mut buf = vec![0u8; available.min(1024)];
        let n = self.transport.read(&mut buf)?;
        self.framer.push(&buf[..n]);
        self.parse_next()
    }
}

impl<T: Transport> ScaleReader<T> {
    fn next_line_ready(&self) -> bool {
        self.framer.has_line()
    }

    fn parse_next(&mut self) -> Result<Option<f64>, BoxError> {
        match self.next_complete_line() {
            Some(line) => {
                let v = parse_reading(&line)?;
                tracing::trace!(line = line.trim(), value = v, "scale line");
                Ok(Some(v))
            }
            None => Ok(None),
        }
    }
}
