//! Serial-port transports built on the `serialport` crate.

use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::time::Duration;

use rig_traits::{BoxError, Connector, Transport};
use serialport::{ClearBuffer, SerialPort};

use crate::error::HwError;
use crate::util::wait_until_with_timeout;

/// Opens `port` at `baud_rate` with 8N1 framing.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    port: String,
    baud_rate: u32,
    read_timeout: Duration,
    /// Wait this long for the device node to reappear (USB re-enumeration
    /// after a board reset) before giving up on an open.
    appear_timeout: Duration,
    /// Sleep after a successful open.
    open_delay: Duration,
}

impl SerialConnector {
    pub fn new(port: impl Into<String>, baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            read_timeout,
            appear_timeout: Duration::from_secs(2),
            open_delay: Duration::ZERO,
        }
    }

    pub fn with_appear_timeout(mut self, timeout: Duration) -> Self {
        self.appear_timeout = timeout;
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    fn serial_error(&self, e: impl std::fmt::Display) -> HwError {
        HwError::Serial {
            port: self.port.clone(),
            reason: e.to_string(),
        }
    }
}

impl Connector for SerialConnector {
    type Transport = SerialTransport;

    fn open(&self) -> Result<SerialTransport, BoxError> {
        // Only device-node paths can be waited for; COM names are opened directly.
        if self.port.starts_with('/') {
            let path = Path::new(&self.port);
            wait_until_with_timeout(
                || path.exists(),
                self.appear_timeout,
                Duration::from_millis(50),
                &self.port,
            )?;
        }
        let port = serialport::new(&self.port, self.baud_rate)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| self.serial_error(e))?;
        tracing::debug!(port = %self.port, baud = self.baud_rate, "serial port opened");
        if !self.open_delay.is_zero() {
            std::thread::sleep(self.open_delay);
        }
        Ok(SerialTransport {
            name: self.port.clone(),
            port,
        })
    }

    fn target(&self) -> String {
        format!("{}@{}", self.port, self.baud_rate)
    }
}

pub struct SerialTransport {
    name: String,
    port: Box<dyn SerialPort>,
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), BoxError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BoxError> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(HwError::Io(e).into()),
        }
    }

    fn bytes_available(&mut self) -> Result<usize, BoxError> {
        let n = self.port.bytes_to_read().map_err(|e| HwError::Serial {
            port: self.name.clone(),
            reason: e.to_string(),
        })?;
        Ok(n as usize)
    }

    fn discard_input(&mut self) -> Result<(), BoxError> {
        self.port.clear(ClearBuffer::Input).map_err(|e| HwError::Serial {
            port: self.name.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}
