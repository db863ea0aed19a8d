//! Hardware seams shared by the rig crates.
//!
//! Everything that touches a physical link goes through one of these traits so
//! the protocol driver and the stabilization detector can be exercised against
//! scripted fakes.
pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Boxed error used at the hardware boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An open byte stream to a device (serial port, virtual COM, socket).
///
/// Implementations own no protocol knowledge. Dropping the value closes the link.
pub trait Transport: Send {
    /// Write the whole buffer and flush it to the device.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), BoxError>;

    /// Read whatever is available into `buf`, blocking at most for the
    /// transport's read timeout. `Ok(0)` means the timeout elapsed with no data.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BoxError>;

    /// Number of inbound bytes that can be read without blocking.
    fn bytes_available(&mut self) -> Result<usize, BoxError>;

    /// Drop any stale inbound bytes. Best effort; the default does nothing.
    fn discard_input(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Opens fresh transports against one fixed target (same address and parameters).
pub trait Connector: Send {
    type Transport: Transport;

    fn open(&self) -> Result<Self::Transport, BoxError>;

    /// Human-readable target, e.g. `/dev/ttyACM0@115200`.
    fn target(&self) -> String;
}

/// A source of scalar measurements, e.g. a scale streaming mass readings.
pub trait MeasurementSource {
    /// Attempt a non-blocking read of zero or one sample.
    ///
    /// `Ok(None)` means nothing has arrived yet; `Err` is a failure for this
    /// read only and callers may keep polling.
    fn try_read(&mut self) -> Result<Option<f64>, BoxError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), BoxError> {
        (**self).write_all(bytes)
    }
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BoxError> {
        (**self).read(buf)
    }
    fn bytes_available(&mut self) -> Result<usize, BoxError> {
        (**self).bytes_available()
    }
    fn discard_input(&mut self) -> Result<(), BoxError> {
        (**self).discard_input()
    }
}

impl<S: MeasurementSource + ?Sized> MeasurementSource for Box<S> {
    fn try_read(&mut self) -> Result<Option<f64>, BoxError> {
        (**self).try_read()
    }
}
