#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Device backends for the rig: serial ports (feature `hardware`) and
//! in-process simulators for the motion controller and the scale.

pub mod error;
#[cfg(feature = "hardware")]
pub mod serial;
pub mod sim;
pub mod util;

pub use error::HwError;
#[cfg(feature = "hardware")]
pub use serial::{SerialConnector, SerialTransport};
pub use sim::{SimulatedMarlin, SimulatedMarlinLink, SimulatedScaleLink};
