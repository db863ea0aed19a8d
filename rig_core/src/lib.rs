#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Hardware-agnostic driver for a G-code motion controller and a serial scale.
//!
//! All device I/O goes through the `rig_traits` seams (`Connector`,
//! `Transport`, `MeasurementSource`, `Clock`), so everything here runs
//! against the scripted fakes in [`mocks`] as well as real ports.
//!
//! ## Layers
//!
//! - **Framing**: bytes to lines, line classification, telemetry parsing (`framing`)
//! - **Recovery**: reopen-and-retry of the write path (`recovery`)
//! - **Protocol**: one command in flight, terminal/continuation handling,
//!   modal session tracking, typed G-code operations (`protocol`)
//! - **Planner**: step counts to distances, tool and mode ordering (`planner`)
//! - **Stabilization**: windowed settle detection over a measurement source
//!   (`stabilize`), fed directly or through a background `Sampler`
//! - **Scale lines**: first-decimal extraction and a non-blocking reader (`measure`)

pub mod axis;
pub mod builder;
pub mod command;
pub mod conversions;
pub mod error;
pub mod framing;
pub mod measure;
pub mod mocks;
pub mod planner;
pub mod protocol;
pub mod recovery;
pub mod sampler;
pub mod stabilize;
pub mod util;

pub use axis::{AxisId, AxisSet, AxisSpec, MotorState};
pub use builder::RigBuilder;
pub use command::{Command, LineEnding, Positioning};
pub use error::{BuildError, Result, RigError};
pub use framing::{LineFramer, LineKind, ResponseLine};
pub use measure::{ScaleReader, parse_reading};
pub use planner::{MotionPlanner, steps_to_distance};
pub use protocol::{CommandProtocol, ProtocolSettings, Session};
pub use recovery::{ConnectionRecovery, RetryPolicy};
pub use sampler::Sampler;
pub use stabilize::{Settle, StabilizationDetector, StabilizeParams, StableReading};
