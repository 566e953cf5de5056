//! # lib_common
//!
//! Shared building blocks for the sensor telemetry relay. Each folder is gated behind a
//! cargo feature of the same name so binaries only pull in what they use.

#[cfg(feature = "sensors")]
pub mod sensors;

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "connections")]
pub mod connections;

#[cfg(feature = "ingestors")]
pub mod ingestors;

// Re-export the types every consumer touches
#[cfg(feature = "sensors")]
pub use sensors::{DeviceEvent, Reading, ReadingPatch, SensorError};

#[cfg(feature = "core")]
pub use core::{Dispatcher, EventSink, SensorState, StateOptions};
