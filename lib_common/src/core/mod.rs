//! # Core Engine Module
//!
//! The update pipeline of the relay.
//!
//! ## Core Components:
//!
//! - **`dispatcher`**: the broadcast hub. Fans each new `Reading` out to every connected
//!   real-time subscriber with a single shared allocation.
//!
//! - **`sensor_state`**: the single owner of the current `Reading`. Serializes every trigger
//!   through one lock and runs update -> persist -> broadcast as one critical section.

#![forbid(unsafe_code)]

/// The broadcast hub for connected dashboards.
pub mod dispatcher;
/// The shared reading and its critical section.
pub mod sensor_state;

// --- Public API Re-exports ---
pub use dispatcher::{Dispatcher, ReadingReceiver};
pub use sensor_state::{EventSink, SensorState, StateOptions};
