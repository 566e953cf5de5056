//! # Sensors Module
//!
//! Domain model for the wearable telemetry stream: the single `Reading` every client sees,
//! the tagged device events arriving from upstream, and the pure rules that fold one into
//! the other.
//!
//! ## Contained Modules:
//! - **`punch`**: bit-level decoding of the boxing glove hand code.
//! - **`reading`**: the latest-state record and its JSON shape.
//! - **`event`**: `{type, data}` envelopes decoded into a closed `DeviceEvent` enum.
//! - **`normalizer`**: `apply(reading, event, now)`, the tag-driven update rules.
//! - **`patch`**: typed partial reading for the manual injection endpoint.
//! - **`error`**: the crate-level `SensorError`.

pub mod error;
pub mod event;
pub mod normalizer;
pub mod patch;
pub mod punch;
pub mod reading;

pub use error::SensorError;
pub use event::{BoxingPayload, CadencePayload, DeviceEvent, Envelope, HeartRatePayload, SosPayload};
pub use normalizer::{apply, stamp_now};
pub use patch::ReadingPatch;
pub use punch::{decode_hand, decode_punch, Hand, PunchType};
pub use reading::Reading;
