//! # Data Ingestors Module
//!
//! Clients that bring device telemetry into the relay.
//!
//! ## Contained Modules:
//! - **`stomp_frame`**: the STOMP 1.2 text frame codec.
//! - **`stomp_wss`**: a resilient STOMP-over-WebSocket subscriber for the wearable-device
//!   microservice, feeding every envelope into the shared `SensorState`.

#![forbid(unsafe_code)]

/// STOMP frame encoding and parsing.
pub mod stomp_frame;
/// The upstream subscriber with fixed-delay reconnection.
pub mod stomp_wss;

// --- Public API Re-exports ---
pub use stomp_frame::{parse_frames, FrameError, StompFrame};
pub use stomp_wss::{StompConfig, StompWssIngestor, UpstreamState};
