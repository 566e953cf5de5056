use thiserror::Error;

/// Errors raised along the update -> persist -> broadcast path.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("Malformed '{tag}' payload: {source}")]
    Payload {
        tag: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Persistence failed: {0}")]
    Persistence(String),
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
}
