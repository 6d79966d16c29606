//! Error types for the channel core.

use thiserror::Error;

/// Construction-time validation failures.
///
/// Returned by [`crate::config::ChannelConfigBuilder::build`] rather than
/// panicking — the core never panics out of a public entry point.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("max_in_flight is required")]
    MaxInFlightMissing,

    #[error("max_in_flight must be >= 1, got {0}")]
    MaxInFlightZero(usize),

    #[error("batch_size is required")]
    BatchSizeMissing,

    #[error("batch_size must be >= 1, got {0}")]
    BatchSizeZero(usize),

    #[error("export_concurrency must be >= 1, got {0}")]
    ExportConcurrencyZero(usize),

    #[error("outbound_buffer_max_size must be >= 1, got {0}")]
    OutboundBufferZero(usize),
}

/// The stringified, listener-facing representation of a transport-level
/// send failure.
///
/// [`crate::listener::Listener`] is not generic over a `Strategy`'s
/// associated error type, so by the time an error reaches a listener it has
/// already been flattened to this type. Keeps the listener trait usable
/// across strategies with unrelated error types.
#[derive(Debug, Clone, Error)]
#[error("export failed: {message}")]
#[non_exhaustive]
pub struct ExportException {
    pub message: String,
    pub retryable: bool,
}

impl ExportException {
    pub fn new(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            message: message.into(),
            retryable,
        }
    }
}
