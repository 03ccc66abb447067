//! Client-side failures.

use thiserror::Error;

/// Everything the client hub can fail with.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The WebSocket could not be established or broke mid-stream.
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// The outbound channel to the writer task is gone.
    #[error("connection closed")]
    ConnectionClosed,

    /// A payload could not be serialized for the wire.
    #[error(transparent)]
    Envelope(#[from] station_core::envelope::EnvelopeError),
}
