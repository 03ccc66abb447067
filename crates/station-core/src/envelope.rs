//! The wire unit: a JSON `{event, data}` pair.
//!
//! Envelopes are the only thing that crosses the connection channel, one
//! JSON text frame per envelope. `event` is free-form; the `entity:action`
//! convention is applied by the state store, never enforced here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single protocol message: an event name plus an arbitrary JSON payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name, conventionally `entity:action`.
    pub event: String,
    /// Free-form payload. Defaults to `null` when absent on the wire.
    #[serde(default)]
    pub data: Value,
}

/// Failure to turn a wire frame into an [`Envelope`].
///
/// Malformed frames are connection-scoped diagnostics: the channel logs
/// and drops them, it never re-broadcasts or crashes.
#[derive(Debug, thiserror::Error)]
#[error("malformed envelope: {0}")]
pub struct EnvelopeError(#[from] serde_json::Error);

impl Envelope {
    /// Build an envelope from an event name and payload.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Parse an inbound text frame.
    pub fn parse(frame: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(frame)?)
    }

    /// Serialize for the wire.
    ///
    /// Only fails if `data` contains a non-string map key injected via
    /// `serde_json::Value` construction, which callers treat as a send
    /// fault, not a panic.
    pub fn to_frame(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }
}
