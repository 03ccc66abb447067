//! # station-client
//!
//! The client half of the hub protocol: an outbound envelope channel, a
//! local [`EventBus`](station_bus::EventBus) fed by inbound envelopes,
//! and a [`ModuleLoader`](station_modules::ModuleLoader) for hash-synced
//! modules. [`transport::connect`] wires a real WebSocket; tests drive
//! the hub through in-memory channels.

pub mod errors;
pub mod hub;
pub mod transport;

pub use errors::ClientError;
pub use hub::ClientHub;
pub use transport::connect;
