//! # station-server
//!
//! The hub process: accepts WebSocket connections, issues client ids,
//! dispatches inbound envelopes to the module registry and state store,
//! and fans entity snapshots back out to every other client.

pub mod config;
pub mod hub;
pub mod websocket;

pub use config::StationConfig;
pub use hub::{StationHub, StationHubBuilder};
pub use websocket::broadcast::BroadcastManager;
pub use websocket::connection::ClientConnection;
pub use websocket::router;
