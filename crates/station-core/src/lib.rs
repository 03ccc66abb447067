//! # station-core
//!
//! Foundation types for the Central Station hub.
//!
//! This crate provides the shared vocabulary that all other station crates
//! depend on:
//!
//! - **Envelope**: [`envelope::Envelope`], the `{event, data}` wire unit
//! - **Patterns**: [`pattern::EventName`] and the four-candidate wildcard
//!   enumeration used by the event bus
//! - **IDs**: [`ids::ClientId`] as a prefixed newtype
//! - **Protocol**: [`protocol`], event names and payload shapes for the
//!   module hash-sync channel and connection lifecycle
//! - **Logging**: [`logging::init_logging`] for the binary
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other station crates.

#![deny(unsafe_code)]

pub mod envelope;
pub mod ids;
pub mod logging;
pub mod pattern;
pub mod protocol;
