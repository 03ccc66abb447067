//! # station-store
//!
//! Persistence layer for the hub's data-mutation loop.
//!
//! - [`CollectionStore`]: the narrow async contract the hub depends on:
//!   create-with-generated-or-supplied-id, filtered reads, single update
//!   by filter, delete by filter. Backends are pluggable.
//! - [`MemoryStore`] / [`JsonStore`]: the bundled backends (in-process
//!   map; one JSON file per collection on disk).
//! - [`StateStore`]: exclusive owner of the per-entity snapshot. Turns
//!   CRUD payloads into store calls, reconciles the snapshot, and hands
//!   the result to an [`UpdateFanout`] while holding the entity's
//!   mutation lock, so same-entity broadcasts keep mutation order.
//!
//! ## Crate Position
//!
//! Server-side. Depends only on `station-core`; `station-server` plugs in
//! the broadcast fan-out.

#![deny(unsafe_code)]

pub mod contract;
pub mod errors;
pub mod json;
pub mod memory;
pub mod state;

pub use contract::{CollectionStore, QueryOptions};
pub use errors::{Result, StoreError};
pub use json::JsonStore;
pub use memory::MemoryStore;
pub use state::{Action, StateStore, UpdateFanout};
