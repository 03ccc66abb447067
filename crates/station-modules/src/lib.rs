//! Hash-addressed module distribution.
//!
//! The server side ([`ModuleRegistry`]) caches module blobs loaded from a
//! [`ModuleSource`] and answers `require` requests with either full content
//! or an `upToDate` marker when the client's hash already matches. The
//! client side ([`ModuleLoader`]) coalesces concurrent requires, pre-loads
//! declared dependencies, and executes module bodies through the
//! [`ModuleRuntime`] boundary.

pub mod errors;
pub mod hash;
pub mod loader;
pub mod registry;
pub mod runtime;
pub mod source;

pub use errors::ModuleError;
pub use hash::content_hash;
pub use loader::{ModuleLoader, RequireSink};
pub use registry::{ModuleBlob, ModuleRegistry};
pub use runtime::{Exports, JsonRuntime, ModuleContext, ModuleRuntime};
pub use source::{FsModuleSource, ModuleSource};
