//! Store error hierarchy.

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Faults from the collection store or the state store built on it.
///
/// Backend-specific failures surface unchanged through the [`Backend`]
/// variant; the state store never swallows them.
///
/// [`Backend`]: StoreError::Backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An update filter matched no record. Reported by the backend; the
    /// state store layer does not invent its own not-found semantics.
    #[error("no record in '{collection}' matches the filter")]
    NotFound {
        /// Collection that was targeted.
        collection: String,
    },

    /// A mutation payload is unusable (e.g. update/delete without an id).
    #[error("invalid mutation for '{collection}': {message}")]
    InvalidMutation {
        /// Collection that was targeted.
        collection: String,
        /// What was wrong.
        message: String,
    },

    /// Disk I/O failure from a file-backed backend.
    #[error("store I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// A collection file on disk is not valid JSON.
    #[error("corrupt collection data: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// Any other backend-specific failure, surfaced verbatim.
    #[error("backend failure: {0}")]
    Backend(String),
}
