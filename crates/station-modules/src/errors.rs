//! Module distribution errors.

use thiserror::Error;

/// Everything that can go wrong loading, serving, or executing a module.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// The registry has no module under this name and the source could
    /// not provide one.
    #[error("module not found: {name}")]
    NotFound {
        /// Requested module name.
        name: String,
    },

    /// Module names address files; separators and parent references are
    /// rejected before they reach the filesystem.
    #[error("invalid module name: {name}")]
    InvalidName {
        /// Offending module name.
        name: String,
    },

    /// The runtime failed to execute the module body.
    #[error("module {name} failed to execute: {message}")]
    Execution {
        /// Module whose body failed.
        name: String,
        /// Runtime's description of the failure.
        message: String,
    },

    /// A module body asked for a dependency that was never declared in
    /// its source, so it was never pre-loaded.
    #[error("module {name} requires undeclared dependency {dependency}")]
    MissingDependency {
        /// Module being executed.
        name: String,
        /// Dependency it asked for.
        dependency: String,
    },

    /// The server answered `upToDate` but the local cache holds nothing.
    /// The peer and this loader disagree about what was previously synced.
    #[error("module {name} reported up to date but is not cached")]
    StaleUpToDate {
        /// Module the answer was for.
        name: String,
    },

    /// The transport closed while a require was outstanding.
    #[error("connection closed while waiting for module")]
    ChannelClosed,

    /// Source provider I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Clone for ModuleError {
    fn clone(&self) -> Self {
        match self {
            Self::NotFound { name } => Self::NotFound { name: name.clone() },
            Self::InvalidName { name } => Self::InvalidName { name: name.clone() },
            Self::Execution { name, message } => Self::Execution {
                name: name.clone(),
                message: message.clone(),
            },
            Self::MissingDependency { name, dependency } => Self::MissingDependency {
                name: name.clone(),
                dependency: dependency.clone(),
            },
            Self::StaleUpToDate { name } => Self::StaleUpToDate { name: name.clone() },
            Self::ChannelClosed => Self::ChannelClosed,
            Self::Io(err) => Self::Io(std::io::Error::new(err.kind(), err.to_string())),
        }
    }
}
