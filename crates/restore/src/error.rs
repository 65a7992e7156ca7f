//! Error types for the restore crate

use miette::Diagnostic;
use thiserror::Error;

/// Error type for restore orchestration
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A shared data model failure
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] depot_core::Error),

    /// A graph resolution failure
    #[error(transparent)]
    #[diagnostic(transparent)]
    Resolver(#[from] depot_resolver::Error),

    /// Package content could not be downloaded or installed
    #[error("Failed to fetch '{name}/{version}': {message}")]
    #[diagnostic(
        code(depot::restore::fetch),
        help("Check that the configured package sources are reachable")
    )]
    Fetch {
        /// Package name
        name: String,
        /// Package version
        version: String,
        /// Failure detail
        message: String,
    },

    /// A packages lock file could not be read or written
    #[error("Lock file error at '{path}': {message}")]
    #[diagnostic(code(depot::restore::lock_file))]
    LockFile {
        /// Lock file path
        path: String,
        /// Failure detail
        message: String,
    },

    /// A background restore task failed to complete
    #[error("Restore task failed: {message}")]
    #[diagnostic(code(depot::restore::task))]
    Task {
        /// Join failure detail
        message: String,
    },
}

impl Error {
    /// Create a fetch failure error
    #[must_use]
    pub fn fetch(
        name: impl Into<String>,
        version: impl std::fmt::Display,
        message: impl Into<String>,
    ) -> Self {
        Self::Fetch {
            name: name.into(),
            version: version.to_string(),
            message: message.into(),
        }
    }

    /// Create a lock file error
    #[must_use]
    pub fn lock_file(path: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Self::LockFile {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Create a task join error
    #[must_use]
    pub fn task(message: impl Into<String>) -> Self {
        Self::Task {
            message: message.into(),
        }
    }
}

/// Result type for restore operations
pub type Result<T> = std::result::Result<T, Error>;
