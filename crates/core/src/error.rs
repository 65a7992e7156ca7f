//! Error types shared by the depot crates

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for core data-model operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// I/O error with path context
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(depot::core::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "write", "rename")
        operation: String,
    },

    /// Configuration or validation error
    #[error("Configuration error: {message}")]
    #[diagnostic(code(depot::core::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// A version string could not be parsed
    #[error("Invalid version '{value}': {message}")]
    #[diagnostic(code(depot::core::version))]
    InvalidVersion {
        /// The rejected input
        value: String,
        /// Why parsing failed
        message: String,
    },

    /// A version range string could not be parsed
    #[error("Invalid version range '{value}': {message}")]
    #[diagnostic(
        code(depot::core::range),
        help("Ranges use interval notation, e.g. '1.2.0', '[1.2.0]' or '[1.0.0,2.0.0)'")
    )]
    InvalidRange {
        /// The rejected input
        value: String,
        /// Why parsing failed
        message: String,
    },

    /// A target framework string could not be parsed
    #[error("Invalid target framework '{value}'")]
    #[diagnostic(code(depot::core::framework))]
    InvalidFramework {
        /// The rejected input
        value: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(code(depot::core::serialization))]
    Serialization {
        /// Error message describing the serialization issue
        message: String,
    },

    /// The restore was cancelled by the caller
    #[error("Operation cancelled")]
    #[diagnostic(code(depot::core::cancelled))]
    Cancelled,
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;
