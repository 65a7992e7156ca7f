//! Error types for the resolver crate

use miette::Diagnostic;
use thiserror::Error;

/// Error type for graph walking and analysis
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A metadata provider failed while resolving a package
    #[error("Metadata lookup for '{name}' failed: {message}")]
    #[diagnostic(
        code(depot::resolver::provider),
        help("Check that the configured package sources are reachable")
    )]
    Provider {
        /// The package name being resolved
        name: String,
        /// Provider-reported failure detail
        message: String,
    },

    /// The walk was cancelled
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] depot_core::Error),
}

impl Error {
    /// Create a provider failure error
    #[must_use]
    pub fn provider(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Result type for resolver operations
pub type Result<T> = std::result::Result<T, Error>;
