//! Structured restore log messages.
//!
//! Errors and warnings produced during a restore are accumulated rather than
//! thrown, persisted into the lock artifact and the no-op cache record, and
//! replayed verbatim when a later restore short-circuits. This is a data
//! model, not a tracing layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a restore log message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Internal diagnostics.
    Debug,
    /// Detail useful when investigating a restore.
    Verbose,
    /// Normal progress information.
    Information,
    /// A problem that does not fail the restore.
    Warning,
    /// A problem that fails the restore.
    Error,
}

/// Stable diagnostic codes carried by restore log messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogCode {
    /// The project declares no target frameworks.
    DP1001,
    /// A dependency is centrally managed but also declares its own version.
    DP1008,
    /// A dependency declares no version and none is centrally pinned.
    DP1010,
    /// A central pin uses an unbounded range.
    DP1011,
    /// A target framework is missing its platform version.
    DP1012,
    /// A version override is present while overrides are disabled.
    DP1013,
    /// A lock file exists but lock files are disabled for the project.
    DP1005,
    /// The lock file is out of date and locked mode is enabled.
    DP1004,
    /// A dependency could not be resolved within its range.
    DP1101,
    /// Two required versions of the same library cannot be reconciled.
    DP1107,
    /// The dependency graph contains a cycle.
    DP1108,
    /// A centrally pinned transitive dependency was downgraded.
    DP1109,
    /// A package exposes no assets compatible with the project target.
    DP1202,
    /// A project reference is incompatible with the target.
    DP1201,
    /// A package failed to download or install.
    DP1301,
    /// A package's content hash does not match the lock file.
    DP1403,
    /// A resolved version is lower than a version requested elsewhere.
    DP1605,
    /// A resolved package has a known low severity vulnerability.
    DP1901,
    /// A resolved package has a known moderate severity vulnerability.
    DP1902,
    /// A resolved package has a known high severity vulnerability.
    DP1903,
    /// A resolved package has a known critical severity vulnerability.
    DP1904,
}

impl fmt::Display for LogCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// One accumulated restore diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreLogMessage {
    /// Message severity.
    pub level: LogLevel,
    /// Stable diagnostic code.
    pub code: LogCode,
    /// Human-readable text.
    pub message: String,
    /// The library the message is about, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_name: Option<String>,
    /// Target graph names the message applies to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_graphs: Vec<String>,
}

impl RestoreLogMessage {
    /// Create an error-level message.
    #[must_use]
    pub fn error(code: LogCode, message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Error,
            code,
            message: message.into(),
            library_name: None,
            target_graphs: Vec::new(),
        }
    }

    /// Create a warning-level message.
    #[must_use]
    pub fn warning(code: LogCode, message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Warning,
            code,
            message: message.into(),
            library_name: None,
            target_graphs: Vec::new(),
        }
    }

    /// Attach the library the message concerns.
    #[must_use]
    pub fn with_library(mut self, name: impl Into<String>) -> Self {
        self.library_name = Some(name.into());
        self
    }

    /// Attach a target graph name.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_graphs.push(target.into());
        self
    }

    /// Whether this message fails the restore.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.level == LogLevel::Error
    }
}

/// An append-only collector for restore diagnostics.
///
/// Ordering is preserved as messages arrive; callers that need canonical
/// output sort at write time.
#[derive(Debug, Clone, Default)]
pub struct RestoreLog {
    messages: Vec<RestoreLogMessage>,
}

impl RestoreLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message.
    pub fn push(&mut self, message: RestoreLogMessage) {
        match message.level {
            LogLevel::Error => tracing::error!(code = %message.code, "{}", message.message),
            LogLevel::Warning => tracing::warn!(code = %message.code, "{}", message.message),
            _ => tracing::debug!(code = %message.code, "{}", message.message),
        }
        self.messages.push(message);
    }

    /// Append every message from `other`.
    pub fn extend(&mut self, other: impl IntoIterator<Item = RestoreLogMessage>) {
        for message in other {
            self.push(message);
        }
    }

    /// All accumulated messages, in arrival order.
    #[must_use]
    pub fn messages(&self) -> &[RestoreLogMessage] {
        &self.messages
    }

    /// Whether any error-level message has been recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(RestoreLogMessage::is_error)
    }

    /// Consume the collector, returning the message list.
    #[must_use]
    pub fn into_messages(self) -> Vec<RestoreLogMessage> {
        self.messages
    }
}
