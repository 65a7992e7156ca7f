//! Core data model for the depot restore engine.
//!
//! This crate defines the types shared by the resolver and restore crates:
//!
//! - [`VersionRange`] and interval-notation parsing over [`semver::Version`]
//! - [`LibraryIdentity`] with case-insensitive names and a
//!   package/project/unresolved [`LibraryKind`]
//! - [`Framework`] and [`FrameworkRuntimePair`] restore targets
//! - [`DependencyGraphSpec`], the hashable description of a project's
//!   restorable inputs
//! - [`RestoreLogMessage`], the structured diagnostics persisted into the
//!   lock artifact and replayed on no-op restores
//! - [`CancelFlag`], the cooperative cancellation signal

mod cancel;
mod error;
mod framework;
mod identity;
mod log;
mod spec;
mod version;

pub use cancel::CancelFlag;
pub use error::{Error, Result};
pub use framework::{Framework, FrameworkRuntimePair};
pub use identity::{LibraryIdentity, LibraryKind};
pub use log::{LogCode, LogLevel, RestoreLog, RestoreLogMessage};
pub use spec::{
    AuditMode, AuditSettings, Dependency, DependencyGraphSpec, DownloadDependency, LockSettings,
    TargetFrameworkInfo,
};
pub use version::{VersionRange, parse_version};

pub use semver::Version;
