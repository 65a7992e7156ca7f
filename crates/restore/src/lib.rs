//! Restore orchestration for the depot restore engine.
//!
//! This crate turns a [`depot_core::DependencyGraphSpec`] plus a set of
//! caller-supplied providers into on-disk restore outputs:
//!
//! - [`RestoreOrchestrator`] drives the full state machine, from the no-op
//!   check through graph walking, validation, compatibility and audit
//!   checks, content fetching and finalization.
//! - [`assets::LockArtifact`] is the primary output, with canonical
//!   ordering and change-detecting writes.
//! - [`locks`] maintains the reproducible packages lock file.
//! - [`noop`] implements the cache record that lets unchanged restores
//!   short-circuit entirely.
//! - [`PackageCache`] is the local content store with atomic installs.
//! - [`FetchCoordinator`] downloads missing content through a bounded
//!   worker pool.

pub mod assets;
pub mod audit;
pub mod cache;
pub mod compat;
mod error;
pub mod fetch;
pub mod locks;
pub mod noop;
mod orchestrator;
mod paths;
mod result;

pub use audit::{Advisory, AuditOutcome, VulnerabilityProvider};
pub use cache::PackageCache;
pub use compat::{CompatibilityIssue, CompatibilityResult, IncompatibilityKind};
pub use error::{Error, Result};
pub use fetch::{ContentProvider, FetchCoordinator, FetchOutcome};
pub use orchestrator::RestoreOrchestrator;
pub use paths::RestorePaths;
pub use result::RestoreResult;

use depot_core::LibraryIdentity;
use std::collections::HashMap;

/// Declared metadata per resolved package, shared by the compatibility
/// check and the artifact builder.
pub type PackageInfoMap = HashMap<LibraryIdentity, depot_resolver::PackageInfo>;
