//! Dependency graph resolution for the depot restore engine.
//!
//! The resolver turns a [`depot_core::DependencyGraphSpec`] into one
//! [`RestoreTargetGraph`] per (framework, runtime) pair:
//!
//! 1. [`GraphWalker`] expands direct dependencies breadth-first through a
//!    [`MetadataProvider`], selecting the lowest version satisfying each
//!    range and converging repeated requests onto existing choices.
//! 2. [`analyze`] detects cycles, settles contested names by nearest-wins
//!    and classifies losing requests as conflicts or downgrades.
//!
//! The output is deterministic: identical inputs produce identical graphs
//! regardless of provider response order.

mod analysis;
mod error;
mod graph;
mod provider;
mod walker;

pub use analysis::analyze;
pub use error::{Error, Result};
pub use graph::{
    Downgrade, GraphNode, RawGraph, ResolutionCycle, RestoreTargetGraph, VersionConflict,
};
pub use provider::{
    AssetGroup, DependencyGroup, MetadataProvider, PackageDependency, PackageInfo,
};
pub use walker::GraphWalker;
