//! Asset compatibility checking.
//!
//! After analysis, every resolved package must expose at least one asset
//! group usable from its target. The check is skipped when any graph has
//! unresolved names, since missing metadata would produce noise on top of
//! the unresolved errors.

use crate::PackageInfoMap;
use depot_core::{LibraryIdentity, LibraryKind};
use depot_resolver::RestoreTargetGraph;

/// What kind of library failed the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncompatibilityKind {
    /// A package with no usable asset group.
    Package,
    /// A project reference with no usable asset group.
    Project,
}

/// One incompatible library on one target.
#[derive(Debug, Clone)]
pub struct CompatibilityIssue {
    /// Package or project.
    pub kind: IncompatibilityKind,
    /// The incompatible identity.
    pub identity: LibraryIdentity,
    /// Canonical target name the identity is incompatible with.
    pub target: String,
}

/// Check output.
#[derive(Debug, Clone, Default)]
pub struct CompatibilityResult {
    /// Whether the check ran at all.
    pub checked: bool,
    /// Every incompatibility found.
    pub issues: Vec<CompatibilityIssue>,
}

impl CompatibilityResult {
    /// Whether every checked library was compatible.
    #[must_use]
    pub fn is_compatible(&self) -> bool {
        self.issues.is_empty()
    }

    /// Count of issues of one kind.
    #[must_use]
    pub fn count(&self, kind: IncompatibilityKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }
}

/// Check every resolved library of every graph against its target.
#[must_use]
pub fn check(graphs: &[RestoreTargetGraph], info: &PackageInfoMap) -> CompatibilityResult {
    if graphs.iter().any(|g| !g.unresolved.is_empty()) {
        return CompatibilityResult {
            checked: false,
            issues: Vec::new(),
        };
    }

    let mut issues = Vec::new();
    for graph in graphs {
        for identity in &graph.resolved {
            let kind = match identity.kind {
                LibraryKind::Package => IncompatibilityKind::Package,
                LibraryKind::Project => IncompatibilityKind::Project,
                LibraryKind::Unresolved => continue,
            };
            let Some(info) = info.get(identity) else {
                // The root project and project references without declared
                // assets are compatible by definition.
                continue;
            };
            if info.assets.is_empty() {
                // Metadata-only package.
                continue;
            }
            let usable =
                info.compatible_assets(&graph.pair.framework, graph.pair.runtime.as_deref());
            if usable.is_empty() {
                issues.push(CompatibilityIssue {
                    kind,
                    identity: identity.clone(),
                    target: graph.pair.target_name(),
                });
            }
        }
    }
    issues.sort_by(|a, b| {
        a.identity
            .cmp(&b.identity)
            .then_with(|| a.target.cmp(&b.target))
    });

    CompatibilityResult {
        checked: true,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::{FrameworkRuntimePair, Version};
    use depot_resolver::{AssetGroup, PackageInfo};
    use std::collections::HashMap;

    fn graph(resolved: Vec<LibraryIdentity>) -> RestoreTargetGraph {
        let mut graph = RestoreTargetGraph::placeholder(FrameworkRuntimePair::new(
            "net8.0".parse().unwrap(),
        ));
        graph.resolved = resolved;
        graph
    }

    fn assets_for(framework: &str) -> PackageInfo {
        PackageInfo {
            dependencies: Vec::new(),
            assets: vec![AssetGroup {
                framework: framework.parse().unwrap(),
                runtime: None,
                items: vec!["lib/a.dll".to_string()],
            }],
        }
    }

    #[test]
    fn test_incompatible_package_reported() {
        let identity = LibraryIdentity::package("pkg", Version::new(1, 0, 0));
        let mut info = HashMap::new();
        info.insert(identity.clone(), assets_for("net9.0"));

        let result = check(&[graph(vec![identity])], &info);
        assert!(result.checked);
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].kind, IncompatibilityKind::Package);
        assert_eq!(result.issues[0].target, "net8.0");
    }

    #[test]
    fn test_compatible_package_passes() {
        let identity = LibraryIdentity::package("pkg", Version::new(1, 0, 0));
        let mut info = HashMap::new();
        info.insert(identity.clone(), assets_for("net6.0"));

        let result = check(&[graph(vec![identity])], &info);
        assert!(result.is_compatible());
    }

    #[test]
    fn test_metadata_only_package_passes() {
        let identity = LibraryIdentity::package("meta", Version::new(1, 0, 0));
        let mut info = HashMap::new();
        info.insert(identity.clone(), PackageInfo::default());

        let result = check(&[graph(vec![identity])], &info);
        assert!(result.is_compatible());
    }

    #[test]
    fn test_skipped_when_unresolved_present() {
        let mut unresolved_graph = graph(Vec::new());
        unresolved_graph
            .unresolved
            .push(("missing".to_string(), "1.0.0".parse().unwrap()));

        let result = check(&[unresolved_graph], &HashMap::new());
        assert!(!result.checked);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn test_project_issue_counted_separately() {
        let project = LibraryIdentity::project("lib", Version::new(1, 0, 0));
        let mut info = HashMap::new();
        info.insert(project.clone(), assets_for("net9.0"));

        let result = check(&[graph(vec![project])], &info);
        assert_eq!(result.count(IncompatibilityKind::Project), 1);
        assert_eq!(result.count(IncompatibilityKind::Package), 0);
    }
}
