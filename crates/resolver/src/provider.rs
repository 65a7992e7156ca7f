//! The metadata lookup capability consumed by the graph walker.
//!
//! Transport is not implemented here: callers supply a [`MetadataProvider`]
//! backed by whatever sources they have (remote feeds, a local folder, an
//! in-memory fixture in tests).

use crate::Result;
use async_trait::async_trait;
use depot_core::{Framework, VersionRange};
use semver::Version;
use serde::{Deserialize, Serialize};

/// A dependency declared by a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDependency {
    /// Dependency name.
    pub name: String,
    /// Declared range.
    pub range: VersionRange,
}

impl PackageDependency {
    /// Convenience constructor.
    #[must_use]
    pub fn new(name: impl Into<String>, range: VersionRange) -> Self {
        Self {
            name: name.into(),
            range,
        }
    }
}

/// Dependencies a package declares for one framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGroup {
    /// The framework the group targets.
    pub framework: Framework,
    /// Dependencies within the group.
    pub dependencies: Vec<PackageDependency>,
}

/// One group of assets a package ships for a framework (and optionally a
/// specific runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetGroup {
    /// The framework the assets target.
    pub framework: Framework,
    /// Runtime identifier for runtime-specific assets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    /// Asset paths within the package.
    #[serde(default)]
    pub items: Vec<String>,
}

/// Metadata for one exact package version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Per-framework dependency groups.
    #[serde(default)]
    pub dependencies: Vec<DependencyGroup>,
    /// Declared asset groups.
    #[serde(default)]
    pub assets: Vec<AssetGroup>,
}

impl PackageInfo {
    /// Dependencies that apply when the package is consumed from `target`:
    /// the nearest (highest usable) dependency group wins, matching how
    /// asset selection works.
    #[must_use]
    pub fn dependencies_for(&self, target: &Framework) -> &[PackageDependency] {
        self.dependencies
            .iter()
            .filter(|g| g.framework.is_usable_from(target))
            .max_by(|a, b| a.framework.cmp(&b.framework))
            .map_or(&[], |g| g.dependencies.as_slice())
    }

    /// Asset groups usable from `target`, honoring runtime specificity:
    /// runtime-specific groups are considered only when the pair carries a
    /// runtime identifier, and then only for that identifier.
    #[must_use]
    pub fn compatible_assets(
        &self,
        target: &Framework,
        runtime: Option<&str>,
    ) -> Vec<&AssetGroup> {
        self.assets
            .iter()
            .filter(|g| g.framework.is_usable_from(target))
            .filter(|g| match (&g.runtime, runtime) {
                (None, _) => true,
                (Some(_), None) => false,
                (Some(gr), Some(r)) => gr == r,
            })
            .collect()
    }
}

/// Resolves package names to candidate versions and exact versions to their
/// declared metadata.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// All known versions of `name`, in any order. An unknown name yields an
    /// empty list, not an error.
    async fn candidate_versions(&self, name: &str) -> Result<Vec<Version>>;

    /// Declared dependency groups and assets for one exact version.
    async fn package_info(&self, name: &str, version: &Version) -> Result<PackageInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fw(s: &str) -> Framework {
        s.parse().unwrap()
    }

    fn range(s: &str) -> VersionRange {
        s.parse().unwrap()
    }

    #[test]
    fn test_nearest_dependency_group_wins() {
        let info = PackageInfo {
            dependencies: vec![
                DependencyGroup {
                    framework: fw("net6.0"),
                    dependencies: vec![PackageDependency::new("old", range("1.0.0"))],
                },
                DependencyGroup {
                    framework: fw("net8.0"),
                    dependencies: vec![PackageDependency::new("new", range("2.0.0"))],
                },
            ],
            assets: Vec::new(),
        };

        let deps = info.dependencies_for(&fw("net8.0"));
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name, "new");

        let deps = info.dependencies_for(&fw("net7.0"));
        assert_eq!(deps[0].name, "old");

        assert!(info.dependencies_for(&fw("netstandard2.0")).is_empty());
    }

    #[test]
    fn test_runtime_specific_assets_require_runtime() {
        let info = PackageInfo {
            dependencies: Vec::new(),
            assets: vec![
                AssetGroup {
                    framework: fw("net8.0"),
                    runtime: None,
                    items: vec!["lib/net8.0/a.dll".to_string()],
                },
                AssetGroup {
                    framework: fw("net8.0"),
                    runtime: Some("linux-x64".to_string()),
                    items: vec!["runtimes/linux-x64/native/a.so".to_string()],
                },
            ],
        };

        assert_eq!(info.compatible_assets(&fw("net8.0"), None).len(), 1);
        assert_eq!(
            info.compatible_assets(&fw("net8.0"), Some("linux-x64")).len(),
            2
        );
        assert_eq!(
            info.compatible_assets(&fw("net8.0"), Some("win-x64")).len(),
            1
        );
    }
}
