//! The lock artifact (assets file).
//!
//! The artifact is the restore's primary output: the flattened library set,
//! one target section per (framework, runtime) pair with per-library
//! dependency lists and selected asset groups, the project block and the
//! ordered restore log. Serialization is canonical, so building twice from
//! identical inputs produces identical bytes and the writer can skip the
//! disk entirely when nothing changed.

use crate::cache::PackageCache;
use crate::{PackageInfoMap, Result};
use depot_core::{
    DependencyGraphSpec, LibraryIdentity, LibraryKind, RestoreLogMessage, Version,
};
use depot_resolver::RestoreTargetGraph;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Current artifact format version.
pub const LOCK_ARTIFACT_VERSION: u32 = 2;

/// The project block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Project name.
    pub name: String,
    /// Project version.
    pub version: Version,
    /// Project file path.
    pub path: String,
}

/// One entry in the flattened library set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryEntry {
    /// Library name.
    pub name: String,
    /// Resolved version.
    pub version: Version,
    /// Library kind; absent in version 1 artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<LibraryKind>,
    /// Hex SHA-256 of the installed content, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Cache-relative install path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// One library as referenced by a target section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetLibrary {
    /// Library name.
    pub name: String,
    /// Resolved version.
    pub version: Version,
    /// Dependency ranges that apply for this target.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    /// Selected asset items for this target.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<String>,
}

/// The per-pair section of the artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSection {
    /// Canonical target name, e.g. `net8.0` or `net8.0/linux-x64`.
    pub name: String,
    /// Libraries selected for this target.
    #[serde(default)]
    pub libraries: Vec<TargetLibrary>,
}

/// The full lock artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockArtifact {
    /// Artifact format version.
    pub version: u32,
    /// The project the artifact belongs to.
    pub project: ProjectSection,
    /// Flattened, deduplicated library set.
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
    /// One section per resolved (framework, runtime) pair.
    #[serde(default)]
    pub targets: Vec<TargetSection>,
    /// Restore log messages, in arrival order.
    #[serde(default)]
    pub logs: Vec<RestoreLogMessage>,
}

impl LockArtifact {
    /// An artifact with no resolved content, used when preconditions fail
    /// before any walking happens.
    #[must_use]
    pub fn empty(spec: &DependencyGraphSpec, logs: Vec<RestoreLogMessage>) -> Self {
        Self {
            version: LOCK_ARTIFACT_VERSION,
            project: ProjectSection {
                name: spec.project_name.clone(),
                version: spec.version.clone(),
                path: spec.project_path.display().to_string(),
            },
            libraries: Vec::new(),
            targets: Vec::new(),
            logs,
        }
    }

    /// Load a previously written artifact. Absence and corruption both read
    /// as `None`; a stale artifact only costs diff stability, never
    /// correctness.
    #[must_use]
    pub fn load(path: &Path) -> Option<Self> {
        let raw = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "unreadable artifact");
                None
            }
        }
    }

    /// The library entry for an identity, if present.
    #[must_use]
    pub fn library(&self, name: &str, version: &Version) -> Option<&LibraryEntry> {
        self.libraries
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(name) && &l.version == version)
    }

    /// Record content hashes for installed packages that do not have one
    /// yet. Runs after content ensuring, when the cache is fully populated.
    pub fn record_content_hashes(&mut self, cache: &PackageCache) -> Result<()> {
        for entry in &mut self.libraries {
            if entry.content_hash.is_some() || entry.kind == Some(LibraryKind::Project) {
                continue;
            }
            let identity = LibraryIdentity::package(&entry.name, entry.version.clone());
            entry.content_hash = cache.content_hash(&identity)?;
        }
        Ok(())
    }

    /// The version 1 rendition: Project entries and per-library kind tags
    /// are dropped, for consumers predating both.
    #[must_use]
    pub fn downgrade_to_v1(&self) -> Self {
        let mut v1 = self.clone();
        v1.version = 1;
        v1.libraries.retain(|l| l.kind != Some(LibraryKind::Project));
        for library in &mut v1.libraries {
            library.kind = None;
        }
        v1
    }

    /// Canonical serialization bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut raw = serde_json::to_vec_pretty(self)
            .map_err(|e| depot_core::Error::serialization(e.to_string()))?;
        raw.push(b'\n');
        Ok(raw)
    }

    /// Write the artifact atomically, skipping the write when the bytes on
    /// disk already match. Returns whether the file changed.
    pub fn write_if_changed(&self, path: &Path) -> Result<bool> {
        let bytes = self.to_bytes()?;
        if let Ok(existing) = fs::read(path) {
            if existing == bytes {
                return Ok(false);
            }
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| depot_core::Error::io(e, parent, "create_dir"))?;
        }
        let mut staged = tempfile::NamedTempFile::new_in(
            path.parent().unwrap_or_else(|| Path::new(".")),
        )
        .map_err(|e| depot_core::Error::io(e, path, "create"))?;
        std::io::Write::write_all(&mut staged, &bytes)
            .map_err(|e| depot_core::Error::io(e, path, "write"))?;
        staged
            .persist(path)
            .map_err(|e| depot_core::Error::io(e.error, path, "rename"))?;
        Ok(true)
    }
}

/// Build the artifact from resolved graphs.
///
/// Entries from `existing` are reused when the resolved identity is
/// unchanged, so content hashes recorded by earlier restores survive and
/// artifact diffs stay minimal.
pub fn build(
    existing: Option<&LockArtifact>,
    spec: &DependencyGraphSpec,
    graphs: &[RestoreTargetGraph],
    cache: &PackageCache,
    info: &PackageInfoMap,
    logs: Vec<RestoreLogMessage>,
) -> Result<LockArtifact> {
    let mut libraries: Vec<LibraryEntry> = Vec::new();
    for graph in graphs {
        for identity in &graph.resolved {
            if is_root_project(spec, identity) {
                continue;
            }
            if libraries
                .iter()
                .any(|l| l.name.eq_ignore_ascii_case(&identity.name) && l.version == identity.version)
            {
                continue;
            }

            let mut content_hash = None;
            let mut path = None;
            if identity.kind == LibraryKind::Package {
                content_hash = cache.content_hash(identity)?;
                path = Some(format!("{}/{}", identity.name_key(), identity.version));
            }
            if content_hash.is_none() {
                if let Some(previous) = existing.and_then(|e| e.library(&identity.name, &identity.version)) {
                    content_hash.clone_from(&previous.content_hash);
                }
            }

            libraries.push(LibraryEntry {
                name: identity.name.clone(),
                version: identity.version.clone(),
                kind: Some(identity.kind),
                content_hash,
                path,
            });
        }
    }
    libraries.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.version.cmp(&b.version))
    });

    let mut targets = Vec::new();
    for graph in graphs {
        let mut section = TargetSection {
            name: graph.pair.target_name(),
            libraries: Vec::new(),
        };
        for identity in &graph.resolved {
            if is_root_project(spec, identity) {
                continue;
            }
            let mut dependencies = BTreeMap::new();
            let mut assets = Vec::new();
            if let Some(info) = info.get(identity) {
                for dep in info.dependencies_for(&graph.pair.framework) {
                    dependencies.insert(dep.name.clone(), dep.range.to_string());
                }
                for group in
                    info.compatible_assets(&graph.pair.framework, graph.pair.runtime.as_deref())
                {
                    assets.extend(group.items.iter().cloned());
                }
                assets.sort();
                assets.dedup();
            }
            section.libraries.push(TargetLibrary {
                name: identity.name.clone(),
                version: identity.version.clone(),
                dependencies,
                assets,
            });
        }
        section.libraries.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.version.cmp(&b.version))
        });
        targets.push(section);
    }
    targets.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(LockArtifact {
        version: LOCK_ARTIFACT_VERSION,
        project: ProjectSection {
            name: spec.project_name.clone(),
            version: spec.version.clone(),
            path: spec.project_path.display().to_string(),
        },
        libraries,
        targets,
        logs,
    })
}

fn is_root_project(spec: &DependencyGraphSpec, identity: &LibraryIdentity) -> bool {
    identity.kind == LibraryKind::Project && identity.name_eq(&spec.project_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::{FrameworkRuntimePair, LogCode, TargetFrameworkInfo};
    use depot_resolver::{AssetGroup, PackageInfo};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn spec() -> DependencyGraphSpec {
        DependencyGraphSpec {
            project_name: "app".to_string(),
            project_path: PathBuf::from("/src/app/app.proj"),
            version: Version::new(1, 0, 0),
            frameworks: vec![TargetFrameworkInfo::new("net8.0".parse().unwrap(), Vec::new())],
            runtimes: Vec::new(),
            sources: Vec::new(),
            lock: depot_core::LockSettings::default(),
            audit: depot_core::AuditSettings::default(),
            metadata: std::collections::BTreeMap::new(),
        }
    }

    fn graph(resolved: Vec<LibraryIdentity>) -> RestoreTargetGraph {
        let mut graph = RestoreTargetGraph::placeholder(FrameworkRuntimePair::new(
            "net8.0".parse().unwrap(),
        ));
        graph.resolved = resolved;
        graph
    }

    #[test]
    fn test_build_is_byte_stable() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path());
        let spec = spec();
        let graphs = vec![graph(vec![
            LibraryIdentity::package("zeta", Version::new(1, 0, 0)),
            LibraryIdentity::package("alpha", Version::new(1, 0, 0)),
        ])];
        let info = HashMap::new();

        let a = build(None, &spec, &graphs, &cache, &info, Vec::new()).unwrap();
        let b = build(None, &spec, &graphs, &cache, &info, Vec::new()).unwrap();
        assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());

        let names: Vec<_> = a.libraries.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_root_project_excluded_from_libraries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path());
        let spec = spec();
        let graphs = vec![graph(vec![
            LibraryIdentity::project("app", Version::new(1, 0, 0)),
            LibraryIdentity::package("dep", Version::new(1, 0, 0)),
        ])];

        let artifact = build(None, &spec, &graphs, &cache, &HashMap::new(), Vec::new()).unwrap();
        assert_eq!(artifact.libraries.len(), 1);
        assert_eq!(artifact.libraries[0].name, "dep");
    }

    #[test]
    fn test_existing_content_hash_reused() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path());
        let spec = spec();
        let graphs = vec![graph(vec![LibraryIdentity::package(
            "dep",
            Version::new(1, 0, 0),
        )])];

        let mut previous = build(None, &spec, &graphs, &cache, &HashMap::new(), Vec::new()).unwrap();
        previous.libraries[0].content_hash = Some("cafe".to_string());

        let next = build(Some(&previous), &spec, &graphs, &cache, &HashMap::new(), Vec::new())
            .unwrap();
        assert_eq!(next.libraries[0].content_hash.as_deref(), Some("cafe"));
    }

    #[test]
    fn test_v1_downgrade_drops_projects_and_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path());
        let spec = spec();
        let graphs = vec![graph(vec![
            LibraryIdentity::package("pkg", Version::new(1, 0, 0)),
            LibraryIdentity::project("sibling", Version::new(1, 0, 0)),
        ])];

        let artifact = build(None, &spec, &graphs, &cache, &HashMap::new(), Vec::new()).unwrap();
        assert_eq!(artifact.libraries.len(), 2);

        let v1 = artifact.downgrade_to_v1();
        assert_eq!(v1.version, 1);
        assert_eq!(v1.libraries.len(), 1);
        assert_eq!(v1.libraries[0].name, "pkg");
        assert!(v1.libraries[0].kind.is_none());
    }

    #[test]
    fn test_write_if_changed_skips_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depot.assets.json");
        let artifact = LockArtifact::empty(
            &spec(),
            vec![RestoreLogMessage::warning(LogCode::DP1605, "downgrade")],
        );

        assert!(artifact.write_if_changed(&path).unwrap());
        assert!(!artifact.write_if_changed(&path).unwrap());

        let reloaded = LockArtifact::load(&path).unwrap();
        assert_eq!(reloaded, artifact);
    }

    #[test]
    fn test_target_assets_honor_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path());
        let spec = spec();
        let identity = LibraryIdentity::package("native", Version::new(1, 0, 0));
        let mut with_rid = graph(vec![identity.clone()]);
        with_rid.pair = FrameworkRuntimePair::with_runtime("net8.0".parse().unwrap(), "linux-x64");

        let mut info = HashMap::new();
        info.insert(
            identity,
            PackageInfo {
                dependencies: Vec::new(),
                assets: vec![
                    AssetGroup {
                        framework: "net8.0".parse().unwrap(),
                        runtime: None,
                        items: vec!["lib/net8.0/native.dll".to_string()],
                    },
                    AssetGroup {
                        framework: "net8.0".parse().unwrap(),
                        runtime: Some("linux-x64".to_string()),
                        items: vec!["runtimes/linux-x64/native/native.so".to_string()],
                    },
                ],
            },
        );

        let artifact = build(None, &spec, &[with_rid], &cache, &info, Vec::new()).unwrap();
        let target = &artifact.targets[0];
        assert_eq!(target.name, "net8.0/linux-x64");
        assert_eq!(target.libraries[0].assets.len(), 2);
    }
}
