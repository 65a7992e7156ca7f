//! The dependency graph spec.
//!
//! A [`DependencyGraphSpec`] is the full, order-independent description of a
//! project's restorable inputs: target frameworks, direct dependency ranges,
//! central version pins, runtime identifiers, package sources and lock/audit
//! settings. It is immutable for the duration of one restore and serializes
//! to a stable hash that underpins the no-op fast path: any change to a
//! field that affects resolution changes the hash, while free-form metadata
//! is excluded.

use crate::framework::{Framework, FrameworkRuntimePair};
use crate::version::VersionRange;
use crate::{Error, Result};
use semver::Version;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One direct dependency declared by a target framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Package or project name.
    pub name: String,
    /// Declared range. Under central version management this may be the
    /// unbounded range, with the effective range supplied by a pin.
    pub range: VersionRange,
    /// Whether the version is centrally managed.
    #[serde(default)]
    pub central: bool,
    /// Per-reference override; wins over a central pin when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_override: Option<VersionRange>,
}

impl Dependency {
    /// A plain direct dependency.
    #[must_use]
    pub fn new(name: impl Into<String>, range: VersionRange) -> Self {
        Self {
            name: name.into(),
            range,
            central: false,
            version_override: None,
        }
    }

    /// The range resolution actually uses, given any central pin for this
    /// name: an explicit override wins, then the central pin, then the
    /// declared range.
    #[must_use]
    pub fn effective_range<'a>(&'a self, central_pin: Option<&'a VersionRange>) -> &'a VersionRange {
        if let Some(over) = &self.version_override {
            return over;
        }
        if self.central {
            if let Some(pin) = central_pin {
                return pin;
            }
        }
        &self.range
    }
}

/// A download-only package reference: content is restored but the package
/// never participates in graph resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadDependency {
    /// Package name.
    pub name: String,
    /// Exact version to download.
    pub version: Version,
}

/// Per-target-framework restore inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFrameworkInfo {
    /// The target framework.
    pub framework: Framework,
    /// Direct dependencies.
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    /// Central version pins, keyed by lowercase package name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub central_versions: BTreeMap<String, VersionRange>,
    /// Download-only references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub downloads: Vec<DownloadDependency>,
}

impl TargetFrameworkInfo {
    /// A framework with direct dependencies and no pins.
    #[must_use]
    pub fn new(framework: Framework, dependencies: Vec<Dependency>) -> Self {
        Self {
            framework,
            dependencies,
            central_versions: BTreeMap::new(),
            downloads: Vec::new(),
        }
    }

    /// Whether any dependency on this framework is centrally managed.
    #[must_use]
    pub fn central_management_enabled(&self) -> bool {
        !self.central_versions.is_empty() || self.dependencies.iter().any(|d| d.central)
    }
}

/// Reproducible lock file behavior for the project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSettings {
    /// Whether a reproducible lock file is maintained.
    #[serde(default)]
    pub enabled: bool,
    /// Whether drift between the lock file and the spec is a hard failure
    /// instead of a regeneration trigger.
    #[serde(default)]
    pub locked_mode: bool,
    /// Lock file location; defaults to `packages.lock.toml` next to the
    /// project when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// How audit findings are classified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditMode {
    /// Only direct dependencies are reported.
    Direct,
    /// Direct and transitive dependencies are reported.
    #[default]
    All,
}

/// Vulnerability audit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSettings {
    /// Whether the audit runs at all.
    #[serde(default)]
    pub enabled: bool,
    /// Minimum severity (0 = low .. 3 = critical) that produces a message.
    #[serde(default)]
    pub minimum_severity: u8,
    /// Which dependency classes are reported.
    #[serde(default)]
    pub mode: AuditMode,
    /// Whether findings at or above the threshold fail the restore.
    #[serde(default)]
    pub treat_as_errors: bool,
    /// Advisory URLs excluded from the tallies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suppressed_urls: Vec<String>,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            minimum_severity: 0,
            mode: AuditMode::All,
            treat_as_errors: false,
            suppressed_urls: Vec::new(),
        }
    }
}

/// The full restorable input description for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraphSpec {
    /// Project name.
    pub project_name: String,
    /// Project file path; recorded in the cache record to guard against two
    /// projects sharing one cache path.
    pub project_path: PathBuf,
    /// Project version.
    pub version: Version,
    /// Target frameworks with their direct dependencies.
    pub frameworks: Vec<TargetFrameworkInfo>,
    /// Runtime identifiers to resolve runtime-specific graphs for.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub runtimes: Vec<String>,
    /// Package source names, in priority order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    /// Reproducible lock file settings.
    #[serde(default)]
    pub lock: LockSettings,
    /// Vulnerability audit settings.
    #[serde(default)]
    pub audit: AuditSettings,
    /// Free-form metadata; never hashed, never affects resolution.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl DependencyGraphSpec {
    /// The ordered list of (framework, runtime) pairs to resolve: every
    /// framework with no runtime first, then every framework crossed with
    /// every runtime identifier.
    #[must_use]
    pub fn pairs(&self) -> Vec<FrameworkRuntimePair> {
        let mut pairs =
            Vec::with_capacity(self.frameworks.len() * (self.runtimes.len() + 1));
        for fw in &self.frameworks {
            pairs.push(FrameworkRuntimePair::new(fw.framework.clone()));
        }
        for fw in &self.frameworks {
            for rid in &self.runtimes {
                pairs.push(FrameworkRuntimePair::with_runtime(
                    fw.framework.clone(),
                    rid.clone(),
                ));
            }
        }
        pairs
    }

    /// The per-framework inputs for a pair's framework.
    #[must_use]
    pub fn framework_info(&self, framework: &Framework) -> Option<&TargetFrameworkInfo> {
        self.frameworks.iter().find(|f| &f.framework == framework)
    }

    /// Whether any target framework uses central version management.
    #[must_use]
    pub fn central_management_enabled(&self) -> bool {
        self.frameworks
            .iter()
            .any(TargetFrameworkInfo::central_management_enabled)
    }

    /// Whether `name` is a direct dependency of any target framework.
    #[must_use]
    pub fn is_direct_dependency(&self, name: &str) -> bool {
        self.frameworks.iter().any(|fw| {
            fw.dependencies
                .iter()
                .any(|d| d.name.eq_ignore_ascii_case(name))
        })
    }

    /// Stable hex hash of every resolution-relevant field.
    ///
    /// Collections whose order carries no meaning are sorted before
    /// hashing, and `metadata` is skipped entirely, so logically identical
    /// specs always hash identically.
    pub fn hash(&self) -> Result<String> {
        let mut canonical = self.clone();
        canonical.metadata.clear();
        canonical.runtimes.sort();
        canonical.sources.sort();
        canonical
            .frameworks
            .sort_by(|a, b| a.framework.cmp(&b.framework));
        for fw in &mut canonical.frameworks {
            fw.dependencies
                .sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
            fw.downloads
                .sort_by(|a, b| {
                    a.name
                        .to_lowercase()
                        .cmp(&b.name.to_lowercase())
                        .then_with(|| a.version.cmp(&b.version))
                });
        }
        canonical.audit.suppressed_urls.sort();

        let bytes = serde_json::to_vec(&canonical)
            .map_err(|e| Error::serialization(e.to_string()))?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}
