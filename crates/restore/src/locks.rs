//! The reproducible packages lock file.
//!
//! A TOML file pinning every resolved dependency per target, written only
//! when lock files are enabled for the project. Before walking, the
//! evaluator decides whether the file still matches the spec; a valid file
//! feeds exact versions to the walker, an invalid one either triggers
//! regeneration or, in locked mode, fails the restore outright. The file is
//! rewritten whole or not at all.

use crate::assets::LockArtifact;
use crate::{Error, Result};
use depot_core::{DependencyGraphSpec, LibraryKind, RestoreLogMessage, Version, VersionRange};
use depot_core::{FrameworkRuntimePair, LogCode};
use depot_resolver::RestoreTargetGraph;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Current lock file format version.
pub const LOCK_FILE_VERSION: u32 = 1;

/// How a locked dependency entered the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockedDependencyKind {
    /// Declared directly by the project.
    Direct,
    /// Pulled in by another dependency.
    Transitive,
    /// A project reference.
    Project,
}

/// One pinned dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedDependency {
    /// Dependency name.
    pub name: String,
    /// How the dependency entered the graph.
    pub kind: LockedDependencyKind,
    /// The declared range, for direct dependencies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested: Option<VersionRange>,
    /// The pinned resolved version.
    pub resolved: Version,
    /// Hex SHA-256 of the installed content, when known at write time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

/// Pinned dependencies for one (framework, runtime) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockTarget {
    /// Target framework string.
    pub framework: String,
    /// Runtime identifier, absent for the framework-only graph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    /// Pinned dependencies, sorted by lowercase name.
    #[serde(default)]
    pub dependencies: Vec<LockedDependency>,
}

/// The persisted lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagesLockFile {
    /// Lock file format version.
    pub version: u32,
    /// One entry per resolved pair.
    #[serde(default)]
    pub targets: Vec<LockTarget>,
}

impl PackagesLockFile {
    /// Load a lock file. A missing file reads as `None`; a newer format
    /// version or unparseable content is an error, since silently ignoring
    /// a pin file would defeat its purpose.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)
            .map_err(|e| depot_core::Error::io(e, path, "read"))?;
        let file: Self = toml::from_str(&raw)
            .map_err(|e| Error::lock_file(path.display(), e.to_string()))?;
        if file.version > LOCK_FILE_VERSION {
            return Err(Error::lock_file(
                path.display(),
                format!(
                    "version {} is newer than the supported version {LOCK_FILE_VERSION}",
                    file.version
                ),
            ));
        }
        Ok(Some(file))
    }

    /// Write the whole file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| depot_core::Error::io(e, parent, "create_dir"))?;
        }
        let raw = toml::to_string_pretty(self)
            .map_err(|e| depot_core::Error::serialization(e.to_string()))?;
        let mut staged = tempfile::NamedTempFile::new_in(
            path.parent().unwrap_or_else(|| Path::new(".")),
        )
        .map_err(|e| depot_core::Error::io(e, path, "create"))?;
        std::io::Write::write_all(&mut staged, raw.as_bytes())
            .map_err(|e| depot_core::Error::io(e, path, "write"))?;
        staged
            .persist(path)
            .map_err(|e| depot_core::Error::io(e.error, path, "rename"))?;
        Ok(())
    }

    /// The target entry for a pair, if present.
    #[must_use]
    pub fn target_for(&self, pair: &FrameworkRuntimePair) -> Option<&LockTarget> {
        let framework = pair.framework.to_string();
        self.targets
            .iter()
            .find(|t| t.framework == framework && t.runtime == pair.runtime)
    }

    /// The exact versions a valid lock file authorizes for a pair, fed to
    /// the walker's locked set.
    #[must_use]
    pub fn locked_versions(&self, pair: &FrameworkRuntimePair) -> Vec<(String, Version)> {
        self.target_for(pair).map_or_else(Vec::new, |target| {
            target
                .dependencies
                .iter()
                .map(|d| (d.name.clone(), d.resolved.clone()))
                .collect()
        })
    }
}

/// How the lock file relates to the current spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// No lock file on disk.
    Absent,
    /// A lock file exists although lock files are disabled for the project.
    DisabledButPresent,
    /// The lock file matches the spec; its pins are authoritative.
    Valid,
    /// The lock file no longer matches the spec.
    Invalid {
        /// What drifted.
        reason: String,
    },
}

/// Evaluator output.
#[derive(Debug)]
pub struct LockFileEvaluation {
    /// How the file relates to the spec.
    pub outcome: LockOutcome,
    /// The parsed file, when one was readable.
    pub lock_file: Option<PackagesLockFile>,
}

/// Decide how the on-disk lock file relates to the current spec.
pub fn evaluate(path: &Path, spec: &DependencyGraphSpec) -> Result<LockFileEvaluation> {
    if !path.exists() {
        return Ok(LockFileEvaluation {
            outcome: LockOutcome::Absent,
            lock_file: None,
        });
    }
    if !spec.lock.enabled {
        return Ok(LockFileEvaluation {
            outcome: LockOutcome::DisabledButPresent,
            lock_file: None,
        });
    }

    let file = match PackagesLockFile::load(path) {
        Ok(Some(file)) => file,
        Ok(None) => {
            return Ok(LockFileEvaluation {
                outcome: LockOutcome::Absent,
                lock_file: None,
            });
        }
        Err(e) => {
            return Ok(LockFileEvaluation {
                outcome: LockOutcome::Invalid {
                    reason: e.to_string(),
                },
                lock_file: None,
            });
        }
    };

    if let Some(reason) = drift_reason(&file, spec) {
        return Ok(LockFileEvaluation {
            outcome: LockOutcome::Invalid { reason },
            lock_file: Some(file),
        });
    }

    Ok(LockFileEvaluation {
        outcome: LockOutcome::Valid,
        lock_file: Some(file),
    })
}

/// The first mismatch between the lock file and the spec, or `None` when
/// the file is still authoritative.
fn drift_reason(file: &PackagesLockFile, spec: &DependencyGraphSpec) -> Option<String> {
    for pair in spec.pairs() {
        let Some(target) = file.target_for(&pair) else {
            return Some(format!("no locked target for '{pair}'"));
        };

        let Some(info) = spec.framework_info(&pair.framework) else {
            continue;
        };

        for dep in &info.dependencies {
            let pin = info.central_versions.get(&dep.name.to_lowercase());
            let effective = dep.effective_range(pin);
            let Some(locked) = target.dependencies.iter().find(|d| {
                d.kind == LockedDependencyKind::Direct && d.name.eq_ignore_ascii_case(&dep.name)
            }) else {
                return Some(format!("direct dependency '{}' is not locked", dep.name));
            };
            if locked.requested.as_ref() != Some(effective) {
                return Some(format!(
                    "requested range for '{}' changed from {} to {effective}",
                    dep.name,
                    locked
                        .requested
                        .as_ref()
                        .map_or_else(|| "none".to_string(), ToString::to_string),
                ));
            }
        }

        for locked in &target.dependencies {
            if locked.kind == LockedDependencyKind::Direct
                && !info
                    .dependencies
                    .iter()
                    .any(|d| d.name.eq_ignore_ascii_case(&locked.name))
            {
                return Some(format!(
                    "locked direct dependency '{}' is no longer declared",
                    locked.name
                ));
            }
        }
    }
    None
}

/// Regenerate the lock file from resolved graphs and the built artifact.
#[must_use]
pub fn build(
    spec: &DependencyGraphSpec,
    graphs: &[RestoreTargetGraph],
    artifact: &LockArtifact,
) -> PackagesLockFile {
    let mut targets = Vec::new();
    for graph in graphs {
        let info = spec.framework_info(&graph.pair.framework);
        let mut dependencies = Vec::new();
        for identity in &graph.resolved {
            if identity.kind == LibraryKind::Project && identity.name_eq(&spec.project_name) {
                continue;
            }
            let kind = if identity.kind == LibraryKind::Project {
                LockedDependencyKind::Project
            } else if spec.is_direct_dependency(&identity.name) {
                LockedDependencyKind::Direct
            } else {
                LockedDependencyKind::Transitive
            };
            let requested = if kind == LockedDependencyKind::Direct {
                info.and_then(|i| {
                    i.dependencies
                        .iter()
                        .find(|d| d.name.eq_ignore_ascii_case(&identity.name))
                        .map(|d| {
                            d.effective_range(
                                i.central_versions.get(&d.name.to_lowercase()),
                            )
                            .clone()
                        })
                })
            } else {
                None
            };
            dependencies.push(LockedDependency {
                name: identity.name.clone(),
                kind,
                requested,
                resolved: identity.version.clone(),
                content_hash: artifact
                    .library(&identity.name, &identity.version)
                    .and_then(|l| l.content_hash.clone()),
            });
        }
        dependencies.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        targets.push(LockTarget {
            framework: graph.pair.framework.to_string(),
            runtime: graph.pair.runtime.clone(),
            dependencies,
        });
    }
    targets.sort_by(|a, b| {
        a.framework
            .cmp(&b.framework)
            .then_with(|| a.runtime.cmp(&b.runtime))
    });

    PackagesLockFile {
        version: LOCK_FILE_VERSION,
        targets,
    }
}

/// Compare installed content hashes against the pins of a valid lock file.
/// Each mismatch is a restore-failing error.
#[must_use]
pub fn validate_content_hashes(
    file: &PackagesLockFile,
    artifact: &LockArtifact,
) -> Vec<RestoreLogMessage> {
    let mut messages = Vec::new();
    for target in &file.targets {
        for locked in &target.dependencies {
            let Some(expected) = &locked.content_hash else {
                continue;
            };
            let actual = artifact
                .library(&locked.name, &locked.resolved)
                .and_then(|l| l.content_hash.as_ref());
            if let Some(actual) = actual {
                if actual != expected {
                    messages.push(
                        RestoreLogMessage::error(
                            LogCode::DP1403,
                            format!(
                                "Content hash of '{}/{}' does not match the locked hash",
                                locked.name, locked.resolved
                            ),
                        )
                        .with_library(locked.name.clone()),
                    );
                }
            }
        }
    }
    messages
}
