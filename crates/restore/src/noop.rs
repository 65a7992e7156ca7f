//! The no-op fast path.
//!
//! A successful restore persists a small cache record next to the artifact.
//! The next restore is skipped entirely when the record proves nothing
//! relevant changed: same spec hash, recorded success, same project, and
//! every expected output file still on disk. A hit replays the persisted
//! log messages so the caller sees the same warnings the original restore
//! produced.
//!
//! Writes are two-phase: a pending record with `success = false` lands
//! before any real work, and the final state overwrites it at the end. A
//! crash mid-restore therefore leaves a record that can never satisfy the
//! hit predicate.

use crate::{Result, paths::RestorePaths};
use depot_core::{DependencyGraphSpec, RestoreLogMessage};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Current cache record format version.
pub const CACHE_RECORD_VERSION: u32 = 1;

/// The persisted no-op cache record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Record format version.
    pub version: u32,
    /// Hash of the spec that produced this restore.
    pub spec_hash: String,
    /// Whether the restore succeeded.
    pub success: bool,
    /// The project the record belongs to; guards against two projects
    /// sharing one output path.
    pub project_path: PathBuf,
    /// Output files that must exist for the record to be trusted.
    pub expected_files: Vec<PathBuf>,
    /// Log messages to replay on a hit.
    #[serde(default)]
    pub logs: Vec<RestoreLogMessage>,
}

impl CacheRecord {
    /// The pending record written before any real restore work.
    #[must_use]
    pub fn pending(spec_hash: impl Into<String>, project_path: impl Into<PathBuf>) -> Self {
        Self {
            version: CACHE_RECORD_VERSION,
            spec_hash: spec_hash.into(),
            success: false,
            project_path: project_path.into(),
            expected_files: Vec::new(),
            logs: Vec::new(),
        }
    }

    /// Load a record, tolerating absence and corruption: both read as
    /// `None`, which simply forces a full restore. Records written by a
    /// newer format version are ignored the same way.
    #[must_use]
    pub fn load(path: &Path) -> Option<Self> {
        let raw = fs::read_to_string(path).ok()?;
        let record: Self = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "unreadable cache record");
                return None;
            }
        };
        if record.version > CACHE_RECORD_VERSION {
            tracing::debug!(
                path = %path.display(),
                version = record.version,
                "cache record from a newer format, ignoring"
            );
            return None;
        }
        Some(record)
    }

    /// Write the record atomically.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| depot_core::Error::io(e, parent, "create_dir"))?;
        }
        let raw = serde_json::to_string_pretty(self)
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
}

/// Outcome of the no-op check.
#[derive(Debug, Clone)]
pub enum NoOpEvaluation {
    /// Nothing changed; the persisted logs are replayed and the restore is
    /// skipped.
    Hit {
        /// Logs from the original restore.
        logs: Vec<RestoreLogMessage>,
    },
    /// A full restore is required.
    Miss {
        /// Why the record did not qualify.
        reason: String,
    },
}

/// Decide whether the previous restore's outputs can be reused as-is.
#[must_use]
pub fn evaluate(spec_hash: &str, spec: &DependencyGraphSpec, paths: &RestorePaths) -> NoOpEvaluation {
    let Some(record) = CacheRecord::load(&paths.cache_record) else {
        return NoOpEvaluation::Miss {
            reason: "no usable cache record".to_string(),
        };
    };

    if record.spec_hash != spec_hash {
        return NoOpEvaluation::Miss {
            reason: "restore inputs changed".to_string(),
        };
    }
    if !record.success {
        return NoOpEvaluation::Miss {
            reason: "previous restore did not succeed".to_string(),
        };
    }
    if record.project_path != spec.project_path {
        return NoOpEvaluation::Miss {
            reason: "cache record belongs to a different project".to_string(),
        };
    }
    if let Some(missing) = record.expected_files.iter().find(|f| !f.exists()) {
        return NoOpEvaluation::Miss {
            reason: format!("expected output '{}' is missing", missing.display()),
        };
    }

    NoOpEvaluation::Hit { logs: record.logs }
}
