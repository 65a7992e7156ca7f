//! The restore's summarized outcome.

use crate::audit::AuditOutcome;
use crate::compat::CompatibilityResult;
use depot_core::RestoreLogMessage;
use depot_resolver::RestoreTargetGraph;
use std::path::PathBuf;

/// Everything a caller learns from one restore.
#[derive(Debug)]
pub struct RestoreResult {
    /// Whether the restore succeeded.
    pub success: bool,
    /// Whether the no-op fast path short-circuited the restore.
    pub cache_hit: bool,
    /// Whether the artifact bytes on disk changed.
    pub output_changed: bool,
    /// One graph per (framework, runtime) pair.
    pub graphs: Vec<RestoreTargetGraph>,
    /// Asset compatibility results.
    pub compatibility: CompatibilityResult,
    /// Vulnerability audit summary.
    pub audit: AuditOutcome,
    /// Where the lock artifact was written.
    pub artifact_path: PathBuf,
    /// Where the cache record was written.
    pub cache_record_path: PathBuf,
    /// The packages lock file, when lock files are enabled.
    pub lock_file_path: Option<PathBuf>,
    /// Every diagnostic the restore produced, in arrival order.
    pub logs: Vec<RestoreLogMessage>,
}

impl RestoreResult {
    /// Error-level messages only.
    pub fn errors(&self) -> impl Iterator<Item = &RestoreLogMessage> + '_ {
        self.logs.iter().filter(|m| m.is_error())
    }
}
