//! Output locations for one restore.

use std::path::{Path, PathBuf};

/// Where a restore persists its outputs. Supplied by the caller; the engine
/// never discovers paths on its own.
#[derive(Debug, Clone)]
pub struct RestorePaths {
    /// The lock artifact (assets) file.
    pub artifact: PathBuf,
    /// The no-op cache record.
    pub cache_record: PathBuf,
    /// The reproducible packages lock file.
    pub lock_file: PathBuf,
    /// Root directory of the local package cache.
    pub package_root: PathBuf,
}

impl RestorePaths {
    /// Conventional layout under one output directory:
    /// `depot.assets.json`, `depot.cache.json`, `packages.lock.toml` and a
    /// `packages/` cache root.
    #[must_use]
    pub fn under(output_dir: impl AsRef<Path>) -> Self {
        let dir = output_dir.as_ref();
        Self {
            artifact: dir.join("depot.assets.json"),
            cache_record: dir.join("depot.cache.json"),
            lock_file: dir.join("packages.lock.toml"),
            package_root: dir.join("packages"),
        }
    }

    /// Use an explicit lock file location instead of the conventional one.
    #[must_use]
    pub fn with_lock_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file = path.into();
        self
    }
}
