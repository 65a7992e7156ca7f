//! The local package cache.
//!
//! Layout is deterministic: `{root}/{lowercase name}/{version}/` holds the
//! package content blob plus a `.metadata.json` sidecar recording the
//! SHA-256 content hash. The hash is computed once at install time and
//! never re-verified on read. Installs stage into a temporary directory and
//! rename into place, so concurrent installs of the same identity are
//! idempotent and readers never observe partial content.

use crate::{Error, Result};
use depot_core::LibraryIdentity;
use semver::Version;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;

const CONTENT_FILE: &str = "package.bin";
const SATELLITE_FILE: &str = "satellite.bin";
const METADATA_FILE: &str = ".metadata.json";

/// Sidecar metadata written at install time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Hex SHA-256 of the installed content blob.
    pub content_hash: String,
    /// Content blob size in bytes.
    pub size: u64,
}

/// A package cache rooted at one directory.
#[derive(Debug, Clone)]
pub struct PackageCache {
    root: PathBuf,
}

impl PackageCache {
    /// A cache rooted at `root`. The directory is created lazily on first
    /// install.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The cache root directory.
    #[must_use]
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Directory an identity installs into.
    #[must_use]
    pub fn package_dir(&self, name: &str, version: &Version) -> PathBuf {
        self.root.join(name.to_lowercase()).join(version.to_string())
    }

    /// Whether an identity is fully installed.
    #[must_use]
    pub fn is_present(&self, identity: &LibraryIdentity) -> bool {
        let dir = self.package_dir(&identity.name, &identity.version);
        dir.join(CONTENT_FILE).is_file() && dir.join(METADATA_FILE).is_file()
    }

    /// The recorded content hash for an installed identity, or `None` when
    /// the identity is not installed.
    pub fn content_hash(&self, identity: &LibraryIdentity) -> Result<Option<String>> {
        let path = self
            .package_dir(&identity.name, &identity.version)
            .join(METADATA_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .map_err(|e| depot_core::Error::io(e, &path, "read"))?;
        let metadata: PackageMetadata = serde_json::from_str(&raw)
            .map_err(|e| depot_core::Error::serialization(e.to_string()))?;
        Ok(Some(metadata.content_hash))
    }

    /// Install a package's content blob, returning its content hash.
    ///
    /// Staging directory plus rename keeps the install atomic; when another
    /// install of the same identity wins the rename race, the existing
    /// content is kept and its recorded hash is returned.
    pub fn install(&self, identity: &LibraryIdentity, content: &[u8]) -> Result<String> {
        let final_dir = self.package_dir(&identity.name, &identity.version);
        if self.is_present(identity) {
            if let Some(hash) = self.content_hash(identity)? {
                return Ok(hash);
            }
        }

        let parent = final_dir
            .parent()
            .ok_or_else(|| depot_core::Error::configuration("package cache root has no parent"))?;
        fs::create_dir_all(parent).map_err(|e| depot_core::Error::io(e, parent, "create_dir"))?;

        let hash = hex::encode(Sha256::digest(content));
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(parent)
            .map_err(|e| depot_core::Error::io(e, parent, "create_dir"))?;

        let content_path = staging.path().join(CONTENT_FILE);
        fs::write(&content_path, content)
            .map_err(|e| depot_core::Error::io(e, &content_path, "write"))?;

        let metadata = PackageMetadata {
            content_hash: hash.clone(),
            size: content.len() as u64,
        };
        let metadata_path = staging.path().join(METADATA_FILE);
        let raw = serde_json::to_string_pretty(&metadata)
            .map_err(|e| depot_core::Error::serialization(e.to_string()))?;
        fs::write(&metadata_path, raw)
            .map_err(|e| depot_core::Error::io(e, &metadata_path, "write"))?;

        match fs::rename(staging.path(), &final_dir) {
            Ok(()) => {
                tracing::debug!(package = %identity, hash = %hash, "package installed");
                Ok(hash)
            }
            Err(_) if self.is_present(identity) => {
                // A concurrent install won the rename; its content stands.
                self.content_hash(identity)?.ok_or_else(|| {
                    Error::fetch(&identity.name, &identity.version, "install race left no metadata")
                })
            }
            Err(e) => Err(depot_core::Error::io(e, &final_dir, "rename").into()),
        }
    }

    /// Install satellite (localization) content next to an already installed
    /// package. A no-op when the package is absent or the satellite already
    /// exists.
    pub fn install_satellite(&self, identity: &LibraryIdentity, content: &[u8]) -> Result<()> {
        let dir = self.package_dir(&identity.name, &identity.version);
        if !self.is_present(identity) {
            return Err(Error::fetch(
                &identity.name,
                &identity.version,
                "satellite content for a package that is not installed",
            ));
        }
        let final_path = dir.join(SATELLITE_FILE);
        if final_path.is_file() {
            return Ok(());
        }

        let mut staged = tempfile::Builder::new()
            .prefix(".satellite-")
            .tempfile_in(&dir)
            .map_err(|e| depot_core::Error::io(e, &dir, "create"))?;
        std::io::Write::write_all(&mut staged, content)
            .map_err(|e| depot_core::Error::io(e, &final_path, "write"))?;
        staged
            .persist(&final_path)
            .map_err(|e| depot_core::Error::io(e.error, &final_path, "rename"))?;
        Ok(())
    }

    /// Whether satellite content exists for an identity.
    #[must_use]
    pub fn has_satellite(&self, identity: &LibraryIdentity) -> bool {
        self.package_dir(&identity.name, &identity.version)
            .join(SATELLITE_FILE)
            .is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str) -> LibraryIdentity {
        LibraryIdentity::package(name, Version::new(1, 2, 3))
    }

    #[test]
    fn test_install_then_present_with_hash() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path());
        let id = identity("Pkg.A");

        assert!(!cache.is_present(&id));
        let hash = cache.install(&id, b"content").unwrap();
        assert!(cache.is_present(&id));
        assert_eq!(cache.content_hash(&id).unwrap(), Some(hash));
    }

    #[test]
    fn test_layout_uses_lowercase_name() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path());
        cache.install(&identity("Pkg.A"), b"content").unwrap();
        assert!(dir.path().join("pkg.a").join("1.2.3").is_dir());
    }

    #[test]
    fn test_reinstall_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path());
        let id = identity("pkg");

        let first = cache.install(&id, b"content").unwrap();
        let second = cache.install(&id, b"different content ignored").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_satellite_requires_installed_package() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path());
        let id = identity("pkg");

        assert!(cache.install_satellite(&id, b"sat").is_err());
        cache.install(&id, b"content").unwrap();
        cache.install_satellite(&id, b"sat").unwrap();
        assert!(cache.has_satellite(&id));
    }
}
