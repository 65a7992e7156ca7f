//! Throttled package content fetching.
//!
//! A shared work queue drained by a bounded pool of tokio workers, one
//! worker per unit of parallelism up to the number of packages. Failures
//! are isolated per identity: the caller receives one [`FetchOutcome`] per
//! requested package and decides what a failure means. A second, equally
//! throttled pass copies satellite (localization) content for packages that
//! installed successfully.

use crate::cache::PackageCache;
use crate::{Error, Result};
use async_trait::async_trait;
use depot_core::{CancelFlag, LibraryIdentity};
use semver::Version;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;

/// Supplies raw package content.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Download the content blob for one exact package version.
    async fn download(&self, name: &str, version: &Version) -> Result<Vec<u8>>;

    /// Satellite (localization) content for a package, or `None` when the
    /// package has none.
    async fn satellite(&self, name: &str, version: &Version) -> Result<Option<Vec<u8>>>;
}

/// The result of ensuring one package is present.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// The package the outcome is about.
    pub identity: LibraryIdentity,
    /// Whether this call installed the content (as opposed to finding it
    /// already present).
    pub installed: bool,
    /// Content hash after the call, when the package is present.
    pub content_hash: Option<String>,
    /// Failure detail, when the package could not be made present.
    pub error: Option<String>,
}

impl FetchOutcome {
    /// Whether the package is present after the call.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.error.is_none()
    }
}

/// Drives downloads through the package cache with bounded parallelism.
pub struct FetchCoordinator {
    provider: Arc<dyn ContentProvider>,
    cache: PackageCache,
    max_parallelism: usize,
    cancel: CancelFlag,
}

impl FetchCoordinator {
    /// A coordinator over `provider` installing into `cache`.
    #[must_use]
    pub fn new(
        provider: Arc<dyn ContentProvider>,
        cache: PackageCache,
        max_parallelism: usize,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            provider,
            cache,
            max_parallelism: max_parallelism.max(1),
            cancel,
        }
    }

    /// Make every requested package present in the cache.
    ///
    /// Identities are deduplicated; outcomes come back sorted by identity.
    /// Concurrent calls for the same identity are safe: the cache's staged
    /// rename lets exactly one install win and both callers observe the
    /// package as present.
    pub async fn ensure_present(
        &self,
        identities: impl IntoIterator<Item = LibraryIdentity>,
    ) -> Result<Vec<FetchOutcome>> {
        let unique: HashSet<LibraryIdentity> = identities.into_iter().collect();
        let queue: Arc<Mutex<VecDeque<LibraryIdentity>>> =
            Arc::new(Mutex::new(unique.into_iter().collect()));
        let workers = self.worker_count(&queue);
        tracing::debug!(workers, "ensuring package content");

        let mut join_set = JoinSet::new();
        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let provider = Arc::clone(&self.provider);
            let cache = self.cache.clone();
            let cancel = self.cancel.clone();
            join_set.spawn(async move {
                let mut outcomes = Vec::new();
                while let Some(identity) = pop(&queue) {
                    if cancel.is_cancelled() {
                        break;
                    }
                    outcomes.push(fetch_one(&*provider, &cache, identity).await);
                }
                outcomes
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            outcomes.extend(joined.map_err(|e| Error::task(e.to_string()))?);
        }

        self.satellite_pass(&outcomes).await?;

        outcomes.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(outcomes)
    }

    /// The throttled second pass for satellite content.
    async fn satellite_pass(&self, outcomes: &[FetchOutcome]) -> Result<()> {
        let present: VecDeque<LibraryIdentity> = outcomes
            .iter()
            .filter(|o| o.is_present())
            .map(|o| o.identity.clone())
            .collect();
        let queue = Arc::new(Mutex::new(present));
        let workers = self.worker_count(&queue);

        let mut join_set = JoinSet::new();
        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let provider = Arc::clone(&self.provider);
            let cache = self.cache.clone();
            let cancel = self.cancel.clone();
            join_set.spawn(async move {
                while let Some(identity) = pop(&queue) {
                    if cancel.is_cancelled() {
                        break;
                    }
                    if cache.has_satellite(&identity) {
                        continue;
                    }
                    match provider.satellite(&identity.name, &identity.version).await {
                        Ok(Some(content)) => {
                            if let Err(e) = cache.install_satellite(&identity, &content) {
                                tracing::warn!(package = %identity, error = %e, "satellite install failed");
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(package = %identity, error = %e, "satellite lookup failed");
                        }
                    }
                }
            });
        }
        while let Some(joined) = join_set.join_next().await {
            joined.map_err(|e| Error::task(e.to_string()))?;
        }
        Ok(())
    }

    fn worker_count(&self, queue: &Arc<Mutex<VecDeque<LibraryIdentity>>>) -> usize {
        let pending = queue.lock().map_or(0, |q| q.len());
        self.max_parallelism.min(pending.max(1))
    }
}

// Lock held for the dequeue only.
fn pop(queue: &Arc<Mutex<VecDeque<LibraryIdentity>>>) -> Option<LibraryIdentity> {
    queue.lock().ok()?.pop_front()
}

async fn fetch_one(
    provider: &dyn ContentProvider,
    cache: &PackageCache,
    identity: LibraryIdentity,
) -> FetchOutcome {
    if cache.is_present(&identity) {
        let content_hash = cache.content_hash(&identity).ok().flatten();
        return FetchOutcome {
            identity,
            installed: false,
            content_hash,
            error: None,
        };
    }

    match provider.download(&identity.name, &identity.version).await {
        Ok(content) => match cache.install(&identity, &content) {
            Ok(hash) => FetchOutcome {
                identity,
                installed: true,
                content_hash: Some(hash),
                error: None,
            },
            Err(e) => FetchOutcome {
                identity,
                installed: false,
                content_hash: None,
                error: Some(e.to_string()),
            },
        },
        Err(e) => FetchOutcome {
            identity,
            installed: false,
            content_hash: None,
            error: Some(e.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixtureContent {
        blobs: HashMap<String, Vec<u8>>,
        satellites: HashMap<String, Vec<u8>>,
        downloads: AtomicUsize,
    }

    impl FixtureContent {
        fn new(blobs: &[(&str, &[u8])]) -> Self {
            Self {
                blobs: blobs
                    .iter()
                    .map(|(n, b)| ((*n).to_string(), b.to_vec()))
                    .collect(),
                satellites: HashMap::new(),
                downloads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ContentProvider for FixtureContent {
        async fn download(&self, name: &str, _version: &Version) -> Result<Vec<u8>> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            self.blobs
                .get(name)
                .cloned()
                .ok_or_else(|| Error::fetch(name, "1.0.0", "not found"))
        }

        async fn satellite(&self, name: &str, _version: &Version) -> Result<Option<Vec<u8>>> {
            Ok(self.satellites.get(name).cloned())
        }
    }

    fn identity(name: &str) -> LibraryIdentity {
        LibraryIdentity::package(name, Version::new(1, 0, 0))
    }

    #[tokio::test]
    async fn test_fetch_installs_missing_packages() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path());
        let provider = Arc::new(FixtureContent::new(&[("a", b"aa"), ("b", b"bb")]));
        let coordinator =
            FetchCoordinator::new(provider, cache.clone(), 4, CancelFlag::new());

        let outcomes = coordinator
            .ensure_present([identity("a"), identity("b")])
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(FetchOutcome::is_present));
        assert!(outcomes.iter().all(|o| o.installed));
        assert!(cache.is_present(&identity("a")));
        assert!(cache.is_present(&identity("b")));
    }

    #[tokio::test]
    async fn test_present_package_is_not_downloaded_again() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path());
        let provider = Arc::new(FixtureContent::new(&[("a", b"aa")]));
        let coordinator = FetchCoordinator::new(
            Arc::clone(&provider) as Arc<dyn ContentProvider>,
            cache,
            4,
            CancelFlag::new(),
        );

        coordinator.ensure_present([identity("a")]).await.unwrap();
        let outcomes = coordinator.ensure_present([identity("a")]).await.unwrap();

        assert_eq!(provider.downloads.load(Ordering::SeqCst), 1);
        assert!(!outcomes[0].installed);
        assert!(outcomes[0].is_present());
    }

    #[tokio::test]
    async fn test_failure_is_isolated_per_identity() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path());
        let provider = Arc::new(FixtureContent::new(&[("good", b"gg")]));
        let coordinator =
            FetchCoordinator::new(provider, cache, 2, CancelFlag::new());

        let outcomes = coordinator
            .ensure_present([identity("good"), identity("bad")])
            .await
            .unwrap();

        let bad = outcomes.iter().find(|o| o.identity.name_eq("bad")).unwrap();
        let good = outcomes.iter().find(|o| o.identity.name_eq("good")).unwrap();
        assert!(bad.error.is_some());
        assert!(good.is_present());
    }

    #[tokio::test]
    async fn test_duplicate_identities_fetch_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path());
        let provider = Arc::new(FixtureContent::new(&[("a", b"aa")]));
        let coordinator = FetchCoordinator::new(
            Arc::clone(&provider) as Arc<dyn ContentProvider>,
            cache,
            4,
            CancelFlag::new(),
        );

        let outcomes = coordinator
            .ensure_present([identity("a"), identity("A")])
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 1);
        assert_eq!(provider.downloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_satellite_content_copied() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path());
        let mut fixture = FixtureContent::new(&[("a", b"aa")]);
        fixture.satellites.insert("a".to_string(), b"sat".to_vec());
        let coordinator = FetchCoordinator::new(
            Arc::new(fixture),
            cache.clone(),
            2,
            CancelFlag::new(),
        );

        coordinator.ensure_present([identity("a")]).await.unwrap();
        assert!(cache.has_satellite(&identity("a")));
    }

    #[tokio::test]
    async fn test_concurrent_ensure_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PackageCache::new(dir.path());
        let provider = Arc::new(FixtureContent::new(&[("a", b"aa")]));
        let coordinator = Arc::new(FetchCoordinator::new(
            provider,
            cache.clone(),
            4,
            CancelFlag::new(),
        ));

        let left = Arc::clone(&coordinator);
        let right = Arc::clone(&coordinator);
        let (a, b) = tokio::join!(
            left.ensure_present([identity("a")]),
            right.ensure_present([identity("a")]),
        );

        let a = a.unwrap();
        let b = b.unwrap();
        assert!(a[0].is_present() && b[0].is_present());
        assert_eq!(a[0].content_hash, b[0].content_hash);
        assert!(cache.is_present(&identity("a")));
    }
}
