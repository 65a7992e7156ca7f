//! The restore state machine.
//!
//! One [`RestoreOrchestrator::restore`] call drives a full restore:
//! precondition validation, the no-op check, lock file evaluation, one
//! graph walk per (framework, runtime) pair, conflict validation,
//! concurrent compatibility and audit checks, artifact building, content
//! fetching and finalization. Failures accumulate as error-level log
//! messages; the orchestrator only returns `Err` for cancellation and
//! genuinely unrecoverable I/O.

use crate::audit::{self, AuditOutcome, VulnerabilityProvider};
use crate::cache::PackageCache;
use crate::compat::{self, IncompatibilityKind};
use crate::fetch::{ContentProvider, FetchCoordinator};
use crate::locks::{self, LockOutcome};
use crate::noop::{self, CacheRecord, NoOpEvaluation};
use crate::paths::RestorePaths;
use crate::result::RestoreResult;
use crate::{PackageInfoMap, Result, assets};
use depot_core::{
    CancelFlag, DependencyGraphSpec, LibraryIdentity, LogCode, RestoreLog, RestoreLogMessage,
};
use depot_resolver::{GraphWalker, MetadataProvider, RestoreTargetGraph, analyze};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    NoOpCheck,
    LockFileCheck,
    Walking,
    Analyzing,
    Checking,
    ArtifactBuilding,
    ContentEnsuring,
    Finalizing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Drives restores end to end.
pub struct RestoreOrchestrator {
    metadata: Arc<dyn MetadataProvider>,
    content: Arc<dyn ContentProvider>,
    vulnerabilities: Option<Arc<dyn VulnerabilityProvider>>,
    paths: RestorePaths,
    max_parallelism: usize,
    artifact_version: u32,
    cancel: CancelFlag,
}

impl RestoreOrchestrator {
    /// An orchestrator over the given providers and output locations.
    #[must_use]
    pub fn new(
        metadata: Arc<dyn MetadataProvider>,
        content: Arc<dyn ContentProvider>,
        paths: RestorePaths,
    ) -> Self {
        Self {
            metadata,
            content,
            vulnerabilities: None,
            paths,
            max_parallelism: 8,
            artifact_version: assets::LOCK_ARTIFACT_VERSION,
            cancel: CancelFlag::new(),
        }
    }

    /// Enable vulnerability auditing through `provider`.
    #[must_use]
    pub fn with_vulnerability_provider(mut self, provider: Arc<dyn VulnerabilityProvider>) -> Self {
        self.vulnerabilities = Some(provider);
        self
    }

    /// Write the artifact in format version 1, for consumers that predate
    /// project entries and per-library kind tags.
    #[must_use]
    pub fn with_artifact_version(mut self, version: u32) -> Self {
        self.artifact_version = version;
        self
    }

    /// Bound concurrent walks and downloads.
    #[must_use]
    pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = max_parallelism.max(1);
        self
    }

    /// Use a caller-owned cancellation flag.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    fn enter(&self, phase: Phase) -> Result<()> {
        self.cancel.ensure_active()?;
        tracing::debug!(phase = %phase, "restore phase");
        Ok(())
    }

    fn lock_path(&self, spec: &DependencyGraphSpec) -> PathBuf {
        spec.lock
            .path
            .clone()
            .unwrap_or_else(|| self.paths.lock_file.clone())
    }

    /// Run one full restore for `spec`.
    pub async fn restore(&self, spec: &DependencyGraphSpec) -> Result<RestoreResult> {
        self.enter(Phase::Init)?;
        let mut log = RestoreLog::new();

        let precondition_errors = validate_preconditions(spec);
        if !precondition_errors.is_empty() {
            log.extend(precondition_errors);
            let spec_hash = spec.hash()?;
            return self.finalize(spec, &spec_hash, Vec::new(), log, FinalizeInputs::failed());
        }

        let spec_hash = spec.hash()?;
        self.enter(Phase::NoOpCheck)?;
        match noop::evaluate(&spec_hash, spec, &self.paths) {
            NoOpEvaluation::Hit { logs } => {
                tracing::info!(project = %spec.project_name, "restore is a no-op");
                log.extend(logs);
                return Ok(RestoreResult {
                    success: true,
                    cache_hit: true,
                    output_changed: false,
                    graphs: Vec::new(),
                    compatibility: compat::CompatibilityResult::default(),
                    audit: AuditOutcome::NotRun {
                        reason: "restore was a no-op".to_string(),
                    },
                    artifact_path: self.paths.artifact.clone(),
                    cache_record_path: self.paths.cache_record.clone(),
                    lock_file_path: spec.lock.enabled.then(|| self.lock_path(spec)),
                    logs: log.into_messages(),
                });
            }
            NoOpEvaluation::Miss { reason } => {
                tracing::debug!(%reason, "no-op check missed");
            }
        }
        CacheRecord::pending(&spec_hash, &spec.project_path).write(&self.paths.cache_record)?;

        self.enter(Phase::LockFileCheck)?;
        let lock_path = self.lock_path(spec);
        let lock_eval = locks::evaluate(&lock_path, spec)?;
        let mut regenerate_lock = spec.lock.enabled;
        let mut valid_lock = None;
        match lock_eval.outcome {
            LockOutcome::DisabledButPresent => {
                log.push(RestoreLogMessage::error(
                    LogCode::DP1005,
                    format!(
                        "A packages lock file exists at '{}' but lock files are disabled for '{}'",
                        lock_path.display(),
                        spec.project_name
                    ),
                ));
                return self.finalize(spec, &spec_hash, Vec::new(), log, FinalizeInputs::failed());
            }
            LockOutcome::Invalid { reason } => {
                if spec.lock.locked_mode {
                    log.push(RestoreLogMessage::error(
                        LogCode::DP1004,
                        format!(
                            "The packages lock file is out of date and locked mode is enabled: {reason}. \
                             Disable locked mode or regenerate the lock file."
                        ),
                    ));
                    return self.finalize(
                        spec,
                        &spec_hash,
                        Vec::new(),
                        log,
                        FinalizeInputs::failed(),
                    );
                }
                tracing::info!(%reason, "lock file is stale, regenerating");
            }
            LockOutcome::Valid => {
                valid_lock = lock_eval.lock_file;
                regenerate_lock = false;
            }
            LockOutcome::Absent => {}
        }

        self.enter(Phase::Walking)?;
        let pairs = spec.pairs();
        tracing::info!(pairs = pairs.len(), project = %spec.project_name, "resolving restore graphs");
        let mut join_set = JoinSet::new();
        for pair in pairs.clone() {
            let metadata = Arc::clone(&self.metadata);
            let spec = spec.clone();
            let cancel = self.cancel.clone();
            let locked = valid_lock
                .as_ref()
                .map(|f| f.locked_versions(&pair))
                .unwrap_or_default();
            join_set.spawn(async move {
                let walker = GraphWalker::new(&*metadata, cancel).with_locked(locked);
                let analyzed = walker.walk(&spec, &pair).await.map(|raw| analyze(&raw, &pair));
                (pair, analyzed)
            });
        }

        let mut walked = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            walked.push(joined.map_err(|e| crate::Error::task(e.to_string()))?);
        }
        // Join order is arrival order; diagnostics and restore output both
        // follow the spec's pair order instead.
        walked.sort_by_key(|(pair, _)| pairs.iter().position(|p| p == pair).unwrap_or(usize::MAX));

        let mut graphs: Vec<RestoreTargetGraph> = Vec::new();
        for (pair, outcome) in walked {
            match outcome {
                Ok(graph) => graphs.push(graph),
                Err(e) => {
                    self.cancel.ensure_active()?;
                    log.push(
                        RestoreLogMessage::error(
                            LogCode::DP1101,
                            format!("Unable to resolve dependencies for '{pair}': {e}"),
                        )
                        .with_target(pair.target_name()),
                    );
                    graphs.push(RestoreTargetGraph::placeholder(pair));
                }
            }
        }

        self.enter(Phase::Analyzing)?;
        validate_graphs(&graphs, &mut log);

        let info = self.collect_package_info(&graphs, &mut log).await?;

        self.enter(Phase::Checking)?;
        let audit_future = async {
            match &self.vulnerabilities {
                Some(provider) => {
                    audit::audit(&graphs, spec, provider.as_ref(), &self.cancel).await
                }
                None => (
                    AuditOutcome::NotRun {
                        reason: "no vulnerability provider configured".to_string(),
                    },
                    Vec::new(),
                ),
            }
        };
        let (compatibility, (audit_outcome, audit_messages)) =
            tokio::join!(async { compat::check(&graphs, &info) }, audit_future);

        if compatibility.checked {
            tracing::info!(
                incompatible_packages = compatibility.count(IncompatibilityKind::Package),
                incompatible_projects = compatibility.count(IncompatibilityKind::Project),
                "compatibility check complete"
            );
        }
        for issue in &compatibility.issues {
            let code = match issue.kind {
                IncompatibilityKind::Package => LogCode::DP1202,
                IncompatibilityKind::Project => LogCode::DP1201,
            };
            log.push(
                RestoreLogMessage::error(
                    code,
                    format!(
                        "'{}' is not compatible with '{}'",
                        issue.identity, issue.target
                    ),
                )
                .with_library(issue.identity.name.clone())
                .with_target(issue.target.clone()),
            );
        }
        log.extend(audit_messages);

        self.enter(Phase::ArtifactBuilding)?;
        let cache = PackageCache::new(&self.paths.package_root);
        let existing = assets::LockArtifact::load(&self.paths.artifact);
        let mut artifact =
            assets::build(existing.as_ref(), spec, &graphs, &cache, &info, Vec::new())?;

        self.enter(Phase::ContentEnsuring)?;
        let mut wanted: Vec<LibraryIdentity> =
            graphs.iter().flat_map(|g| g.packages().cloned()).collect();
        for framework in &spec.frameworks {
            for download in &framework.downloads {
                wanted.push(LibraryIdentity::package(
                    &download.name,
                    download.version.clone(),
                ));
            }
        }
        let coordinator = FetchCoordinator::new(
            Arc::clone(&self.content),
            cache.clone(),
            self.max_parallelism,
            self.cancel.clone(),
        );
        for outcome in coordinator.ensure_present(wanted).await? {
            if let Some(error) = outcome.error {
                log.push(
                    RestoreLogMessage::error(
                        LogCode::DP1301,
                        format!("Failed to restore '{}': {error}", outcome.identity),
                    )
                    .with_library(outcome.identity.name.clone()),
                );
            }
        }
        artifact.record_content_hashes(&cache)?;

        if let Some(file) = &valid_lock {
            log.extend(locks::validate_content_hashes(file, &artifact));
        }

        self.enter(Phase::Finalizing)?;
        let success = !log.has_errors();
        self.finalize(
            spec,
            &spec_hash,
            graphs,
            log,
            FinalizeInputs {
                success,
                artifact: Some(artifact),
                compatibility,
                audit: audit_outcome,
                regenerate_lock,
            },
        )
    }

    /// Fetch declared metadata once per resolved package; used by the
    /// compatibility check and the artifact's target sections. A failed
    /// lookup is a restore-failing error: without metadata the package would
    /// silently skip the compatibility check and empty its target sections.
    async fn collect_package_info(
        &self,
        graphs: &[RestoreTargetGraph],
        log: &mut RestoreLog,
    ) -> Result<PackageInfoMap> {
        let mut info = PackageInfoMap::new();
        let mut failed: HashSet<LibraryIdentity> = HashSet::new();
        for graph in graphs {
            for identity in graph.packages() {
                self.cancel.ensure_active()?;
                if info.contains_key(identity) || failed.contains(identity) {
                    continue;
                }
                match self
                    .metadata
                    .package_info(&identity.name, &identity.version)
                    .await
                {
                    Ok(pkg) => {
                        info.insert(identity.clone(), pkg);
                    }
                    Err(e) => {
                        log.push(
                            RestoreLogMessage::error(
                                LogCode::DP1101,
                                format!("Unable to retrieve metadata for '{identity}': {e}"),
                            )
                            .with_library(identity.name.clone()),
                        );
                        failed.insert(identity.clone());
                    }
                }
            }
        }
        Ok(info)
    }

    /// Write every output and flip the cache record to its final state.
    fn finalize(
        &self,
        spec: &DependencyGraphSpec,
        spec_hash: &str,
        graphs: Vec<RestoreTargetGraph>,
        log: RestoreLog,
        inputs: FinalizeInputs,
    ) -> Result<RestoreResult> {
        let logs = log.into_messages();
        let mut artifact = inputs
            .artifact
            .unwrap_or_else(|| assets::LockArtifact::empty(spec, Vec::new()));
        artifact.logs.clone_from(&logs);
        if self.artifact_version < assets::LOCK_ARTIFACT_VERSION {
            artifact = artifact.downgrade_to_v1();
        }
        let output_changed = artifact.write_if_changed(&self.paths.artifact)?;

        let lock_file_path = spec.lock.enabled.then(|| self.lock_path(spec));
        let mut expected_files = vec![self.paths.artifact.clone()];
        if let Some(path) = &lock_file_path {
            if inputs.success && inputs.regenerate_lock {
                locks::build(spec, &graphs, &artifact).save(path)?;
            }
            if path.exists() {
                expected_files.push(path.clone());
            }
        }

        let record = CacheRecord {
            version: noop::CACHE_RECORD_VERSION,
            spec_hash: spec_hash.to_string(),
            success: inputs.success,
            project_path: spec.project_path.clone(),
            expected_files,
            logs: logs.clone(),
        };
        record.write(&self.paths.cache_record)?;

        tracing::info!(
            project = %spec.project_name,
            success = inputs.success,
            output_changed,
            "restore complete"
        );
        Ok(RestoreResult {
            success: inputs.success,
            cache_hit: false,
            output_changed,
            graphs,
            compatibility: inputs.compatibility,
            audit: inputs.audit,
            artifact_path: self.paths.artifact.clone(),
            cache_record_path: self.paths.cache_record.clone(),
            lock_file_path,
            logs,
        })
    }
}

struct FinalizeInputs {
    success: bool,
    artifact: Option<assets::LockArtifact>,
    compatibility: compat::CompatibilityResult,
    audit: AuditOutcome,
    regenerate_lock: bool,
}

impl FinalizeInputs {
    fn failed() -> Self {
        Self {
            success: false,
            artifact: None,
            compatibility: compat::CompatibilityResult::default(),
            audit: AuditOutcome::NotRun {
                reason: "restore failed before auditing".to_string(),
            },
            regenerate_lock: false,
        }
    }
}

/// Input validation that runs before any graph resolution.
fn validate_preconditions(spec: &DependencyGraphSpec) -> Vec<RestoreLogMessage> {
    let mut errors = Vec::new();

    if spec.frameworks.is_empty() {
        errors.push(RestoreLogMessage::error(
            LogCode::DP1001,
            format!("Project '{}' does not specify any target frameworks", spec.project_name),
        ));
        return errors;
    }

    for framework in &spec.frameworks {
        if !framework.framework.is_any() && !framework.framework.has_version() {
            errors.push(RestoreLogMessage::error(
                LogCode::DP1012,
                format!(
                    "Target framework '{}' is missing its platform version",
                    framework.framework
                ),
            ));
        }

        let pins_declared = !framework.central_versions.is_empty();
        for dependency in &framework.dependencies {
            if pins_declared && !dependency.central && !dependency.range.is_all() {
                errors.push(
                    RestoreLogMessage::error(
                        LogCode::DP1008,
                        format!(
                            "'{}' declares its own version while versions are centrally managed",
                            dependency.name
                        ),
                    )
                    .with_library(dependency.name.clone()),
                );
            }
            if dependency.central
                && !framework
                    .central_versions
                    .contains_key(&dependency.name.to_lowercase())
            {
                errors.push(
                    RestoreLogMessage::error(
                        LogCode::DP1010,
                        format!("'{}' has no version and no central pin", dependency.name),
                    )
                    .with_library(dependency.name.clone()),
                );
            }
            if dependency.version_override.is_some() && !framework.central_management_enabled() {
                errors.push(
                    RestoreLogMessage::error(
                        LogCode::DP1013,
                        format!(
                            "'{}' uses a version override without central version management",
                            dependency.name
                        ),
                    )
                    .with_library(dependency.name.clone()),
                );
            }
        }

        for (name, pin) in &framework.central_versions {
            if pin.min_version().is_none() {
                errors.push(
                    RestoreLogMessage::error(
                        LogCode::DP1011,
                        format!("Central pin for '{name}' has no lower bound"),
                    )
                    .with_library(name.clone()),
                );
            }
        }
    }

    errors
}

/// Turn analysis results into restore diagnostics: cycles first, then
/// conflicts, then downgrades, then unresolved names.
fn validate_graphs(graphs: &[RestoreTargetGraph], log: &mut RestoreLog) {
    for graph in graphs {
        let target = graph.pair.target_name();

        for cycle in &graph.cycles {
            log.push(
                RestoreLogMessage::error(
                    LogCode::DP1108,
                    format!("Cycle detected: {}", cycle.render()),
                )
                .with_target(target.clone()),
            );
        }
        if !graph.cycles.is_empty() {
            continue;
        }

        for conflict in &graph.conflicts {
            log.push(
                RestoreLogMessage::error(
                    LogCode::DP1107,
                    format!(
                        "Version conflict detected for '{}': resolved {} but {} was requested",
                        conflict.name, conflict.winner.version, conflict.requested
                    ),
                )
                .with_library(conflict.name.clone())
                .with_target(target.clone()),
            );
        }

        for downgrade in &graph.downgrades {
            let message = format!(
                "Detected package downgrade: '{}' from {} to {}",
                downgrade.name, downgrade.requested, downgrade.resolved.version
            );
            let entry = if downgrade.central {
                RestoreLogMessage::error(
                    LogCode::DP1109,
                    format!("{message} (pinned by central version management)"),
                )
            } else {
                RestoreLogMessage::warning(LogCode::DP1605, message)
            };
            log.push(entry.with_library(downgrade.name.clone()).with_target(target.clone()));
        }

        for (name, range) in &graph.unresolved {
            log.push(
                RestoreLogMessage::error(
                    LogCode::DP1101,
                    format!("Unable to find package '{name}' matching {range}"),
                )
                .with_library(name.clone())
                .with_target(target.clone()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::{Dependency, TargetFrameworkInfo, Version, VersionRange};
    use std::collections::BTreeMap;

    fn base_spec() -> DependencyGraphSpec {
        DependencyGraphSpec {
            project_name: "app".to_string(),
            project_path: PathBuf::from("/src/app/app.proj"),
            version: Version::new(1, 0, 0),
            frameworks: vec![TargetFrameworkInfo::new("net8.0".parse().unwrap(), Vec::new())],
            runtimes: Vec::new(),
            sources: Vec::new(),
            lock: depot_core::LockSettings::default(),
            audit: depot_core::AuditSettings::default(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_no_frameworks_is_a_precondition_error() {
        let mut spec = base_spec();
        spec.frameworks.clear();
        let errors = validate_preconditions(&spec);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, LogCode::DP1001);
    }

    #[test]
    fn test_own_version_under_central_management() {
        let mut spec = base_spec();
        spec.frameworks[0]
            .central_versions
            .insert("pinned".to_string(), "[1.0.0]".parse().unwrap());
        spec.frameworks[0]
            .dependencies
            .push(Dependency::new("rogue", "2.0.0".parse().unwrap()));
        let errors = validate_preconditions(&spec);
        assert!(errors.iter().any(|e| e.code == LogCode::DP1008));
    }

    #[test]
    fn test_central_dependency_without_pin() {
        let mut spec = base_spec();
        let mut dep = Dependency::new("unpinned", VersionRange::all());
        dep.central = true;
        spec.frameworks[0].dependencies.push(dep);
        let errors = validate_preconditions(&spec);
        assert!(errors.iter().any(|e| e.code == LogCode::DP1010));
    }

    #[test]
    fn test_unbounded_central_pin() {
        let mut spec = base_spec();
        spec.frameworks[0]
            .central_versions
            .insert("floaty".to_string(), "(,2.0.0]".parse().unwrap());
        let errors = validate_preconditions(&spec);
        assert!(errors.iter().any(|e| e.code == LogCode::DP1011));
    }

    #[test]
    fn test_override_without_central_management() {
        let mut spec = base_spec();
        let mut dep = Dependency::new("pkg", "1.0.0".parse().unwrap());
        dep.version_override = Some("[2.0.0]".parse().unwrap());
        spec.frameworks[0].dependencies.push(dep);
        let errors = validate_preconditions(&spec);
        assert!(errors.iter().any(|e| e.code == LogCode::DP1013));
    }

    #[test]
    fn test_missing_platform_version() {
        let mut spec = base_spec();
        spec.frameworks
            .push(TargetFrameworkInfo::new("net".parse().unwrap(), Vec::new()));
        let errors = validate_preconditions(&spec);
        assert!(errors.iter().any(|e| e.code == LogCode::DP1012));
    }

    #[test]
    fn test_clean_spec_passes_preconditions() {
        let mut spec = base_spec();
        spec.frameworks[0]
            .dependencies
            .push(Dependency::new("pkg", "1.0.0".parse().unwrap()));
        assert!(validate_preconditions(&spec).is_empty());
    }
}
