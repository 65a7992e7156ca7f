//! Vulnerability auditing of resolved graphs.
//!
//! The audit never changes what gets restored. It classifies every resolved
//! package as direct, transitive or download-only, asks the vulnerability
//! provider for known advisories, and turns applicable findings into log
//! messages. An unreachable provider downgrades the whole audit to
//! `NotRun`; restore success is unaffected.

use crate::Result;
use async_trait::async_trait;
use depot_core::{
    AuditMode, CancelFlag, DependencyGraphSpec, LibraryIdentity, LogCode, LogLevel,
    RestoreLogMessage, VersionRange,
};
use depot_resolver::RestoreTargetGraph;
use std::collections::{HashMap, HashSet};

/// One known advisory for a package.
#[derive(Debug, Clone)]
pub struct Advisory {
    /// Advisory URL, the suppression key.
    pub url: String,
    /// Severity: 0 low, 1 moderate, 2 high, 3 critical. Anything above 3 is
    /// treated as critical.
    pub severity: u8,
    /// The affected version range.
    pub versions: VersionRange,
}

/// Supplies known advisories per package name.
#[async_trait]
pub trait VulnerabilityProvider: Send + Sync {
    /// All known advisories for `name`, across all versions.
    async fn advisories(&self, name: &str) -> Result<Vec<Advisory>>;
}

/// How an audited package entered the restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyClass {
    /// Declared directly by the project.
    Direct,
    /// Pulled in transitively.
    Transitive,
    /// A download-only reference.
    Download,
}

/// Audit result summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditOutcome {
    /// Auditing is disabled for the project.
    Disabled,
    /// The provider could not be consulted.
    NotRun {
        /// Why the audit did not run.
        reason: String,
    },
    /// The audit ran to completion.
    Completed {
        /// Findings that produced messages.
        findings: usize,
        /// Suppressed advisory applications, counting repeats.
        suppressed_total: usize,
        /// Distinct suppressed advisory URLs.
        suppressed_distinct: usize,
    },
}

fn severity_code(severity: u8) -> LogCode {
    match severity {
        0 => LogCode::DP1901,
        1 => LogCode::DP1902,
        2 => LogCode::DP1903,
        _ => LogCode::DP1904,
    }
}

fn severity_name(severity: u8) -> &'static str {
    match severity {
        0 => "low",
        1 => "moderate",
        2 => "high",
        _ => "critical",
    }
}

/// Audit every package the graphs resolved, plus download-only references.
pub async fn audit(
    graphs: &[RestoreTargetGraph],
    spec: &DependencyGraphSpec,
    provider: &dyn VulnerabilityProvider,
    cancel: &CancelFlag,
) -> (AuditOutcome, Vec<RestoreLogMessage>) {
    if !spec.audit.enabled {
        return (AuditOutcome::Disabled, Vec::new());
    }

    let mut subjects: HashMap<LibraryIdentity, DependencyClass> = HashMap::new();
    for graph in graphs {
        for identity in graph.packages() {
            let class = if spec.is_direct_dependency(&identity.name) {
                DependencyClass::Direct
            } else {
                DependencyClass::Transitive
            };
            subjects.entry(identity.clone()).or_insert(class);
        }
    }
    for framework in &spec.frameworks {
        for download in &framework.downloads {
            subjects
                .entry(LibraryIdentity::package(
                    &download.name,
                    download.version.clone(),
                ))
                .or_insert(DependencyClass::Download);
        }
    }
    if spec.audit.mode == AuditMode::Direct {
        subjects.retain(|_, class| *class != DependencyClass::Transitive);
    }

    let mut ordered: Vec<_> = subjects.into_iter().collect();
    ordered.sort_by(|a, b| a.0.cmp(&b.0));

    let mut messages = Vec::new();
    let mut findings = 0usize;
    let mut suppressed_total = 0usize;
    let mut suppressed_urls: HashSet<&str> = HashSet::new();

    for (identity, _class) in &ordered {
        if cancel.is_cancelled() {
            return (
                AuditOutcome::NotRun {
                    reason: "cancelled".to_string(),
                },
                Vec::new(),
            );
        }
        let advisories = match provider.advisories(&identity.name).await {
            Ok(advisories) => advisories,
            Err(e) => {
                tracing::warn!(package = %identity, error = %e, "vulnerability lookup failed");
                return (
                    AuditOutcome::NotRun {
                        reason: e.to_string(),
                    },
                    Vec::new(),
                );
            }
        };

        for advisory in &advisories {
            if !advisory.versions.satisfies(&identity.version) {
                continue;
            }
            if let Some(url) = spec
                .audit
                .suppressed_urls
                .iter()
                .find(|u| u.as_str() == advisory.url)
            {
                suppressed_total += 1;
                suppressed_urls.insert(url);
                continue;
            }
            if advisory.severity < spec.audit.minimum_severity {
                continue;
            }

            findings += 1;
            let level = if spec.audit.treat_as_errors {
                LogLevel::Error
            } else {
                LogLevel::Warning
            };
            messages.push(RestoreLogMessage {
                level,
                code: severity_code(advisory.severity),
                message: format!(
                    "Package '{}' {} has a known {} severity vulnerability, {}",
                    identity.name,
                    identity.version,
                    severity_name(advisory.severity),
                    advisory.url
                ),
                library_name: Some(identity.name.clone()),
                target_graphs: Vec::new(),
            });
        }
    }

    tracing::debug!(
        findings,
        suppressed = suppressed_total,
        "vulnerability audit complete"
    );
    (
        AuditOutcome::Completed {
            findings,
            suppressed_total,
            suppressed_distinct: suppressed_urls.len(),
        },
        messages,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use depot_core::{
        AuditSettings, Dependency, DownloadDependency, FrameworkRuntimePair,
        TargetFrameworkInfo, Version,
    };
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    struct FixtureAdvisories {
        by_name: HashMap<String, Vec<Advisory>>,
        fail: bool,
    }

    #[async_trait]
    impl VulnerabilityProvider for FixtureAdvisories {
        async fn advisories(&self, name: &str) -> Result<Vec<Advisory>> {
            if self.fail {
                return Err(Error::task("advisory source unreachable"));
            }
            Ok(self.by_name.get(name).cloned().unwrap_or_default())
        }
    }

    fn advisory(url: &str, severity: u8, versions: &str) -> Advisory {
        Advisory {
            url: url.to_string(),
            severity,
            versions: versions.parse().unwrap(),
        }
    }

    fn spec(audit: AuditSettings) -> DependencyGraphSpec {
        DependencyGraphSpec {
            project_name: "app".to_string(),
            project_path: PathBuf::from("/src/app/app.proj"),
            version: Version::new(1, 0, 0),
            frameworks: vec![TargetFrameworkInfo::new(
                "net8.0".parse().unwrap(),
                vec![Dependency::new("direct", "1.0.0".parse().unwrap())],
            )],
            runtimes: Vec::new(),
            sources: Vec::new(),
            lock: depot_core::LockSettings::default(),
            audit,
            metadata: BTreeMap::new(),
        }
    }

    fn graphs(names: &[&str]) -> Vec<RestoreTargetGraph> {
        let mut graph = RestoreTargetGraph::placeholder(FrameworkRuntimePair::new(
            "net8.0".parse().unwrap(),
        ));
        graph.resolved = names
            .iter()
            .map(|n| LibraryIdentity::package(*n, Version::new(1, 0, 0)))
            .collect();
        vec![graph]
    }

    #[tokio::test]
    async fn test_finding_above_threshold_warns() {
        let provider = FixtureAdvisories {
            by_name: HashMap::from([(
                "direct".to_string(),
                vec![advisory("https://adv/1", 2, "[1.0.0,2.0.0)")],
            )]),
            fail: false,
        };
        let spec = spec(AuditSettings::default());
        let (outcome, messages) =
            audit(&graphs(&["direct"]), &spec, &provider, &CancelFlag::new()).await;

        assert_eq!(
            outcome,
            AuditOutcome::Completed {
                findings: 1,
                suppressed_total: 0,
                suppressed_distinct: 0
            }
        );
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].code, LogCode::DP1903);
        assert_eq!(messages[0].level, LogLevel::Warning);
    }

    #[tokio::test]
    async fn test_below_threshold_is_silent() {
        let provider = FixtureAdvisories {
            by_name: HashMap::from([(
                "direct".to_string(),
                vec![advisory("https://adv/1", 0, "1.0.0")],
            )]),
            fail: false,
        };
        let spec = spec(AuditSettings {
            minimum_severity: 2,
            ..AuditSettings::default()
        });
        let (outcome, messages) =
            audit(&graphs(&["direct"]), &spec, &provider, &CancelFlag::new()).await;

        assert!(matches!(outcome, AuditOutcome::Completed { findings: 0, .. }));
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_unaffected_version_is_silent() {
        let provider = FixtureAdvisories {
            by_name: HashMap::from([(
                "direct".to_string(),
                vec![advisory("https://adv/1", 3, "[2.0.0,3.0.0)")],
            )]),
            fail: false,
        };
        let spec = spec(AuditSettings::default());
        let (_, messages) =
            audit(&graphs(&["direct"]), &spec, &provider, &CancelFlag::new()).await;
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_suppression_tallies() {
        let provider = FixtureAdvisories {
            by_name: HashMap::from([
                (
                    "direct".to_string(),
                    vec![advisory("https://adv/1", 3, "1.0.0")],
                ),
                (
                    "other".to_string(),
                    vec![advisory("https://adv/1", 3, "1.0.0")],
                ),
            ]),
            fail: false,
        };
        let mut settings = AuditSettings::default();
        settings.suppressed_urls.push("https://adv/1".to_string());
        let spec = spec(settings);
        let (outcome, messages) = audit(
            &graphs(&["direct", "other"]),
            &spec,
            &provider,
            &CancelFlag::new(),
        )
        .await;

        assert_eq!(
            outcome,
            AuditOutcome::Completed {
                findings: 0,
                suppressed_total: 2,
                suppressed_distinct: 1
            }
        );
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_direct_mode_skips_transitive() {
        let provider = FixtureAdvisories {
            by_name: HashMap::from([
                (
                    "direct".to_string(),
                    vec![advisory("https://adv/1", 3, "1.0.0")],
                ),
                (
                    "transitive".to_string(),
                    vec![advisory("https://adv/2", 3, "1.0.0")],
                ),
            ]),
            fail: false,
        };
        let spec = spec(AuditSettings {
            mode: AuditMode::Direct,
            ..AuditSettings::default()
        });
        let (_, messages) = audit(
            &graphs(&["direct", "transitive"]),
            &spec,
            &provider,
            &CancelFlag::new(),
        )
        .await;

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].library_name.as_deref(), Some("direct"));
    }

    #[tokio::test]
    async fn test_downloads_are_audited() {
        let provider = FixtureAdvisories {
            by_name: HashMap::from([(
                "tool".to_string(),
                vec![advisory("https://adv/1", 3, "1.0.0")],
            )]),
            fail: false,
        };
        let mut spec = spec(AuditSettings::default());
        spec.frameworks[0].downloads.push(DownloadDependency {
            name: "tool".to_string(),
            version: Version::new(1, 0, 0),
        });
        let (_, messages) = audit(&graphs(&[]), &spec, &provider, &CancelFlag::new()).await;
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn test_treat_as_errors_escalates() {
        let provider = FixtureAdvisories {
            by_name: HashMap::from([(
                "direct".to_string(),
                vec![advisory("https://adv/1", 3, "1.0.0")],
            )]),
            fail: false,
        };
        let spec = spec(AuditSettings {
            treat_as_errors: true,
            ..AuditSettings::default()
        });
        let (_, messages) =
            audit(&graphs(&["direct"]), &spec, &provider, &CancelFlag::new()).await;
        assert!(messages[0].is_error());
        assert_eq!(messages[0].code, LogCode::DP1904);
    }

    #[tokio::test]
    async fn test_provider_failure_means_not_run() {
        let provider = FixtureAdvisories {
            by_name: HashMap::new(),
            fail: true,
        };
        let spec = spec(AuditSettings::default());
        let (outcome, messages) =
            audit(&graphs(&["direct"]), &spec, &provider, &CancelFlag::new()).await;

        assert!(matches!(outcome, AuditOutcome::NotRun { .. }));
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_audit_does_nothing() {
        let provider = FixtureAdvisories {
            by_name: HashMap::new(),
            fail: true,
        };
        let spec = spec(AuditSettings {
            enabled: false,
            ..AuditSettings::default()
        });
        let (outcome, messages) =
            audit(&graphs(&["direct"]), &spec, &provider, &CancelFlag::new()).await;

        assert_eq!(outcome, AuditOutcome::Disabled);
        assert!(messages.is_empty());
    }
}
