//! Breadth-first graph walking.
//!
//! The walker expands a project's direct dependencies into a [`RawGraph`],
//! one walk per (framework, runtime) pair. Selection is minimum-applicable:
//! each range resolves to the lowest candidate that satisfies it. Requests
//! converge onto already-chosen versions where the chosen version satisfies
//! the incoming range; disjoint requests produce additional nodes for the
//! analyzer to arbitrate.

use crate::graph::{GraphNode, RawGraph};
use crate::provider::MetadataProvider;
use crate::Result;
use depot_core::{
    CancelFlag, DependencyGraphSpec, FrameworkRuntimePair, LibraryIdentity, VersionRange,
};
use petgraph::graph::NodeIndex;
use semver::Version;
use std::collections::{HashMap, HashSet, VecDeque};

/// One pending dependency request.
struct Request {
    parent: NodeIndex,
    name: String,
    range: VersionRange,
    central_pinned: bool,
}

/// Walks dependency metadata into a working graph.
pub struct GraphWalker<'a> {
    provider: &'a dyn MetadataProvider,
    locked: HashMap<String, Version>,
    cancel: CancelFlag,
}

impl<'a> GraphWalker<'a> {
    /// A walker over `provider` with no locked versions.
    pub fn new(provider: &'a dyn MetadataProvider, cancel: CancelFlag) -> Self {
        Self {
            provider,
            locked: HashMap::new(),
            cancel,
        }
    }

    /// Pin names to exact versions from a validated lock file. Locked names
    /// skip candidate listing entirely.
    #[must_use]
    pub fn with_locked(mut self, locked: impl IntoIterator<Item = (String, Version)>) -> Self {
        self.locked = locked
            .into_iter()
            .map(|(name, version)| (name.to_lowercase(), version))
            .collect();
        self
    }

    /// Resolve the graph for one (framework, runtime) pair.
    pub async fn walk(
        &self,
        spec: &DependencyGraphSpec,
        pair: &FrameworkRuntimePair,
    ) -> Result<RawGraph> {
        let mut graph = RawGraph::new();
        let root = graph.add_node(GraphNode {
            identity: LibraryIdentity::project(&spec.project_name, spec.version.clone()),
            requested: VersionRange::exact(spec.version.clone()),
            central_pinned: false,
        });
        graph.add_root(root);

        let info = spec.framework_info(&pair.framework);
        let central = info.map(|i| &i.central_versions);

        let mut queue = VecDeque::new();
        if let Some(info) = info {
            for dep in &info.dependencies {
                let pin = central.and_then(|c| c.get(&dep.name.to_lowercase()));
                queue.push_back(Request {
                    parent: root,
                    name: dep.name.clone(),
                    range: dep.effective_range(pin).clone(),
                    central_pinned: false,
                });
            }
        }

        // One expansion per chosen (name, version).
        let mut visited: HashSet<(String, Version)> = HashSet::new();
        // At most one unresolved placeholder per name.
        let mut unresolved: HashMap<String, NodeIndex> = HashMap::new();

        while let Some(request) = queue.pop_front() {
            self.cancel.ensure_active()?;
            let key = request.name.to_lowercase();

            // Converge onto an existing choice that satisfies the range.
            let satisfying = graph
                .nodes_named(&key)
                .iter()
                .copied()
                .find(|&idx| request.range.satisfies(&graph.node(idx).identity.version));
            if let Some(existing) = satisfying {
                graph.add_edge(request.parent, existing, request.range);
                continue;
            }

            let Some(version) = self.select_version(&request.name, &request.range).await? else {
                let index = *unresolved.entry(key).or_insert_with(|| {
                    graph.add_node(GraphNode {
                        identity: LibraryIdentity::unresolved(&request.name),
                        requested: request.range.clone(),
                        central_pinned: request.central_pinned,
                    })
                });
                graph.add_edge(request.parent, index, request.range);
                continue;
            };

            let same_version = graph
                .nodes_named(&key)
                .iter()
                .copied()
                .find(|&idx| graph.node(idx).identity.version == version);
            if let Some(existing) = same_version {
                // A disjoint range landed on a version another request
                // already produced.
                graph.add_edge(request.parent, existing, request.range);
                continue;
            }

            let index = graph.add_node(GraphNode {
                identity: LibraryIdentity::package(&request.name, version.clone()),
                requested: request.range.clone(),
                central_pinned: request.central_pinned,
            });
            graph.add_edge(request.parent, index, request.range);

            if !visited.insert((key, version.clone())) {
                continue;
            }

            let info = self.provider.package_info(&request.name, &version).await?;
            for dep in info.dependencies_for(&pair.framework) {
                let pin = central.and_then(|c| c.get(&dep.name.to_lowercase()));
                let (range, pinned) = match pin {
                    Some(pin) => (pin.clone(), true),
                    None => (dep.range.clone(), false),
                };
                queue.push_back(Request {
                    parent: index,
                    name: dep.name.clone(),
                    range,
                    central_pinned: pinned,
                });
            }
        }

        tracing::debug!(
            target_graph = %pair,
            nodes = graph.node_count(),
            "graph walk complete"
        );
        Ok(graph)
    }

    /// Pick the version a request resolves to, or `None` when no candidate
    /// satisfies the range.
    async fn select_version(
        &self,
        name: &str,
        range: &VersionRange,
    ) -> Result<Option<Version>> {
        if let Some(locked) = self.locked.get(&name.to_lowercase()) {
            return Ok(Some(locked.clone()));
        }
        let candidates = self.provider.candidate_versions(name).await?;
        Ok(range.best_match(candidates.iter()).cloned())
    }
}
