//! Graph structures produced by the walk.
//!
//! A [`RawGraph`] is the mutable working graph the walker builds: one node
//! per chosen (name, version), one edge per dependency declaration. Once a
//! walk finishes, analysis flattens it into a [`RestoreTargetGraph`] with
//! deterministic, sorted contents.

use depot_core::{FrameworkRuntimePair, LibraryIdentity, LibraryKind, VersionRange};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, VecDeque};

/// One resolved (or unresolvable) node in the working graph.
#[derive(Debug, Clone)]
pub struct GraphNode {
    /// The chosen identity.
    pub identity: LibraryIdentity,
    /// The range that first introduced the node.
    pub requested: VersionRange,
    /// Whether the version came from a central pin applied to a transitive
    /// dependency.
    pub central_pinned: bool,
}

/// The working dependency graph for one (framework, runtime) pair.
#[derive(Debug, Default)]
pub struct RawGraph {
    graph: DiGraph<GraphNode, VersionRange>,
    by_name: HashMap<String, Vec<NodeIndex>>,
    roots: Vec<NodeIndex>,
}

impl RawGraph {
    /// An empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and index it under its lowercase name.
    pub fn add_node(&mut self, node: GraphNode) -> NodeIndex {
        let key = node.identity.name_key();
        let index = self.graph.add_node(node);
        self.by_name.entry(key).or_default().push(index);
        index
    }

    /// Mark a node as a root of the walk.
    pub fn add_root(&mut self, index: NodeIndex) {
        self.roots.push(index);
    }

    /// Add a dependency edge carrying the declared range.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, range: VersionRange) {
        self.graph.add_edge(from, to, range);
    }

    /// The node at `index`.
    #[must_use]
    pub fn node(&self, index: NodeIndex) -> &GraphNode {
        &self.graph[index]
    }

    /// All node indices.
    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    /// Nodes chosen for `name`, in insertion order.
    #[must_use]
    pub fn nodes_named(&self, name: &str) -> &[NodeIndex] {
        self.by_name
            .get(&name.to_lowercase())
            .map_or(&[], Vec::as_slice)
    }

    /// Direct dependencies of a node, with the declared range on each edge.
    pub fn dependencies(
        &self,
        index: NodeIndex,
    ) -> impl Iterator<Item = (NodeIndex, &VersionRange)> + '_ {
        self.graph
            .edges_directed(index, Direction::Outgoing)
            .map(|e| {
                use petgraph::visit::EdgeRef;
                (e.target(), e.weight())
            })
    }

    /// Parents of a node.
    pub fn dependents(&self, index: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(index, Direction::Incoming)
    }

    /// The root node indices.
    #[must_use]
    pub fn roots(&self) -> &[NodeIndex] {
        &self.roots
    }

    /// Shortest edge distance from any root to every reachable node.
    ///
    /// Nearest-wins selection compares these distances, never the order the
    /// walk happened to visit nodes in, so the outcome does not depend on
    /// provider response timing.
    #[must_use]
    pub fn distances(&self) -> HashMap<NodeIndex, usize> {
        let mut dist = HashMap::new();
        let mut queue = VecDeque::new();
        for &root in &self.roots {
            dist.insert(root, 0);
            queue.push_back(root);
        }
        while let Some(index) = queue.pop_front() {
            let next = dist[&index] + 1;
            for neighbor in self.graph.neighbors_directed(index, Direction::Outgoing) {
                if !dist.contains_key(&neighbor) {
                    dist.insert(neighbor, next);
                    queue.push_back(neighbor);
                }
            }
        }
        dist
    }

    /// Identities no source could satisfy.
    #[must_use]
    pub fn unresolved(&self) -> Vec<&GraphNode> {
        self.graph
            .node_weights()
            .filter(|n| n.identity.kind == LibraryKind::Unresolved)
            .collect()
    }

    /// Number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }
}

/// A dependency path that reaches back into itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionCycle {
    /// Node names along the path, ending with the repeated name.
    pub path: Vec<String>,
}

impl ResolutionCycle {
    /// `a -> b -> a` rendering for diagnostics.
    #[must_use]
    pub fn render(&self) -> String {
        self.path.join(" -> ")
    }
}

/// Two disjoint requests for the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConflict {
    /// The contested package name.
    pub name: String,
    /// The identity nearest-wins selected.
    pub winner: LibraryIdentity,
    /// The identity that lost, with the range that requested it.
    pub loser: LibraryIdentity,
    /// The losing request's range.
    pub requested: VersionRange,
}

/// A request for a version higher than the one selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downgrade {
    /// The downgraded package name.
    pub name: String,
    /// The identity the graph resolved to.
    pub resolved: LibraryIdentity,
    /// The higher version some edge asked for.
    pub requested: VersionRange,
    /// Whether the winning version came from a central pin on a transitive
    /// dependency; such downgrades fail the restore instead of warning.
    pub central: bool,
}

/// The finished, deterministic graph for one (framework, runtime) pair.
#[derive(Debug, Clone)]
pub struct RestoreTargetGraph {
    /// The pair this graph was resolved for.
    pub pair: FrameworkRuntimePair,
    /// Selected identities, sorted by name then version.
    pub resolved: Vec<LibraryIdentity>,
    /// Names no source satisfied, sorted, with the range that asked.
    pub unresolved: Vec<(String, VersionRange)>,
    /// Dependency cycles found during analysis.
    pub cycles: Vec<ResolutionCycle>,
    /// Version conflicts nearest-wins could not reconcile.
    pub conflicts: Vec<VersionConflict>,
    /// Requests for higher versions than the selected ones.
    pub downgrades: Vec<Downgrade>,
}

impl RestoreTargetGraph {
    /// An empty graph standing in for a pair whose walk failed outright.
    #[must_use]
    pub fn placeholder(pair: FrameworkRuntimePair) -> Self {
        Self {
            pair,
            resolved: Vec::new(),
            unresolved: Vec::new(),
            cycles: Vec::new(),
            conflicts: Vec::new(),
            downgrades: Vec::new(),
        }
    }

    /// Whether the graph resolved without unresolved names, cycles or
    /// conflicts. Downgrades alone do not make a graph unhealthy.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.unresolved.is_empty() && self.cycles.is_empty() && self.conflicts.is_empty()
    }

    /// Resolved package identities only, skipping projects.
    pub fn packages(&self) -> impl Iterator<Item = &LibraryIdentity> + '_ {
        self.resolved
            .iter()
            .filter(|id| id.kind == LibraryKind::Package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::Version;

    fn node(name: &str, version: Version) -> GraphNode {
        GraphNode {
            identity: LibraryIdentity::package(name, version),
            requested: VersionRange::all(),
            central_pinned: false,
        }
    }

    #[test]
    fn test_distances_take_shortest_path() {
        let mut graph = RawGraph::new();
        let root = graph.add_node(node("root", Version::new(1, 0, 0)));
        let a = graph.add_node(node("a", Version::new(1, 0, 0)));
        let b = graph.add_node(node("b", Version::new(1, 0, 0)));
        let c = graph.add_node(node("c", Version::new(1, 0, 0)));
        graph.add_root(root);

        // root -> a -> b -> c, and root -> c directly.
        graph.add_edge(root, a, VersionRange::all());
        graph.add_edge(a, b, VersionRange::all());
        graph.add_edge(b, c, VersionRange::all());
        graph.add_edge(root, c, VersionRange::all());

        let dist = graph.distances();
        assert_eq!(dist[&root], 0);
        assert_eq!(dist[&a], 1);
        assert_eq!(dist[&b], 2);
        assert_eq!(dist[&c], 1);
    }

    #[test]
    fn test_name_index_is_case_insensitive() {
        let mut graph = RawGraph::new();
        let a = graph.add_node(node("Pkg.A", Version::new(1, 0, 0)));
        assert_eq!(graph.nodes_named("pkg.a"), &[a]);
        assert_eq!(graph.nodes_named("PKG.A"), &[a]);
        assert!(graph.nodes_named("other").is_empty());
    }

    #[test]
    fn test_unresolved_nodes_surface() {
        let mut graph = RawGraph::new();
        graph.add_node(node("ok", Version::new(1, 0, 0)));
        graph.add_node(GraphNode {
            identity: LibraryIdentity::unresolved("missing"),
            requested: VersionRange::all(),
            central_pinned: false,
        });
        let unresolved = graph.unresolved();
        assert_eq!(unresolved.len(), 1);
        assert!(unresolved[0].identity.name_eq("missing"));
    }
}
