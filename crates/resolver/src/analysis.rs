//! Graph analysis: cycle detection, winner selection and downgrade
//! classification.
//!
//! Analysis runs after a walk finishes and turns the working graph into a
//! deterministic [`RestoreTargetGraph`]. Cycles are found first; a cyclic
//! graph is reported as-is, since conflict arbitration over it would be
//! meaningless. Otherwise each contested name is settled by nearest-wins:
//! the node closest to a root wins, with ties broken toward the highest
//! version.

use crate::graph::{
    Downgrade, RawGraph, ResolutionCycle, RestoreTargetGraph, VersionConflict,
};
use depot_core::{FrameworkRuntimePair, LibraryKind};
use petgraph::graph::NodeIndex;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Flatten a walked graph into its deterministic form.
#[must_use]
pub fn analyze(graph: &RawGraph, pair: &FrameworkRuntimePair) -> RestoreTargetGraph {
    let cycles = find_cycles(graph);

    let mut unresolved: Vec<_> = graph
        .unresolved()
        .iter()
        .map(|n| (n.identity.name.clone(), n.requested.clone()))
        .collect();
    unresolved.sort_by(|a, b| a.0.to_lowercase().cmp(&b.0.to_lowercase()));

    if !cycles.is_empty() {
        // Arbitration over a cyclic graph would not terminate meaningfully.
        return RestoreTargetGraph {
            pair: pair.clone(),
            resolved: Vec::new(),
            unresolved,
            cycles,
            conflicts: Vec::new(),
            downgrades: Vec::new(),
        };
    }

    let distances = graph.distances();
    let far = usize::MAX;

    // Group candidate nodes by name, projects and packages alike.
    let mut by_name: BTreeMap<String, Vec<NodeIndex>> = BTreeMap::new();
    for index in graph.node_indices() {
        let node = graph.node(index);
        if node.identity.kind == LibraryKind::Unresolved {
            continue;
        }
        by_name
            .entry(node.identity.name_key())
            .or_default()
            .push(index);
    }

    let mut resolved = Vec::new();
    let mut conflicts = Vec::new();
    let mut downgrades = Vec::new();

    for nodes in by_name.values() {
        let winner = *nodes
            .iter()
            .min_by(|&&a, &&b| {
                let da = distances.get(&a).copied().unwrap_or(far);
                let db = distances.get(&b).copied().unwrap_or(far);
                da.cmp(&db).then_with(|| {
                    graph
                        .node(b)
                        .identity
                        .version
                        .cmp(&graph.node(a).identity.version)
                })
            })
            .unwrap_or(&nodes[0]);
        let winner_node = graph.node(winner);
        resolved.push(winner_node.identity.clone());

        for &index in nodes {
            if index == winner {
                continue;
            }
            let loser = graph.node(index);
            if loser.requested.satisfies(&winner_node.identity.version) {
                // The losing node's range is content with the winner; it is
                // simply dropped from the flattened graph.
                continue;
            }
            let asked_higher = loser
                .requested
                .min_version()
                .is_some_and(|min| min > &winner_node.identity.version);
            if asked_higher {
                downgrades.push(Downgrade {
                    name: loser.identity.name.clone(),
                    resolved: winner_node.identity.clone(),
                    requested: loser.requested.clone(),
                    central: winner_node.central_pinned,
                });
            } else {
                conflicts.push(VersionConflict {
                    name: loser.identity.name.clone(),
                    winner: winner_node.identity.clone(),
                    loser: loser.identity.clone(),
                    requested: loser.requested.clone(),
                });
            }
        }
    }

    resolved.sort();
    conflicts.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    downgrades.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

    RestoreTargetGraph {
        pair: pair.clone(),
        resolved,
        unresolved,
        cycles,
        conflicts,
        downgrades,
    }
}

/// Depth-first cycle search over library names.
///
/// Neighbors are visited in name order so the reported paths do not depend
/// on insertion order.
fn find_cycles(graph: &RawGraph) -> Vec<ResolutionCycle> {
    let mut cycles = Vec::new();
    let mut finished: HashSet<NodeIndex> = HashSet::new();

    for &root in graph.roots() {
        let mut path: Vec<NodeIndex> = Vec::new();
        let mut on_path: HashSet<String> = HashSet::new();
        visit(graph, root, &mut path, &mut on_path, &mut finished, &mut cycles);
    }

    cycles.sort_by(|a, b| a.path.cmp(&b.path));
    cycles.dedup();
    cycles
}

fn visit(
    graph: &RawGraph,
    index: NodeIndex,
    path: &mut Vec<NodeIndex>,
    on_path: &mut HashSet<String>,
    finished: &mut HashSet<NodeIndex>,
    cycles: &mut Vec<ResolutionCycle>,
) {
    let key = graph.node(index).identity.name_key();
    if on_path.contains(&key) {
        let start = path
            .iter()
            .position(|&i| graph.node(i).identity.name_key() == key)
            .unwrap_or(0);
        let mut names: Vec<String> = path[start..]
            .iter()
            .map(|&i| graph.node(i).identity.name.clone())
            .collect();
        names.push(graph.node(index).identity.name.clone());
        cycles.push(ResolutionCycle { path: names });
        return;
    }
    if finished.contains(&index) {
        return;
    }

    path.push(index);
    on_path.insert(key.clone());

    let mut neighbors: HashMap<String, NodeIndex> = HashMap::new();
    for (target, _) in graph.dependencies(index) {
        neighbors.insert(graph.node(target).identity.name_key(), target);
    }
    let mut ordered: Vec<_> = neighbors.into_iter().collect();
    ordered.sort_by(|a, b| a.0.cmp(&b.0));
    for (_, target) in ordered {
        visit(graph, target, path, on_path, finished, cycles);
    }

    path.pop();
    on_path.remove(&key);
    finished.insert(index);
}
