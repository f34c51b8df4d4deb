use lifegraph_schemas::{round_to, CanonicalRecord, Edge, NodeId, Signal};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::signals::calculate_signals;

/// Minimum summed evidence weight for an edge to exist
pub const MIN_EDGE_WEIGHT: f64 = 0.5;

/// Maximum surviving edges per (node, signal) pair
pub const MAX_EDGES_PER_SIGNAL: usize = 6;

/// Result of edge generation
#[derive(Debug, Clone, Default)]
pub struct EdgeSet {
    pub edges: Vec<Edge>,
    pub connections: BTreeMap<NodeId, Vec<NodeId>>,
    pub candidates: usize,
    pub pruned: usize,
}

/// Build, prune and order the edges between a read-only snapshot of records
pub fn build_edges(records: &[CanonicalRecord]) -> EdgeSet {
    let mut sorted: Vec<&CanonicalRecord> = records.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut edges = Vec::new();
    let mut pairs = 0usize;

    for i in 0..sorted.len() {
        for j in (i + 1)..sorted.len() {
            pairs += 1;
            let (a, b) = (sorted[i], sorted[j]);
            let evidence = calculate_signals(a, b);
            if evidence.is_empty() {
                continue;
            }

            let weight = round_to(evidence.iter().map(|e| e.weight).sum(), 2);
            if weight < MIN_EDGE_WEIGHT {
                continue;
            }

            edges.push(Edge {
                source: a.id.clone(),
                target: b.id.clone(),
                weight,
                evidence,
            });
        }
    }

    let candidates = edges.len();
    debug!("Compared {} pairs, {} candidate edges", pairs, candidates);

    let mut edges = prune_edges(edges);
    edges.sort_by(|a, b| a.source.cmp(&b.source).then_with(|| a.target.cmp(&b.target)));

    let mut connections: BTreeMap<NodeId, Vec<NodeId>> = sorted
        .iter()
        .map(|r| (r.id.clone(), Vec::new()))
        .collect();
    for edge in &edges {
        if let Some(list) = connections.get_mut(&edge.source) {
            list.push(edge.target.clone());
        }
        if let Some(list) = connections.get_mut(&edge.target) {
            list.push(edge.source.clone());
        }
    }
    for list in connections.values_mut() {
        list.sort();
        list.dedup();
    }

    let pruned = candidates - edges.len();
    info!(
        "Built {} edges ({} candidates, {} pruned)",
        edges.len(),
        candidates,
        pruned
    );

    EdgeSet {
        edges,
        connections,
        candidates,
        pruned,
    }
}

/// Cap each (node, signal) pair at [`MAX_EDGES_PER_SIGNAL`] edges.
///
/// Nodes are visited in id order and signals in table order. Within a group
/// the heaviest edges win and equal weights fall back to the other endpoint's
/// id, ascending. Removing an edge only lowers other groups' counts, so every
/// group is within the cap once the pass finishes.
pub fn prune_edges(edges: Vec<Edge>) -> Vec<Edge> {
    let mut alive = vec![true; edges.len()];

    let nodes: BTreeSet<&NodeId> = edges
        .iter()
        .flat_map(|e| [&e.source, &e.target])
        .collect();

    for node in nodes {
        let signals: BTreeSet<Signal> = edges
            .iter()
            .enumerate()
            .filter(|(i, e)| alive[*i] && e.touches(node))
            .flat_map(|(_, e)| e.evidence.iter().map(|ev| ev.signal))
            .collect();

        for signal in signals {
            let mut group: Vec<usize> = (0..edges.len())
                .filter(|&i| alive[i] && edges[i].touches(node) && edges[i].has_signal(signal))
                .collect();
            if group.len() <= MAX_EDGES_PER_SIGNAL {
                continue;
            }

            group.sort_by(|&x, &y| {
                edges[y]
                    .weight
                    .total_cmp(&edges[x].weight)
                    .then_with(|| edges[x].other(node).cmp(edges[y].other(node)))
            });
            for &i in &group[MAX_EDGES_PER_SIGNAL..] {
                alive[i] = false;
            }
            debug!(
                "Pruned {} {} edges at {}",
                group.len() - MAX_EDGES_PER_SIGNAL,
                signal.as_str(),
                node
            );
        }
    }

    edges
        .into_iter()
        .zip(alive)
        .filter_map(|(edge, keep)| keep.then_some(edge))
        .collect()
}

/// Fill every record's `connections` from a built edge set
pub fn apply_connections(records: Vec<CanonicalRecord>, set: &EdgeSet) -> Vec<CanonicalRecord> {
    records
        .into_iter()
        .map(|mut record| {
            record.connections = set.connections.get(&record.id).cloned().unwrap_or_default();
            record
        })
        .collect()
}
