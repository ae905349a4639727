//! Undirected similarity graph over matched entity pairs.
//!
//! Edges are stored under canonical (low, high) endpoint keys, so the same
//! pair scored twice, possibly by different partitions, lands on one entry.
//! Merging graphs reconciles duplicate edges by keeping the higher weight.

use std::collections::{BTreeSet, HashMap};

use entwine_core::{merge_keyed, EntityId};

use crate::topk::{NeighborMap, WeightedEdge};

/// Accumulated match results.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CandidateGraph {
    edges: HashMap<(EntityId, EntityId), f64>,
}

fn canonical(a: EntityId, b: EntityId) -> (EntityId, EntityId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl CandidateGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an edge, keeping the heavier weight when the pair repeats.
    pub fn add_edge(&mut self, a: EntityId, b: EntityId, weight: f64) {
        let slot = self.edges.entry(canonical(a, b)).or_insert(f64::NEG_INFINITY);
        if weight > *slot {
            *slot = weight;
        }
    }

    /// Folds another graph into this one, max-reconciling shared edges.
    pub fn merge(&mut self, other: CandidateGraph) {
        merge_keyed(&mut self.edges, other.edges, f64::max);
    }

    /// Weight of the edge between `a` and `b`, if present.
    #[must_use]
    pub fn weight(&self, a: EntityId, b: EntityId) -> Option<f64> {
        self.edges.get(&canonical(a, b)).copied()
    }

    #[must_use]
    pub fn contains_edge(&self, a: EntityId, b: EntityId) -> bool {
        self.edges.contains_key(&canonical(a, b))
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Distinct entities appearing in at least one edge.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes().len()
    }

    #[must_use]
    pub fn nodes(&self) -> BTreeSet<EntityId> {
        self.edges.keys().flat_map(|&(a, b)| [a, b]).collect()
    }

    /// Edges ordered best first, ties broken on endpoints.
    #[must_use]
    pub fn sorted_edges(&self) -> Vec<WeightedEdge> {
        let mut edges: Vec<WeightedEdge> = self
            .edges
            .iter()
            .map(|(&(source, target), &weight)| WeightedEdge::new(weight, source, target))
            .collect();
        edges.sort_by(|x, y| y.cmp(x));
        edges
    }

    /// Adjacency view of the graph, symmetric in both directions.
    #[must_use]
    pub fn to_neighbor_map(&self) -> NeighborMap {
        let mut neighbors: NeighborMap = HashMap::new();
        for &(a, b) in self.edges.keys() {
            neighbors.entry(a).or_default().insert(b);
            neighbors.entry(b).or_default().insert(a);
        }
        neighbors
    }
}
