//! Bounded top-K retention of weighted comparisons.
//!
//! The aggregator keeps the K best edges seen so far in a min-heap keyed by
//! a total order over (weight, source, target), so ties break the same way
//! no matter how the edges were partitioned. Feeding it per-partition
//! streams that are already weight-descending lets a fold stop reading a
//! stream at the first rejected edge.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use entwine_core::{EntityId, EntwineError, Result};

/// Retained candidates per entity, symmetric in both directions.
pub type NeighborMap = HashMap<EntityId, BTreeSet<EntityId>>;

/// A scored comparison between two entities.
#[derive(Debug, Clone, Copy)]
pub struct WeightedEdge {
    /// Comparison weight, higher is better.
    pub weight: f64,
    /// Lower endpoint id.
    pub source: EntityId,
    /// Higher endpoint id.
    pub target: EntityId,
}

impl WeightedEdge {
    /// Builds an edge; endpoint order is the caller's business.
    #[must_use]
    pub fn new(weight: f64, source: EntityId, target: EntityId) -> Self {
        Self { weight, source, target }
    }
}

impl Ord for WeightedEdge {
    fn cmp(&self, other: &Self) -> Ordering {
        self.weight
            .total_cmp(&other.weight)
            .then_with(|| self.source.cmp(&other.source))
            .then_with(|| self.target.cmp(&other.target))
    }
}

impl PartialOrd for WeightedEdge {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for WeightedEdge {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for WeightedEdge {}

/// Keeps the best `capacity` edges offered to it.
#[derive(Debug)]
pub struct TopKAggregator {
    capacity: usize,
    minimum_weight: f64,
    heap: BinaryHeap<Reverse<WeightedEdge>>,
}

impl TopKAggregator {
    /// Creates an aggregator that retains at most `capacity` edges, never
    /// admitting one lighter than `minimum_weight`.
    pub fn new(capacity: usize, minimum_weight: f64) -> Result<Self> {
        if capacity == 0 {
            return Err(EntwineError::Config("top-k capacity must be at least 1".into()));
        }
        Ok(Self { capacity, minimum_weight, heap: BinaryHeap::with_capacity(capacity + 1) })
    }

    /// Maximum number of edges retained.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Edges currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Current admission floor: the configured minimum until the structure
    /// fills, then the weight of the worst retained edge.
    #[must_use]
    pub fn minimum_weight(&self) -> f64 {
        self.minimum_weight
    }

    /// Offers one edge. Returns whether it was admitted.
    ///
    /// Once the structure is full the floor rises to the worst retained
    /// weight, so an admission can evict the previous worst edge.
    pub fn offer(&mut self, edge: WeightedEdge) -> bool {
        if edge.weight < self.minimum_weight {
            return false;
        }
        self.heap.push(Reverse(edge));
        if self.heap.len() > self.capacity {
            self.heap.pop();
        }
        if self.heap.len() == self.capacity {
            if let Some(Reverse(worst)) = self.heap.peek() {
                self.minimum_weight = worst.weight;
            }
        }
        true
    }

    /// Folds in a weight-descending edge stream, stopping at the first
    /// rejection. Returns how many edges were admitted.
    ///
    /// A weight increase mid-stream breaks the early-stop argument, so it
    /// is reported as an error rather than silently mis-pruned.
    pub fn extend_sorted<I>(&mut self, edges: I) -> Result<usize>
    where
        I: IntoIterator<Item = WeightedEdge>,
    {
        let mut previous = f64::INFINITY;
        let mut admitted = 0;
        for edge in edges {
            if edge.weight > previous {
                return Err(EntwineError::TypeMismatch {
                    expected: "weight-descending edge stream".into(),
                    found: format!("weight {} after {previous}", edge.weight),
                });
            }
            previous = edge.weight;
            if !self.offer(edge) {
                break;
            }
            admitted += 1;
        }
        Ok(admitted)
    }

    /// Consumes the aggregator, returning retained edges best first.
    #[must_use]
    pub fn into_sorted_edges(self) -> Vec<WeightedEdge> {
        self.heap.into_sorted_vec().into_iter().map(|Reverse(edge)| edge).collect()
    }

    /// Consumes the aggregator into a symmetric neighbor map.
    #[must_use]
    pub fn into_neighbor_map(self) -> NeighborMap {
        let mut neighbors: NeighborMap = HashMap::new();
        for Reverse(edge) in self.heap {
            neighbors.entry(edge.source).or_default().insert(edge.target);
            neighbors.entry(edge.target).or_default().insert(edge.source);
        }
        neighbors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(weight: f64, source: EntityId, target: EntityId) -> WeightedEdge {
        WeightedEdge::new(weight, source, target)
    }

    fn top_k_by_sorting(mut edges: Vec<WeightedEdge>, k: usize) -> Vec<WeightedEdge> {
        edges.sort_by(|a, b| b.cmp(a));
        edges.truncate(k);
        edges
    }

    #[test]
    fn test_zero_capacity_is_a_config_error() {
        assert!(matches!(TopKAggregator::new(0, 0.0), Err(EntwineError::Config(_))));
    }

    #[test]
    fn test_keeps_the_heaviest_edges() {
        let mut topk = TopKAggregator::new(2, 0.0).unwrap();
        for e in [edge(1.0, 0, 1), edge(5.0, 0, 2), edge(3.0, 1, 2), edge(4.0, 2, 3)] {
            topk.offer(e);
        }
        let kept = topk.into_sorted_edges();
        assert_eq!(kept, vec![edge(5.0, 0, 2), edge(4.0, 2, 3)]);
    }

    #[test]
    fn test_floor_starts_at_the_configured_minimum() {
        let mut topk = TopKAggregator::new(10, 2.0).unwrap();
        assert!(!topk.offer(edge(1.5, 0, 1)));
        assert!(topk.offer(edge(2.0, 0, 2)));
        assert_eq!(topk.len(), 1);
    }

    #[test]
    fn test_floor_rises_once_full() {
        let mut topk = TopKAggregator::new(2, 0.0).unwrap();
        assert!(topk.offer(edge(3.0, 0, 1)));
        assert!(topk.offer(edge(5.0, 0, 2)));
        assert_eq!(topk.minimum_weight(), 3.0);
        assert!(!topk.offer(edge(2.0, 1, 2)), "below the raised floor");
        assert!(topk.offer(edge(4.0, 2, 3)), "evicts the worst edge");
        assert_eq!(topk.minimum_weight(), 4.0);
        let kept = topk.into_sorted_edges();
        assert_eq!(kept, vec![edge(5.0, 0, 2), edge(4.0, 2, 3)]);
    }

    #[test]
    fn test_ties_break_on_endpoints() {
        let mut topk = TopKAggregator::new(2, 0.0).unwrap();
        for e in [edge(1.0, 3, 4), edge(1.0, 0, 1), edge(1.0, 0, 2)] {
            topk.offer(e);
        }
        let kept = topk.into_sorted_edges();
        assert_eq!(kept, vec![edge(1.0, 3, 4), edge(1.0, 0, 2)]);
    }

    #[test]
    fn test_matches_a_direct_global_sort() {
        let edges: Vec<WeightedEdge> = (0..50)
            .map(|i| edge(((i * 31) % 17) as f64, i % 7, 7 + i % 5))
            .collect();
        for k in [1, 5, 50, 80] {
            let mut topk = TopKAggregator::new(k, 0.0).unwrap();
            for e in &edges {
                topk.offer(*e);
            }
            assert_eq!(
                topk.into_sorted_edges(),
                top_k_by_sorting(edges.clone(), k),
                "k = {k}"
            );
        }
    }

    #[test]
    fn test_extend_sorted_counts_admissions_and_stops_early() {
        let mut topk = TopKAggregator::new(2, 0.0).unwrap();
        let stream = vec![
            edge(5.0, 0, 1),
            edge(4.0, 0, 2),
            edge(3.0, 1, 2),
            edge(2.0, 2, 3),
        ];
        let admitted = topk.extend_sorted(stream).unwrap();
        // the third edge falls below the raised floor; the fourth is never read
        assert_eq!(admitted, 2);
        assert_eq!(topk.len(), 2);
    }

    #[test]
    fn test_extend_sorted_rejects_an_ascending_stream() {
        let mut topk = TopKAggregator::new(5, 0.0).unwrap();
        let result = topk.extend_sorted(vec![edge(1.0, 0, 1), edge(2.0, 0, 2)]);
        assert!(matches!(result, Err(EntwineError::TypeMismatch { .. })));
    }

    #[test]
    fn test_extend_sorted_allows_equal_weights() {
        let mut topk = TopKAggregator::new(5, 0.0).unwrap();
        let admitted =
            topk.extend_sorted(vec![edge(1.0, 0, 1), edge(1.0, 0, 2), edge(1.0, 1, 2)]).unwrap();
        assert_eq!(admitted, 3);
    }

    #[test]
    fn test_fold_of_sorted_partitions_matches_a_global_sort() {
        let edges: Vec<WeightedEdge> =
            (0..60).map(|i| edge(((i * 13) % 23) as f64, i, 100 + i)).collect();
        let k = 7;

        // per-partition local top-k, then a global fold of the sorted locals
        let mut global = TopKAggregator::new(k, 0.0).unwrap();
        for chunk in edges.chunks(20) {
            let mut local = TopKAggregator::new(k, 0.0).unwrap();
            for e in chunk {
                local.offer(*e);
            }
            global.extend_sorted(local.into_sorted_edges()).unwrap();
        }
        assert_eq!(global.into_sorted_edges(), top_k_by_sorting(edges, k));
    }

    #[test]
    fn test_neighbor_map_is_symmetric() {
        let mut topk = TopKAggregator::new(10, 0.0).unwrap();
        topk.offer(edge(1.0, 0, 2));
        topk.offer(edge(0.5, 1, 2));
        let neighbors = topk.into_neighbor_map();
        assert!(neighbors[&0].contains(&2));
        assert!(neighbors[&2].contains(&0));
        assert!(neighbors[&2].contains(&1));
        assert_eq!(neighbors.len(), 3);
    }
}
