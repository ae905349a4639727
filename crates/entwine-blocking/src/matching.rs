//! Set-similarity matching over pruned candidate pairs.
//!
//! Each surviving candidate pair is scored on the word sets of the two
//! records, and pairs at or above the threshold become graph edges. The
//! neighbor map lists every pair under both endpoints, so two partitions
//! may score the same pair from opposite directions; the canonical-keyed
//! graph collapses the duplicates during the merge fold.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use entwine_core::{partition, EntityId, EntwineError, Partition, RecordCollection, Result};

use crate::graph::CandidateGraph;
use crate::pool::{num_cpus, WorkerPool};
use crate::tokenizer::word_set;
use crate::topk::NeighborMap;

/// Set-similarity metric over two word sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimilarityMetric {
    /// Twice the overlap over the summed sizes.
    #[default]
    Dice,
    /// Overlap over the union.
    Jaccard,
}

impl SimilarityMetric {
    /// Scores two word sets; two empty sets score zero.
    #[must_use]
    pub fn score(&self, a: &HashSet<String>, b: &HashSet<String>) -> f64 {
        let shared = a.intersection(b).count();
        let total = a.len() + b.len();
        if total == 0 {
            return 0.0;
        }
        match self {
            Self::Dice => 2.0 * shared as f64 / total as f64,
            Self::Jaccard => shared as f64 / (total - shared) as f64,
        }
    }
}

/// Settings for a matching run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Similarity metric over record word sets.
    pub metric: SimilarityMetric,
    /// Scores below this are dropped.
    pub threshold: f64,
    /// Attribute names scored on the first collection; `None` means all.
    pub attributes_1: Option<Vec<String>>,
    /// Attribute names scored on the second collection; `None` means all.
    pub attributes_2: Option<Vec<String>>,
    /// Worker threads per run.
    pub num_workers: usize,
    /// Tiles to split the candidate sources into; defaults to the workers.
    pub num_partitions: Option<usize>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            metric: SimilarityMetric::default(),
            threshold: 0.5,
            attributes_1: None,
            attributes_2: None,
            num_workers: num_cpus(),
            num_partitions: None,
        }
    }
}

impl MatchingConfig {
    #[must_use]
    pub fn with_metric(mut self, metric: SimilarityMetric) -> Self {
        self.metric = metric;
        self
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_attributes_1(mut self, names: Vec<String>) -> Self {
        self.attributes_1 = Some(names);
        self
    }

    #[must_use]
    pub fn with_attributes_2(mut self, names: Vec<String>) -> Self {
        self.attributes_2 = Some(names);
        self
    }

    #[must_use]
    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    #[must_use]
    pub fn with_partitions(mut self, num_partitions: usize) -> Self {
        self.num_partitions = Some(num_partitions);
        self
    }

    fn partitions(&self) -> usize {
        self.num_partitions.unwrap_or(self.num_workers)
    }
}

/// Counters from one matching run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MatchStats {
    /// Distinct candidate pairs scored.
    pub num_candidates: usize,
    /// Pairs at or above the threshold.
    pub num_edges: usize,
    /// Entities appearing in at least one surviving pair.
    pub num_nodes: usize,
}

struct MatchContext {
    collection: Arc<RecordCollection>,
    sources: Vec<(EntityId, Vec<EntityId>)>,
    columns_1: Vec<usize>,
    columns_2: Vec<usize>,
    metric: SimilarityMetric,
    threshold: f64,
}

fn entity_tokens(ctx: &MatchContext, id: EntityId) -> HashSet<String> {
    word_set(&ctx.collection.text_by_id(id, &ctx.columns_1, &ctx.columns_2))
}

fn match_partition(ctx: &MatchContext, tile: Partition) -> CandidateGraph {
    let mut graph = CandidateGraph::new();
    let mut token_cache: HashMap<EntityId, HashSet<String>> = HashMap::new();
    for (source, neighbors) in &ctx.sources[tile.start..tile.end] {
        let source_tokens = entity_tokens(ctx, *source);
        for neighbor in neighbors {
            let neighbor_tokens = token_cache
                .entry(*neighbor)
                .or_insert_with(|| entity_tokens(ctx, *neighbor));
            let score = ctx.metric.score(&source_tokens, neighbor_tokens);
            if score >= ctx.threshold {
                graph.add_edge(*source, *neighbor, score);
            }
        }
    }
    graph
}

/// Scores candidate pairs in parallel and collects the match graph.
#[derive(Debug, Clone)]
pub struct EntityMatcher {
    config: MatchingConfig,
}

impl EntityMatcher {
    /// Validates the configuration and wraps it.
    pub fn new(config: MatchingConfig) -> Result<Self> {
        if !(0.0..=1.0).contains(&config.threshold) {
            return Err(EntwineError::Config(
                "similarity threshold must lie in [0, 1]".into(),
            ));
        }
        if config.num_workers == 0 {
            return Err(EntwineError::Config("worker count must be at least 1".into()));
        }
        if config.num_partitions == Some(0) {
            return Err(EntwineError::Config("partition count must be at least 1".into()));
        }
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Scores every candidate pair, returning the graph of matches.
    pub fn match_candidates(
        &self,
        collection: Arc<RecordCollection>,
        candidates: &NeighborMap,
    ) -> Result<(CandidateGraph, MatchStats)> {
        let columns_1 = collection.resolve_attributes_1(self.config.attributes_1.as_deref())?;
        let columns_2 = collection.resolve_attributes_2(self.config.attributes_2.as_deref())?;
        let mut sources: Vec<(EntityId, Vec<EntityId>)> = candidates
            .iter()
            .map(|(&id, set)| (id, set.iter().copied().collect()))
            .collect();
        sources.sort_by_key(|(id, _)| *id);
        // the map is symmetric, each pair shows up under both endpoints
        let num_candidates =
            sources.iter().map(|(_, neighbors)| neighbors.len()).sum::<usize>() / 2;
        let tiles = partition(sources.len(), self.config.partitions());

        let pool = WorkerPool::new(self.config.num_workers)?;
        let context = Arc::new(MatchContext {
            collection,
            sources,
            columns_1,
            columns_2,
            metric: self.config.metric,
            threshold: self.config.threshold,
        });
        let stream =
            pool.run_unordered(context, tiles, |ctx, tile| Ok(match_partition(ctx, tile)));

        let mut graph = CandidateGraph::new();
        for piece in stream {
            graph.merge(piece?);
        }
        let stats = MatchStats {
            num_candidates,
            num_edges: graph.edge_count(),
            num_nodes: graph.node_count(),
        };
        Ok((graph, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeSet;

    use entwine_core::Record;

    fn vehicles() -> Arc<RecordCollection> {
        let records = vec![
            Record::new("r0", vec!["red car".into()]),
            Record::new("r1", vec!["blue car".into()]),
            Record::new("r2", vec!["red bike".into()]),
            Record::new("r3", vec!["green bike".into()]),
        ];
        Arc::new(RecordCollection::dirty(vec!["title".into()], records).unwrap())
    }

    fn neighbor_map(pairs: &[(EntityId, EntityId)]) -> NeighborMap {
        let mut map: NeighborMap = HashMap::new();
        for &(a, b) in pairs {
            map.entry(a).or_insert_with(BTreeSet::new).insert(b);
            map.entry(b).or_insert_with(BTreeSet::new).insert(a);
        }
        map
    }

    fn words(text: &str) -> HashSet<String> {
        word_set(text)
    }

    #[test]
    fn test_dice_scores() {
        let metric = SimilarityMetric::Dice;
        assert_eq!(metric.score(&words("red car"), &words("blue car")), 0.5);
        assert_eq!(metric.score(&words("red car"), &words("red car")), 1.0);
        assert_eq!(metric.score(&words("red"), &words("blue")), 0.0);
        assert_eq!(metric.score(&words(""), &words("")), 0.0);
    }

    #[test]
    fn test_jaccard_scores() {
        let metric = SimilarityMetric::Jaccard;
        assert!((metric.score(&words("red car"), &words("blue car")) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(metric.score(&words("red car"), &words("car red")), 1.0);
        assert_eq!(metric.score(&words(""), &words("")), 0.0);
    }

    #[test]
    fn test_matches_pairs_at_the_threshold() {
        let matcher = EntityMatcher::new(MatchingConfig::default().with_workers(2)).unwrap();
        let candidates = neighbor_map(&[(0, 1), (0, 2), (2, 3)]);
        let (graph, stats) = matcher.match_candidates(vehicles(), &candidates).unwrap();
        // every candidate pair shares one of its four words
        assert_eq!(stats.num_candidates, 3);
        assert_eq!(stats.num_edges, 3);
        assert_eq!(stats.num_nodes, 4);
        assert_eq!(graph.weight(0, 1), Some(0.5));
        assert_eq!(graph.weight(0, 2), Some(0.5));
        assert_eq!(graph.weight(2, 3), Some(0.5));
    }

    #[test]
    fn test_threshold_drops_weak_pairs() {
        let matcher = EntityMatcher::new(
            MatchingConfig::default().with_threshold(0.6).with_workers(2),
        )
        .unwrap();
        let candidates = neighbor_map(&[(0, 1), (0, 2), (2, 3)]);
        let (graph, stats) = matcher.match_candidates(vehicles(), &candidates).unwrap();
        assert!(graph.is_empty());
        assert_eq!(stats.num_candidates, 3);
        assert_eq!(stats.num_edges, 0);
        assert_eq!(stats.num_nodes, 0);
    }

    #[test]
    fn test_both_directions_collapse_to_one_edge() {
        // a pair scored from each endpoint, possibly by different workers,
        // must come out as a single edge
        let matcher = EntityMatcher::new(
            MatchingConfig::default().with_workers(4).with_partitions(4),
        )
        .unwrap();
        let candidates = neighbor_map(&[(0, 1)]);
        let (graph, stats) = matcher.match_candidates(vehicles(), &candidates).unwrap();
        assert_eq!(stats.num_candidates, 1);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.weight(0, 1), Some(0.5));
    }

    #[test]
    fn test_jaccard_metric_end_to_end() {
        let matcher = EntityMatcher::new(
            MatchingConfig::default()
                .with_metric(SimilarityMetric::Jaccard)
                .with_threshold(0.3),
        )
        .unwrap();
        let candidates = neighbor_map(&[(0, 1)]);
        let (graph, _) = matcher.match_candidates(vehicles(), &candidates).unwrap();
        let weight = graph.weight(0, 1).unwrap();
        assert!((weight - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_results_are_stable_across_worker_counts() {
        let candidates = neighbor_map(&[(0, 1), (0, 2), (2, 3)]);
        let mut graphs = Vec::new();
        for workers in [1, 2, 5] {
            let matcher = EntityMatcher::new(
                MatchingConfig::default().with_workers(workers),
            )
            .unwrap();
            let (graph, _) = matcher.match_candidates(vehicles(), &candidates).unwrap();
            graphs.push(graph);
        }
        assert_eq!(graphs[0], graphs[1]);
        assert_eq!(graphs[0], graphs[2]);
    }

    #[test]
    fn test_empty_candidates_match_nothing() {
        let matcher = EntityMatcher::new(MatchingConfig::default()).unwrap();
        let (graph, stats) =
            matcher.match_candidates(vehicles(), &NeighborMap::new()).unwrap();
        assert!(graph.is_empty());
        assert_eq!(stats.num_candidates, 0);
        assert_eq!(stats.num_nodes, 0);
    }

    #[test]
    fn test_invalid_config_is_rejected_up_front() {
        assert!(EntityMatcher::new(MatchingConfig::default().with_threshold(1.5)).is_err());
        assert!(EntityMatcher::new(MatchingConfig::default().with_threshold(-0.1)).is_err());
        assert!(EntityMatcher::new(MatchingConfig::default().with_threshold(f64::NAN)).is_err());
        assert!(EntityMatcher::new(MatchingConfig::default().with_workers(0)).is_err());
        assert!(EntityMatcher::new(MatchingConfig::default().with_partitions(0)).is_err());
    }
}
