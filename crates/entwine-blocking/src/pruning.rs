//! Cardinality edge pruning over a block index.
//!
//! Every co-occurring pair implied by the index is weighted by how many
//! blocks its two entities share, and only the heaviest `capacity` pairs
//! survive. Source entities are tiled across workers; each worker keeps a
//! partition-local top-k with the same capacity and floor, streams it back
//! weight-descending, and the coordinator folds the streams into the global
//! top-k with early stopping at each stream's first rejected edge.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use entwine_core::{
    partition, BlockIndex, EntityId, EntwineError, Partition, RecordCollection, ResolutionKind,
    Result,
};

use crate::pool::{num_cpus, WorkerPool};
use crate::topk::{NeighborMap, TopKAggregator, WeightedEdge};

/// How a pair of entities is weighted from the blocks they share.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightingScheme {
    /// Number of shared blocks.
    #[default]
    CommonBlocks,
    /// Shared blocks over the union of both entities' blocks.
    JaccardBlocks,
}

impl WeightingScheme {
    /// Weight of a pair sharing `shared` blocks, whose entities appear in
    /// `blocks_a` and `blocks_b` blocks respectively.
    #[must_use]
    pub fn weigh(&self, shared: usize, blocks_a: usize, blocks_b: usize) -> f64 {
        match self {
            Self::CommonBlocks => shared as f64,
            Self::JaccardBlocks => {
                let union = blocks_a + blocks_b - shared;
                if union == 0 {
                    0.0
                } else {
                    shared as f64 / union as f64
                }
            }
        }
    }
}

/// Settings for a pruning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneConfig {
    /// Pairs to keep; `None` derives half the index's total cardinality.
    pub capacity: Option<usize>,
    /// Pair weighting scheme.
    pub scheme: WeightingScheme,
    /// Pairs lighter than this never enter the top-k.
    pub minimum_weight: f64,
    /// Worker threads per run.
    pub num_workers: usize,
    /// Tiles to split the source ids into; defaults to the worker count.
    pub num_partitions: Option<usize>,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            capacity: None,
            scheme: WeightingScheme::default(),
            minimum_weight: 0.0,
            num_workers: num_cpus(),
            num_partitions: None,
        }
    }
}

impl PruneConfig {
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    #[must_use]
    pub fn with_scheme(mut self, scheme: WeightingScheme) -> Self {
        self.scheme = scheme;
        self
    }

    #[must_use]
    pub fn with_minimum_weight(mut self, minimum_weight: f64) -> Self {
        self.minimum_weight = minimum_weight;
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

/// Counters from one pruning run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PruneStats {
    /// Top-k capacity the run used, configured or derived.
    pub capacity: usize,
    /// Pairs that survived.
    pub kept: usize,
    /// Tiles the source ids were split into.
    pub num_partitions: usize,
}

/// Block membership flipped entity-first, shared read-only by workers.
#[derive(Debug)]
pub struct EntityIndex {
    /// Per block: side-1 members and side-2 members, ascending.
    members: Vec<(Vec<EntityId>, Vec<EntityId>)>,
    entity_blocks: HashMap<EntityId, Vec<usize>>,
}

impl EntityIndex {
    /// Flattens a block index into membership lists keyed by dense block id.
    #[must_use]
    pub fn from_index(index: &BlockIndex) -> Self {
        let mut members = Vec::with_capacity(index.len());
        let mut entity_blocks: HashMap<EntityId, Vec<usize>> = HashMap::new();
        for (_, block) in index.iter() {
            let block_id = members.len();
            let side1: Vec<EntityId> = block.side1.iter().copied().collect();
            let side2: Vec<EntityId> = block.side2.iter().copied().collect();
            for &id in side1.iter().chain(side2.iter()) {
                entity_blocks.entry(id).or_default().push(block_id);
            }
            members.push((side1, side2));
        }
        Self { members, entity_blocks }
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.members.len()
    }

    fn blocks_of(&self, id: EntityId) -> &[usize] {
        self.entity_blocks.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Counts shared blocks between `source` and each of its candidates.
///
/// Dirty candidates are same-side entities with a higher id, so each pair
/// is generated exactly once. Clean-clean candidates are side-2 co-members.
fn shared_block_counts(
    entity_index: &EntityIndex,
    source: EntityId,
    kind: ResolutionKind,
) -> HashMap<EntityId, usize> {
    let mut counts = HashMap::new();
    for &block_id in entity_index.blocks_of(source) {
        let (side1, side2) = &entity_index.members[block_id];
        match kind {
            ResolutionKind::Dirty => {
                for &candidate in side1 {
                    if candidate > source {
                        *counts.entry(candidate).or_insert(0) += 1;
                    }
                }
            }
            ResolutionKind::CleanClean => {
                for &candidate in side2 {
                    *counts.entry(candidate).or_insert(0) += 1;
                }
            }
        }
    }
    counts
}

struct PruneContext {
    entity_index: EntityIndex,
    kind: ResolutionKind,
    scheme: WeightingScheme,
    capacity: usize,
    minimum_weight: f64,
}

fn prune_partition(ctx: &PruneContext, sources: Partition) -> Result<Vec<WeightedEdge>> {
    let mut local = TopKAggregator::new(ctx.capacity, ctx.minimum_weight)?;
    for source in sources.ids() {
        let blocks_source = ctx.entity_index.blocks_of(source).len();
        for (candidate, shared) in shared_block_counts(&ctx.entity_index, source, ctx.kind) {
            let blocks_candidate = ctx.entity_index.blocks_of(candidate).len();
            let weight = ctx.scheme.weigh(shared, blocks_source, blocks_candidate);
            local.offer(WeightedEdge::new(weight, source, candidate));
        }
    }
    Ok(local.into_sorted_edges())
}

/// Keeps only the globally heaviest pairs implied by a block index.
#[derive(Debug, Clone)]
pub struct CardinalityEdgePruner {
    config: PruneConfig,
}

impl CardinalityEdgePruner {
    /// Validates the configuration and wraps it.
    pub fn new(config: PruneConfig) -> Result<Self> {
        if config.num_workers == 0 {
            return Err(EntwineError::Config("worker count must be at least 1".into()));
        }
        if config.num_partitions == Some(0) {
            return Err(EntwineError::Config("partition count must be at least 1".into()));
        }
        if config.capacity == Some(0) {
            return Err(EntwineError::Config("top-k capacity must be at least 1".into()));
        }
        if !config.minimum_weight.is_finite() {
            return Err(EntwineError::Config("minimum weight must be finite".into()));
        }
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &PruneConfig {
        &self.config
    }

    /// Default capacity: half the index's total cardinality, at least 1.
    #[must_use]
    pub fn derived_capacity(index: &BlockIndex) -> usize {
        ((index.total_cardinality() / 2) as usize).max(1)
    }

    /// Runs the weigh-and-prune pipeline, returning surviving candidates.
    ///
    /// The index must have been built for this collection's resolution kind.
    pub fn prune(
        &self,
        collection: &RecordCollection,
        index: &BlockIndex,
    ) -> Result<(NeighborMap, PruneStats)> {
        if index.kind() != collection.kind() {
            return Err(EntwineError::TypeMismatch {
                expected: format!("{} block index", collection.kind()),
                found: format!("{} block index", index.kind()),
            });
        }
        let capacity =
            self.config.capacity.unwrap_or_else(|| Self::derived_capacity(index));
        let sources_end = match collection.kind() {
            ResolutionKind::Dirty => collection.num_entities(),
            ResolutionKind::CleanClean => collection.dataset_limit(),
        };
        let tiles = partition(sources_end, self.config.partitions());
        let num_partitions = tiles.len();

        let pool = WorkerPool::new(self.config.num_workers)?;
        let context = Arc::new(PruneContext {
            entity_index: EntityIndex::from_index(index),
            kind: collection.kind(),
            scheme: self.config.scheme,
            capacity,
            minimum_weight: self.config.minimum_weight,
        });
        let stream = pool.run_unordered(context, tiles, |ctx, tile| prune_partition(ctx, tile));

        let mut global = TopKAggregator::new(capacity, self.config.minimum_weight)?;
        for edges in stream {
            global.extend_sorted(edges?)?;
        }
        let stats = PruneStats { capacity, kept: global.len(), num_partitions };
        Ok((global.into_neighbor_map(), stats))
    }
}
