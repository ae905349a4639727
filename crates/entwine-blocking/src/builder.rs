//! Parallel construction of the global block index.
//!
//! The collection's id space is tiled into contiguous partitions, one build
//! task per tile (a clean-clean task carries a tile from each side). Workers
//! tokenize their tile into a partition-local shard, and the coordinator
//! folds shards into the global index as they arrive. Shard merging unions
//! per-key, so the fold yields the same index for any partition count.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use entwine_core::{
    partition, BlockIndex, EntwineError, Partition, RecordCollection, ResolutionKind, Result,
};

use crate::pool::{num_cpus, WorkerPool};
use crate::tokenizer::TokenizerStrategy;

/// Settings for a block-building run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockingConfig {
    /// Strategy expanding record text into blocking keys.
    pub tokenizer: TokenizerStrategy,
    /// Attribute names to tokenize on the first collection; `None` means all.
    pub attributes_1: Option<Vec<String>>,
    /// Attribute names to tokenize on the second collection; `None` means all.
    pub attributes_2: Option<Vec<String>>,
    /// Worker threads per run.
    pub num_workers: usize,
    /// Tiles to split the id space into; defaults to the worker count.
    pub num_partitions: Option<usize>,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            tokenizer: TokenizerStrategy::default(),
            attributes_1: None,
            attributes_2: None,
            num_workers: num_cpus(),
            num_partitions: None,
        }
    }
}

impl BlockingConfig {
    #[must_use]
    pub fn with_tokenizer(mut self, tokenizer: TokenizerStrategy) -> Self {
        self.tokenizer = tokenizer;
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

    fn partitions(&self) -> usize {
        self.num_partitions.unwrap_or(self.num_workers)
    }
}

/// Counters from one block-building run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BuildStats {
    /// Entities tokenized across both sides.
    pub num_entities: usize,
    /// Keys in the merged index.
    pub num_blocks: usize,
    /// Comparisons the merged index implies.
    pub total_cardinality: u64,
    /// Tiles the id space was split into.
    pub num_partitions: usize,
}

/// One tile of the id space handed to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildTask {
    /// First-collection ids to tokenize.
    pub side1: Partition,
    /// Second-collection ids (already offset), clean-clean only.
    pub side2: Option<Partition>,
}

struct BuildContext {
    collection: Arc<RecordCollection>,
    tokenizer: TokenizerStrategy,
    columns_1: Vec<usize>,
    columns_2: Vec<usize>,
}

/// Tokenizes one tile into a partition-local block index.
///
/// Side-2 ids are expected in the global id space, so shard keys collide
/// with side-1 keys exactly where a comparison should exist.
#[must_use]
pub fn build_partition_index(
    collection: &RecordCollection,
    tokenizer: &TokenizerStrategy,
    columns_1: &[usize],
    columns_2: &[usize],
    task: &BuildTask,
) -> BlockIndex {
    let mut index = BlockIndex::new(collection.kind());
    for id in task.side1.ids() {
        let text = collection.text_by_id(id, columns_1, columns_2);
        for key in tokenizer.blocking_keys(&text) {
            index.entry(key).side1.insert(id);
        }
    }
    if let Some(side2) = task.side2 {
        for id in side2.ids() {
            let text = collection.text_by_id(id, columns_1, columns_2);
            for key in tokenizer.blocking_keys(&text) {
                index.entry(key).side2.insert(id);
            }
        }
    }
    index
}

/// Builds the global block index for a collection in parallel.
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    config: BlockingConfig,
}

impl BlockBuilder {
    /// Validates the configuration and wraps it.
    pub fn new(config: BlockingConfig) -> Result<Self> {
        config.tokenizer.validate()?;
        if config.num_workers == 0 {
            return Err(EntwineError::Config("worker count must be at least 1".into()));
        }
        if config.num_partitions == Some(0) {
            return Err(EntwineError::Config("partition count must be at least 1".into()));
        }
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &BlockingConfig {
        &self.config
    }

    fn tasks(&self, collection: &RecordCollection) -> Vec<BuildTask> {
        let k = self.config.partitions();
        let side1 = partition(collection.num_entities_1(), k);
        match collection.kind() {
            ResolutionKind::Dirty => {
                side1.into_iter().map(|tile| BuildTask { side1: tile, side2: None }).collect()
            }
            ResolutionKind::CleanClean => {
                let limit = collection.dataset_limit();
                let side2 = partition(collection.num_entities_2(), k);
                side1
                    .into_iter()
                    .zip(side2)
                    .map(|(tile_1, tile_2)| BuildTask {
                        side1: tile_1,
                        side2: Some(Partition {
                            start: tile_2.start + limit,
                            end: tile_2.end + limit,
                        }),
                    })
                    .collect()
            }
        }
    }

    /// Runs the tokenize-and-merge pipeline, returning the merged index.
    ///
    /// Shards are folded in completion order; the first worker error aborts
    /// the fold and is returned.
    pub fn build(
        &self,
        collection: Arc<RecordCollection>,
    ) -> Result<(BlockIndex, BuildStats)> {
        let columns_1 = collection.resolve_attributes_1(self.config.attributes_1.as_deref())?;
        let columns_2 = collection.resolve_attributes_2(self.config.attributes_2.as_deref())?;
        let tasks = self.tasks(&collection);
        let num_partitions = tasks.len();

        let pool = WorkerPool::new(self.config.num_workers)?;
        let context = Arc::new(BuildContext {
            collection: Arc::clone(&collection),
            tokenizer: self.config.tokenizer.clone(),
            columns_1,
            columns_2,
        });
        let stream = pool.run_unordered(context, tasks, |ctx, task| {
            Ok(build_partition_index(
                &ctx.collection,
                &ctx.tokenizer,
                &ctx.columns_1,
                &ctx.columns_2,
                &task,
            ))
        });

        let mut global = BlockIndex::new(collection.kind());
        for shard in stream {
            global.merge(shard?)?;
        }
        let stats = BuildStats {
            num_entities: collection.num_entities(),
            num_blocks: global.len(),
            total_cardinality: global.total_cardinality(),
            num_partitions,
        };
        Ok((global, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn side_members(index: &BlockIndex, key: &str) -> Vec<usize> {
        index.get(key).map(|b| b.side1.iter().copied().collect()).unwrap_or_default()
    }

    #[test]
    fn test_builds_the_expected_dirty_index() {
        let builder = BlockBuilder::new(BlockingConfig::default().with_workers(2)).unwrap();
        let (index, stats) = builder.build(vehicles()).unwrap();
        assert_eq!(index.len(), 5);
        assert_eq!(side_members(&index, "red"), vec![0, 2]);
        assert_eq!(side_members(&index, "car"), vec![0, 1]);
        assert_eq!(side_members(&index, "bike"), vec![2, 3]);
        assert_eq!(side_members(&index, "blue"), vec![1]);
        assert_eq!(side_members(&index, "green"), vec![3]);
        assert_eq!(stats.num_entities, 4);
        assert_eq!(stats.num_blocks, 5);
        // three blocks of two members, singletons contribute nothing
        assert_eq!(stats.total_cardinality, 3);
    }

    #[test]
    fn test_merged_index_is_independent_of_partition_count() {
        let collection = vehicles();
        let reference = BlockBuilder::new(
            BlockingConfig::default().with_workers(1).with_partitions(1),
        )
        .unwrap()
        .build(Arc::clone(&collection))
        .unwrap()
        .0;
        for k in [2, 3, 5, 9] {
            let (index, stats) = BlockBuilder::new(
                BlockingConfig::default().with_workers(2).with_partitions(k),
            )
            .unwrap()
            .build(Arc::clone(&collection))
            .unwrap();
            assert_eq!(index.len(), reference.len(), "k = {k}");
            for (key, block) in reference.iter() {
                assert_eq!(index.get(key), Some(block), "key {key:?} at k = {k}");
            }
            assert_eq!(stats.num_partitions, k);
        }
    }

    #[test]
    fn test_clean_clean_offsets_side_two_ids() {
        let left = vec![
            Record::new("a0", vec!["red car".into()]),
            Record::new("a1", vec!["blue car".into()]),
        ];
        let right = vec![
            Record::new("b0", vec!["red bike".into()]),
            Record::new("b1", vec!["red car deluxe".into()]),
        ];
        let collection = Arc::new(
            RecordCollection::clean_clean(
                vec!["title".into()],
                left,
                vec!["title".into()],
                right,
            )
            .unwrap(),
        );
        let builder = BlockBuilder::new(BlockingConfig::default().with_workers(2)).unwrap();
        let (index, stats) = builder.build(collection).unwrap();

        let red = index.get("red").unwrap();
        assert_eq!(red.side1.iter().copied().collect::<Vec<_>>(), vec![0]);
        assert_eq!(red.side2.iter().copied().collect::<Vec<_>>(), vec![2, 3]);
        let car = index.get("car").unwrap();
        assert_eq!(car.side1.len(), 2);
        assert_eq!(car.side2.iter().copied().collect::<Vec<_>>(), vec![3]);
        // cross-side products: red 1*2, car 2*1, plus zero-sided keys
        assert!(index.get("bike").is_some_and(|b| b.side1.is_empty()));
        assert_eq!(stats.total_cardinality, 4);
        assert_eq!(stats.num_entities, 4);
    }

    #[test]
    fn test_attribute_selection_narrows_the_keys() {
        let records = vec![
            Record::new("r0", vec!["red car".into(), "athens".into()]),
            Record::new("r1", vec!["blue car".into(), "athens".into()]),
        ];
        let collection = Arc::new(
            RecordCollection::dirty(vec!["title".into(), "city".into()], records).unwrap(),
        );
        let all = BlockBuilder::new(BlockingConfig::default().with_workers(1))
            .unwrap()
            .build(Arc::clone(&collection))
            .unwrap()
            .0;
        assert!(all.get("athens").is_some());
        let titles_only = BlockBuilder::new(
            BlockingConfig::default()
                .with_workers(1)
                .with_attributes_1(vec!["title".into()]),
        )
        .unwrap()
        .build(collection)
        .unwrap()
        .0;
        assert!(titles_only.get("athens").is_none());
        assert!(titles_only.get("car").is_some());
    }

    #[test]
    fn test_unknown_attribute_is_a_config_error() {
        let builder = BlockBuilder::new(
            BlockingConfig::default()
                .with_workers(1)
                .with_attributes_1(vec!["missing".into()]),
        )
        .unwrap();
        assert!(matches!(builder.build(vehicles()), Err(EntwineError::Config(_))));
    }

    #[test]
    fn test_invalid_config_is_rejected_up_front() {
        assert!(BlockBuilder::new(BlockingConfig::default().with_workers(0)).is_err());
        assert!(BlockBuilder::new(BlockingConfig::default().with_partitions(0)).is_err());
        let bad_tokenizer =
            BlockingConfig::default().with_tokenizer(TokenizerStrategy::QGrams { q: 0 });
        assert!(BlockBuilder::new(bad_tokenizer).is_err());
    }

    #[test]
    fn test_more_partitions_than_entities() {
        let builder = BlockBuilder::new(
            BlockingConfig::default().with_workers(3).with_partitions(16),
        )
        .unwrap();
        let (index, stats) = builder.build(vehicles()).unwrap();
        assert_eq!(index.len(), 5);
        assert_eq!(stats.num_partitions, 16);
    }

    #[test]
    fn test_empty_collection_builds_an_empty_index() {
        let collection =
            Arc::new(RecordCollection::dirty(vec!["title".into()], Vec::new()).unwrap());
        let builder = BlockBuilder::new(BlockingConfig::default().with_workers(2)).unwrap();
        let (index, stats) = builder.build(collection).unwrap();
        assert!(index.is_empty());
        assert_eq!(stats.total_cardinality, 0);
    }
}
