//! # entwine-blocking
//!
//! Parallel blocking for entity resolution.
//!
//! Blocking trims the quadratic comparison space of entity resolution down
//! to the pairs worth scoring: records are expanded into blocking keys, keys
//! gather co-occurring records into blocks, block co-occurrence weights the
//! candidate pairs, and the heaviest survivors are scored for matches. Every
//! stage tiles its input across a fixed worker pool and folds the partial
//! results with order-insensitive merges, so the output never depends on the
//! worker or partition count.
//!
//! ## Features
//!
//! - **Blocking key strategies**: whole words, q-grams, suffixes, and their
//!   extended variants
//! - **Dirty and Clean-Clean resolution**: one collection matched against
//!   itself, or two collections matched across sides only
//! - **Cardinality edge pruning**: bounded top-k retention of candidate
//!   pairs by shared-block weight
//! - **Set-similarity matching**: Dice or Jaccard scoring into a candidate
//!   graph with max-weight reconciliation
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use entwine_blocking::{BlockBuilder, BlockingConfig, Record, RecordCollection};
//!
//! # fn main() -> entwine_blocking::Result<()> {
//! let records = vec![
//!     Record::new("r0", vec!["red car".into()]),
//!     Record::new("r1", vec!["blue car".into()]),
//! ];
//! let collection = Arc::new(RecordCollection::dirty(vec!["title".into()], records)?);
//!
//! let builder = BlockBuilder::new(BlockingConfig::default().with_workers(2))?;
//! let (index, stats) = builder.build(collection)?;
//!
//! assert_eq!(stats.num_blocks, 3);
//! assert_eq!(index.get("car").map(|block| block.size()), Some(2));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      BLOCKING PIPELINE                         │
//! │                                                                │
//! │  JSONL files ──▶ RecordCollection (global id space)            │
//! │                        │                                       │
//! │                        ▼                                       │
//! │  ┌──────────────────────────────────────────────────────────┐ │
//! │  │ BlockBuilder     tile ids ──▶ workers tokenize shards    │ │
//! │  │                  shards  ──▶ union-merge ──▶ BlockIndex  │ │
//! │  └──────────────────────────────────────────────────────────┘ │
//! │                        │                                       │
//! │                        ▼                                       │
//! │  ┌──────────────────────────────────────────────────────────┐ │
//! │  │ CardinalityEdgePruner                                    │ │
//! │  │   weigh co-occurring pairs ──▶ local top-k ──▶ global    │ │
//! │  │   top-k fold ──▶ NeighborMap                             │ │
//! │  └──────────────────────────────────────────────────────────┘ │
//! │                        │                                       │
//! │                        ▼                                       │
//! │  ┌──────────────────────────────────────────────────────────┐ │
//! │  │ EntityMatcher    score candidate pairs ──▶ max-merge     │ │
//! │  │                  ──▶ CandidateGraph                      │ │
//! │  └──────────────────────────────────────────────────────────┘ │
//! └────────────────────────────────────────────────────────────────┘
//! ```

pub mod builder;
pub mod graph;
pub mod io;
pub mod matching;
pub mod pool;
pub mod pruning;
pub mod tokenizer;
pub mod topk;

pub use builder::{build_partition_index, BlockBuilder, BlockingConfig, BuildStats, BuildTask};
pub use graph::CandidateGraph;
pub use matching::{EntityMatcher, MatchStats, MatchingConfig, SimilarityMetric};
pub use pool::{num_cpus, ResultStream, WorkerPool};
pub use pruning::{
    CardinalityEdgePruner, EntityIndex, PruneConfig, PruneStats, WeightingScheme,
};
pub use tokenizer::{word_set, TokenizerStrategy};
pub use topk::{NeighborMap, TopKAggregator, WeightedEdge};

pub use entwine_core::{
    Block, BlockIndex, EntityId, EntwineError, MergeStats, Partition, Record, RecordCollection,
    ResolutionKind, Result,
};
