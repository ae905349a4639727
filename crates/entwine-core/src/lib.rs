//! Core types for the entwine entity-resolution engine.
//!
//! This crate holds the pieces every stage of a blocking pipeline shares:
//! record collections with their global id space, blocks and the inverted
//! block index, contiguous range partitioning, the generic keyed-merge fold,
//! and the error taxonomy.
//!
//! # Modules
//!
//! - [`collection`]: records, Dirty/Clean-Clean collections, id mappings
//! - [`block`]: blocks and the key-to-block index
//! - [`partition`]: splitting an id range into contiguous partitions
//! - [`merge`]: folding partition-local maps with a supplied combinator
//! - [`error`]: error and result types

pub mod block;
pub mod collection;
pub mod error;
pub mod merge;
pub mod partition;

pub use block::{Block, BlockIndex, MergeStats};
pub use collection::{EntityId, Record, RecordCollection, ResolutionKind};
pub use error::{EntwineError, Result};
pub use merge::merge_keyed;
pub use partition::{partition, Partition};
