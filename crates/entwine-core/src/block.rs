//! Blocks and the key-to-block inverted index.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::collection::{EntityId, ResolutionKind};
use crate::error::{EntwineError, Result};
use crate::merge::merge_keyed;

/// The set of entities sharing one blocking key.
///
/// `side1` holds global ids from the first collection, `side2` ids from the
/// second (always empty under Dirty resolution). A block only ever grows:
/// merging unions id sets, removal belongs to external cleaning stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    /// Global ids from the first collection.
    pub side1: BTreeSet<EntityId>,
    /// Global ids from the second collection (Clean-Clean only).
    pub side2: BTreeSet<EntityId>,
}

impl Block {
    /// Creates an empty block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of comparisons this block induces.
    ///
    /// Dirty resolution pairs `side1` entities among themselves; Clean-Clean
    /// resolution pairs each `side1` entity with each `side2` entity, never
    /// two entities of the same side.
    #[must_use]
    pub fn cardinality(&self, kind: ResolutionKind) -> u64 {
        match kind {
            ResolutionKind::Dirty => {
                let n = self.side1.len() as u64;
                n * n.saturating_sub(1) / 2
            }
            ResolutionKind::CleanClean => self.side1.len() as u64 * self.side2.len() as u64,
        }
    }

    /// Total number of entities in the block.
    #[must_use]
    pub fn size(&self) -> usize {
        self.side1.len() + self.side2.len()
    }
}

/// Unions two blocks, id set by id set.
///
/// Associative, commutative, and idempotent, which is what makes a merged
/// index independent of partition count and completion order.
#[must_use]
pub fn union(mut left: Block, right: Block) -> Block {
    left.side1.extend(right.side1);
    left.side2.extend(right.side2);
    left
}

/// Statistics reported by an index merge.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MergeStats {
    /// Keys in the target index before the merge.
    pub keys_before: usize,
    /// Keys installed because they were new to the target.
    pub keys_added: usize,
    /// Keys in the target index after the merge.
    pub keys_after: usize,
}

/// Inverted index from blocking key to block.
///
/// Tagged with the resolution kind it was built under. Merging validates
/// the tag once per incoming index, before any key is touched; the remaining
/// payload-shape confusions (say, a pruned neighbor structure where a token
/// index belongs) are unrepresentable in the type system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIndex {
    kind: ResolutionKind,
    blocks: HashMap<String, Block>,
}

impl BlockIndex {
    /// Creates an empty index for the given resolution kind.
    #[must_use]
    pub fn new(kind: ResolutionKind) -> Self {
        Self { kind, blocks: HashMap::new() }
    }

    /// Resolution kind this index was built under.
    #[must_use]
    pub fn kind(&self) -> ResolutionKind {
        self.kind
    }

    /// Number of distinct blocking keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if the index holds no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Block stored under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Block> {
        self.blocks.get(key)
    }

    /// Block stored under `key`, created empty on first access.
    pub fn entry(&mut self, key: String) -> &mut Block {
        self.blocks.entry(key).or_default()
    }

    /// Iterates keys and blocks in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Block)> {
        self.blocks.iter().map(|(key, block)| (key.as_str(), block))
    }

    /// Total comparisons induced across all blocks.
    #[must_use]
    pub fn total_cardinality(&self) -> u64 {
        self.blocks.values().map(|block| block.cardinality(self.kind)).sum()
    }

    /// Merges `incoming` into this index, unioning blocks key by key.
    ///
    /// The resolution-kind tags must agree; the check runs once, before the
    /// key loop begins.
    pub fn merge(&mut self, incoming: BlockIndex) -> Result<MergeStats> {
        if incoming.kind != self.kind {
            return Err(EntwineError::TypeMismatch {
                expected: format!("{} block index", self.kind),
                found: format!("{} block index", incoming.kind),
            });
        }
        let keys_before = self.blocks.len();
        merge_keyed(&mut self.blocks, incoming.blocks, union);
        let keys_after = self.blocks.len();
        Ok(MergeStats { keys_before, keys_added: keys_after - keys_before, keys_after })
    }
}
