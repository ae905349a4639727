//! Keyed merging of partition-local results.

use std::collections::HashMap;
use std::hash::Hash;

/// Folds `incoming` into `global`, key by key.
///
/// New keys install their value unchanged; existing keys are combined
/// through `combine`. The combinator is a pure `(V, V) -> V` supplied by the
/// caller per structure kind (block union, weight reconciliation), so every
/// stage merges through this one code path. When `combine` is associative,
/// commutative, and idempotent, the folded result is independent of how
/// the incoming maps were partitioned and of their arrival order.
pub fn merge_keyed<K, V, F>(global: &mut HashMap<K, V>, incoming: HashMap<K, V>, combine: F)
where
    K: Eq + Hash,
    F: Fn(V, V) -> V,
{
    for (key, value) in incoming {
        let merged = match global.remove(&key) {
            Some(current) => combine(current, value),
            None => value,
        };
        global.insert(key, merged);
    }
}
