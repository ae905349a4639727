//! Contiguous range partitioning for parallel work distribution.

/// A contiguous half-open range of entity ids, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    /// First id in the range.
    pub start: usize,
    /// One past the last id in the range.
    pub end: usize,
}

impl Partition {
    /// Number of ids covered by this partition.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns `true` if the partition covers no ids.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Iterator over the ids in this partition.
    #[must_use]
    pub fn ids(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

/// Splits `[0, n)` into `k` contiguous ranges.
///
/// The first `n % k` ranges hold `n / k + 1` ids and the rest hold `n / k`,
/// so range sizes differ by at most one with the larger ranges first, and
/// the concatenation of all ranges tiles `[0, n)` in order. `k = 0` yields
/// an empty sequence; `n = 0` yields `k` empty ranges.
#[must_use]
pub fn partition(n: usize, k: usize) -> Vec<Partition> {
    if k == 0 {
        return Vec::new();
    }
    let base = n / k;
    let mut remainder = n % k;
    let mut ranges = Vec::with_capacity(k);
    let mut start = 0;
    for _ in 0..k {
        let mut end = start + base;
        if remainder > 0 {
            end += 1;
            remainder -= 1;
        }
        end = end.min(n);
        ranges.push(Partition { start, end });
        start = end;
    }
    ranges
}
