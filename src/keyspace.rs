//! Keyspace partitioning
//!
//! The search space is an ordered range of integer candidates. The
//! coordinator carves it into contiguous blocks (one per assignment), and
//! each worker further splits its block into per-unit sub-ranges. All
//! ranges here are inclusive on both ends so that a block's coverage is
//! exact and never overlaps its neighbours.

use serde::{Deserialize, Serialize};

/// The overall search space, fixed at coordinator startup
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SearchSpace {
    /// First candidate (inclusive)
    pub lower_bound: u64,
    /// Last candidate (inclusive)
    pub upper_bound: u64,
    /// Candidates handed to one local execution unit per assignment
    pub block_size_per_unit: u64,
}

impl SearchSpace {
    /// Validate the space before the coordinator starts serving it
    pub fn validate(&self) -> crate::Result<()> {
        if self.lower_bound > self.upper_bound {
            anyhow::bail!(
                "start number {} exceeds end number {}",
                self.lower_bound,
                self.upper_bound
            );
        }
        // The cursor must be able to advance one past the upper bound.
        if self.upper_bound == u64::MAX {
            anyhow::bail!("end number must be less than {}", u64::MAX);
        }
        if self.block_size_per_unit == 0 {
            anyhow::bail!("block size per unit must be at least 1");
        }
        Ok(())
    }

    /// Assignment size for a worker with the given declared parallelism
    ///
    /// Scales linearly so one coordinator round-trip keeps all of a
    /// worker's local units busy for a comparable duration.
    pub fn block_size_for(&self, parallelism: u32) -> u64 {
        self.block_size_per_unit
            .saturating_mul(parallelism.max(1) as u64)
    }
}

/// A contiguous inclusive range of candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "BlockRange requires start <= end");
        Self { start, end }
    }

    /// Number of candidates covered by this range
    pub fn count(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Carve up to `n` candidates off the front (`n` must be at least 1)
    ///
    /// Returns the carved head and the remainder, if any.
    pub fn take_front(self, n: u64) -> (BlockRange, Option<BlockRange>) {
        debug_assert!(n >= 1, "take_front requires n >= 1");
        if n >= self.count() {
            return (self, None);
        }
        let head_end = self.start + n - 1;
        (
            BlockRange::new(self.start, head_end),
            Some(BlockRange::new(head_end + 1, self.end)),
        )
    }

    /// Split into at most `parts` contiguous near-equal sub-ranges
    ///
    /// Coverage is exact and non-overlapping; the last sub-range absorbs
    /// any remainder. When the range holds fewer candidates than `parts`,
    /// fewer sub-ranges are produced so none is ever empty.
    pub fn split(self, parts: usize) -> Vec<BlockRange> {
        let parts = (parts.max(1) as u64).min(self.count());
        let per = self.count() / parts;
        (0..parts)
            .map(|i| {
                let start = self.start + i * per;
                let end = if i == parts - 1 {
                    self.end
                } else {
                    start + per - 1
                };
                BlockRange::new(start, end)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_even() {
        let subs = BlockRange::new(0, 99).split(4);
        assert_eq!(
            subs,
            vec![
                BlockRange::new(0, 24),
                BlockRange::new(25, 49),
                BlockRange::new(50, 74),
                BlockRange::new(75, 99),
            ]
        );
    }

    #[test]
    fn test_split_last_absorbs_remainder() {
        let subs = BlockRange::new(0, 100).split(4);
        assert_eq!(subs.len(), 4);
        assert_eq!(subs[3], BlockRange::new(75, 100));

        // Exact, gapless coverage
        let total: u64 = subs.iter().map(|s| s.count()).sum();
        assert_eq!(total, 101);
        for pair in subs.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start);
        }
    }

    #[test]
    fn test_split_fewer_candidates_than_parts() {
        let subs = BlockRange::new(10, 12).split(8);
        assert_eq!(
            subs,
            vec![
                BlockRange::new(10, 10),
                BlockRange::new(11, 11),
                BlockRange::new(12, 12),
            ]
        );
    }

    #[test]
    fn test_split_single_part() {
        assert_eq!(BlockRange::new(5, 50).split(1), vec![BlockRange::new(5, 50)]);
    }

    #[test]
    fn test_take_front_splits() {
        let (head, rest) = BlockRange::new(1000, 1999).take_front(250);
        assert_eq!(head, BlockRange::new(1000, 1249));
        assert_eq!(rest, Some(BlockRange::new(1250, 1999)));
    }

    #[test]
    fn test_take_front_consumes_whole_range() {
        let (head, rest) = BlockRange::new(0, 9).take_front(10);
        assert_eq!(head, BlockRange::new(0, 9));
        assert_eq!(rest, None);

        let (head, rest) = BlockRange::new(0, 9).take_front(500);
        assert_eq!(head, BlockRange::new(0, 9));
        assert_eq!(rest, None);
    }

    #[test]
    fn test_block_size_scales_with_parallelism() {
        let space = SearchSpace {
            lower_bound: 0,
            upper_bound: 9_999_999_999,
            block_size_per_unit: 200_000,
        };
        assert_eq!(space.block_size_for(1), 200_000);
        assert_eq!(space.block_size_for(8), 1_600_000);
        // A zero declaration is clamped, never a zero-sized block
        assert_eq!(space.block_size_for(0), 200_000);
    }

    #[test]
    fn test_space_validation() {
        let mut space = SearchSpace {
            lower_bound: 10,
            upper_bound: 5,
            block_size_per_unit: 100,
        };
        assert!(space.validate().is_err());

        space.upper_bound = 20;
        assert!(space.validate().is_ok());

        space.block_size_per_unit = 0;
        assert!(space.validate().is_err());
    }
}
