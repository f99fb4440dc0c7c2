// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// This file is ONLY for types that are SHARED BETWEEN FILES, not types that only are used in one file.

use std::ops::Range;
use thiserror::Error;

/// The number of cause columns in the reference probability base.
pub const CAUSE_COUNT: usize = 70;

/// One of the three disjoint partitions of the cause columns.
///
/// The partition is fixed: every distribution produced by the engine is laid out
/// as pregnancy status, then medical causes, then circumstances of mortality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Block {
    /// Block A: mutually exclusive pregnancy states (3 columns).
    Pregnancy,
    /// Block B: medical causes of death (61 columns).
    Medical,
    /// Block C: circumstance of mortality categories (6 columns).
    Circumstance,
}

impl Block {
    pub const ALL: [Block; 3] = [Block::Pregnancy, Block::Medical, Block::Circumstance];

    /// The half-open range of cause columns covered by this block.
    #[inline]
    pub fn columns(self) -> Range<usize> {
        match self {
            Self::Pregnancy => 0..3,
            Self::Medical => 3..64,
            Self::Circumstance => 64..CAUSE_COUNT,
        }
    }

    #[inline]
    pub fn contains(self, column: usize) -> bool {
        self.columns().contains(&column)
    }
}

/// A single normalized answer to a verbal-autopsy indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Indicator {
    Yes,
    No,
    #[default]
    Missing,
}

impl Indicator {
    #[inline(always)]
    pub fn is_yes(self) -> bool {
        matches!(self, Self::Yes)
    }

    /// The symbol used when a checked record is written back to disk. It is
    /// accepted unchanged by [`crate::normalize::normalize_symbol`].
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Yes => "y",
            Self::No => "n",
            Self::Missing => "",
        }
    }
}

/// A normalized verbal-autopsy record.
///
/// `values` is aligned with the probability base rows: position 0 corresponds to the
/// identifier column of the raw table and never carries evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: String,
    pub values: Vec<Indicator>,
}

impl Record {
    pub fn new(id: impl Into<String>, values: Vec<Indicator>) -> Self {
        Self {
            id: id.into(),
            values,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn get(&self, position: usize) -> Indicator {
        self.values.get(position).copied().unwrap_or_default()
    }

    /// Counts "yes" answers inside `range`. Positions past the end of the record count
    /// as not answered.
    pub fn count_yes(&self, range: Range<usize>) -> usize {
        let end = range.end.min(self.values.len());
        let start = range.start.min(end);
        self.values[start..end].iter().filter(|v| v.is_yes()).count()
    }
}

/// An index into the cause columns of the probability base (0..70 in the
/// reference layout). Distinct from symptom row indices at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct CauseIndex(pub usize);

/// A record or probability base whose dimensions do not match what the consumer expects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{what} has {found} entries, expected {expected}")]
pub struct ShapeError {
    pub what: &'static str,
    pub expected: usize,
    pub found: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_partition_the_cause_columns() {
        let mut covered = vec![0usize; CAUSE_COUNT];
        for block in Block::ALL {
            for column in block.columns() {
                covered[column] += 1;
            }
        }
        assert!(covered.iter().all(|&count| count == 1));
        assert_eq!(Block::Pregnancy.columns().len(), 3);
        assert_eq!(Block::Medical.columns().len(), 61);
        assert_eq!(Block::Circumstance.columns().len(), 6);
        assert!(Block::Medical.contains(3));
        assert!(!Block::Medical.contains(64));
    }

    #[test]
    fn count_yes_clamps_to_record_length() {
        let record = Record::new(
            "r1",
            vec![Indicator::No, Indicator::Yes, Indicator::Missing, Indicator::Yes],
        );
        assert_eq!(record.count_yes(0..4), 2);
        assert_eq!(record.count_yes(2..10), 1);
        assert_eq!(record.count_yes(8..10), 0);
        assert_eq!(record.get(9), Indicator::Missing);
    }
}
