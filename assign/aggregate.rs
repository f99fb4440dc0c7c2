// ========================================================================================
//
//                   Population cause-specific mortality fractions
//
// ========================================================================================
//
// Each individual distribution contributes only the causes the engine would plausibly
// report for it: masses below an adaptive cutoff are moved into an "Undetermined" bucket,
// as is the whole distribution of a record with no clear leading cause. The surviving
// masses are summed in record order, so a run always produces the same fractions.

use crate::causes::CauseCatalog;
use crate::engine::{CAUSE_THRESHOLD, CauseDistribution};
use crate::types::{Block, CAUSE_COUNT, CauseIndex};
use ndarray::{Array1, s};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;

/// Relative tolerance under which two fractions at the reporting boundary count as tied.
pub const TIE_TOLERANCE: f64 = 1e-7;
/// Fraction of the leading mass below which a cause is treated as noise.
pub const CUTOFF_RATIO: f64 = 0.5;
pub const UNDETERMINED_LABEL: &str = "Undetermined";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Cannot compute cause-specific mortality fractions: no cause distributions were supplied.")]
pub struct EmptyInputError;

/// Which cause columns take part in the population fractions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CsmfScope {
    /// Block B only.
    #[default]
    MedicalOnly,
    /// All 70 columns.
    AllBlocks,
}

impl CsmfScope {
    pub fn columns(self) -> Range<usize> {
        match self {
            Self::MedicalOnly => Block::Medical.columns(),
            Self::AllBlocks => 0..CAUSE_COUNT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsmfOptions {
    pub top: usize,
    pub scope: CsmfScope,
    /// Prefix medical cause labels with their group code.
    pub groupcode: bool,
}

impl Default for CsmfOptions {
    fn default() -> Self {
        Self {
            top: crate::config::DEFAULT_CSMF_TOP,
            scope: CsmfScope::MedicalOnly,
            groupcode: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsmfCategory {
    Cause(CauseIndex),
    Undetermined,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CsmfEntry {
    pub category: CsmfCategory,
    pub label: String,
    pub fraction: f64,
}

/// The finished population distribution, ranked by descending fraction.
#[derive(Debug, Clone, PartialEq)]
pub struct Csmf {
    ranked: Vec<CsmfEntry>,
    shown: usize,
}

impl Csmf {
    /// The entries selected for reporting.
    pub fn top(&self) -> &[CsmfEntry] {
        &self.ranked[..self.shown]
    }

    /// Every entry, including those past the reporting boundary.
    pub fn all(&self) -> &[CsmfEntry] {
        &self.ranked
    }

    pub fn fraction(&self, label: &str) -> Option<f64> {
        self.ranked
            .iter()
            .find(|entry| entry.label == label)
            .map(|entry| entry.fraction)
    }

    pub fn undetermined(&self) -> f64 {
        self.ranked
            .iter()
            .find(|entry| entry.category == CsmfCategory::Undetermined)
            .map_or(0.0, |entry| entry.fraction)
    }
}

/// The mass below which an individual cause is moved to the undetermined bucket.
///
/// With `c1 >= c2 >= c3` the three largest values (absent ranks count as zero), this is
/// `min(max(c1 / 2, c3), max(c1 / 2, c2))`.
pub fn adaptive_cutoff(values: &[f64]) -> f64 {
    let mut top = [0.0f64; 3];
    for &value in values {
        if value > top[0] {
            top = [value, top[0], top[1]];
        } else if value > top[1] {
            top = [top[0], value, top[1]];
        } else if value > top[2] {
            top[2] = value;
        }
    }
    let [c1, c2, c3] = top;
    let half = c1 * CUTOFF_RATIO;
    half.max(c3).min(half.max(c2))
}

/// How many entries of a descending list are reported for a requested `top`.
///
/// Positive entries are taken up to `top`. When exactly `top` were taken, further entries
/// are added while each is within [`TIE_TOLERANCE`] of the one before it.
pub fn boundary_count(fractions: &[f64], top: usize) -> usize {
    let mut shown = 0;
    while shown < fractions.len() && shown < top && fractions[shown] > 0.0 {
        shown += 1;
    }
    if shown == top && shown > 0 {
        while shown < fractions.len() {
            let (a, b) = (fractions[shown], fractions[shown - 1]);
            if (a - b).abs() < (a + b) * TIE_TOLERANCE {
                shown += 1;
            } else {
                break;
            }
        }
    }
    shown
}

/// Sums individual distributions one at a time, in the order they are added.
#[derive(Debug, Clone)]
pub struct CsmfAccumulator {
    scope: CsmfScope,
    dist: Array1<f64>,
    undetermined: f64,
    catalog: Option<Arc<CauseCatalog>>,
}

impl CsmfAccumulator {
    pub fn new(scope: CsmfScope) -> Self {
        Self {
            scope,
            dist: Array1::zeros(scope.columns().len()),
            undetermined: 0.0,
            catalog: None,
        }
    }

    pub fn add(&mut self, distribution: &CauseDistribution) {
        if self.catalog.is_none() {
            self.catalog = Some(Arc::clone(distribution.catalog()));
        }

        let mut values = distribution.masses().slice(s![self.scope.columns()]).to_owned();
        let max = values.iter().copied().fold(0.0f64, f64::max);
        if max < CAUSE_THRESHOLD {
            let total = values.sum();
            self.undetermined += if total == 0.0 { 1.0 } else { total };
            return;
        }

        let cutoff = adaptive_cutoff(values.as_slice().unwrap_or(&[]));
        for value in values.iter_mut() {
            if *value < cutoff {
                self.undetermined += *value;
                *value = 0.0;
            }
        }
        self.dist += &values;
    }

    pub fn finish(self, options: &CsmfOptions) -> Result<Csmf, EmptyInputError> {
        let catalog = self.catalog.ok_or(EmptyInputError)?;
        let offset = self.scope.columns().start;

        let mut ranked: Vec<CsmfEntry> = self
            .dist
            .iter()
            .enumerate()
            .map(|(pos, &mass)| {
                let cause = CauseIndex(offset + pos);
                CsmfEntry {
                    category: CsmfCategory::Cause(cause),
                    label: catalog.label(cause, options.groupcode),
                    fraction: mass,
                }
            })
            .collect();
        if self.undetermined > 0.0 {
            ranked.push(CsmfEntry {
                category: CsmfCategory::Undetermined,
                label: UNDETERMINED_LABEL.to_string(),
                fraction: self.undetermined,
            });
        }

        let total: f64 = ranked.iter().map(|entry| entry.fraction).sum();
        for entry in ranked.iter_mut() {
            entry.fraction = if total > 0.0 { entry.fraction / total } else { 0.0 };
        }
        // Stable, so equal fractions keep catalogue order with the undetermined bucket last.
        ranked.sort_by(|a, b| b.fraction.total_cmp(&a.fraction));

        let fractions: Vec<f64> = ranked.iter().map(|entry| entry.fraction).collect();
        let shown = boundary_count(&fractions, options.top);
        Ok(Csmf { ranked, shown })
    }
}

/// Aggregates individual distributions into population fractions. Absent distributions
/// (records that were excluded) are skipped.
pub fn aggregate<'a, I>(distributions: I, options: &CsmfOptions) -> Result<Csmf, EmptyInputError>
where
    I: IntoIterator<Item = Option<&'a CauseDistribution>>,
{
    let mut accumulator = CsmfAccumulator::new(options.scope);
    for distribution in distributions.into_iter().flatten() {
        accumulator.add(distribution);
    }
    accumulator.finish(options)
}
