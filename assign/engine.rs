// ========================================================================================
//
//                           The cause inference engine
//
// ========================================================================================
//
// Scoring a record is a pure function of the record, the probability base and the prior.
// The posterior starts as the prior; every triggered symptom multiplies in its likelihood
// row, after which each block with positive mass is rescaled to sum to one. The staged
// rescaling keeps long runs of small likelihoods from underflowing to zero.
//
// The engine holds only shared, read-only state, so `infer` can be called from any number
// of worker threads at once.

use crate::causes::CauseCatalog;
use crate::config::ConfigError;
use crate::normalize::IndicatorLayout;
use crate::probbase::{Prior, ProbabilityBase};
use crate::types::{Block, CAUSE_COUNT, CauseIndex, Record, ShapeError};
use ndarray::{Array1, ArrayView1, s};
use std::fmt;
use std::sync::Arc;

/// Below this maximum the pregnancy status is indeterminate.
pub const PREGNANCY_THRESHOLD: f64 = 0.1;
/// Below this maximum no medical cause is reported.
pub const CAUSE_THRESHOLD: f64 = 0.4;
/// Secondary causes are reported only at or above this fraction of the leading mass.
pub const SECONDARY_RATIO: f64 = 0.5;
/// Below this maximum the circumstance of mortality is reported as "Multiple".
pub const CIRCUMSTANCE_THRESHOLD: f64 = 0.5;

/// Converts a probability to a whole percentage, rounding halves to even.
#[inline]
pub fn percent(probability: f64) -> u32 {
    (probability * 100.0).round_ties_even().max(0.0) as u32
}

/// The first index holding the maximum value. Earlier indices win ties.
pub(crate) fn first_argmax(values: ArrayView1<'_, f64>) -> Option<(usize, f64)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (idx, value)| match best {
            Some((_, current)) if value <= current => best,
            _ => Some((idx, value)),
        })
}

/// Block B columns in descending mass order, up to `count`, taking the lowest index on ties.
pub(crate) fn ranked_medical(distribution: &CauseDistribution, count: usize) -> Vec<(CauseIndex, f64)> {
    let offset = Block::Medical.columns().start;
    let mut remaining: Vec<(usize, f64)> = distribution
        .block(Block::Medical)
        .iter()
        .copied()
        .enumerate()
        .collect();
    let mut ranked = Vec::with_capacity(count.min(remaining.len()));
    while ranked.len() < count && !remaining.is_empty() {
        let mut best = 0;
        for (pos, &(_, mass)) in remaining.iter().enumerate().skip(1) {
            if mass > remaining[best].1 {
                best = pos;
            }
        }
        let (idx, mass) = remaining.remove(best);
        ranked.push((CauseIndex(idx + offset), mass));
    }
    ranked
}

// ========================================================================================
//                                   Result types
// ========================================================================================

/// The full 70-cause posterior for one record.
///
/// The catalogue is shared with every other distribution of the run, so cloning a
/// distribution copies only the masses.
#[derive(Debug, Clone)]
pub struct CauseDistribution {
    masses: Array1<f64>,
    catalog: Arc<CauseCatalog>,
}

impl CauseDistribution {
    pub fn new(masses: Array1<f64>, catalog: Arc<CauseCatalog>) -> Result<Self, ShapeError> {
        if masses.len() != CAUSE_COUNT {
            return Err(ShapeError {
                what: "cause distribution",
                expected: CAUSE_COUNT,
                found: masses.len(),
            });
        }
        if catalog.len() != CAUSE_COUNT {
            return Err(ShapeError {
                what: "cause catalogue",
                expected: CAUSE_COUNT,
                found: catalog.len(),
            });
        }
        Ok(Self { masses, catalog })
    }

    #[inline]
    pub fn masses(&self) -> ArrayView1<'_, f64> {
        self.masses.view()
    }

    #[inline]
    pub fn mass(&self, cause: CauseIndex) -> f64 {
        self.masses[cause.0]
    }

    #[inline]
    pub fn block(&self, block: Block) -> ArrayView1<'_, f64> {
        self.masses.slice(s![block.columns()])
    }

    pub fn block_sum(&self, block: Block) -> f64 {
        self.block(block).sum()
    }

    pub fn catalog(&self) -> &Arc<CauseCatalog> {
        &self.catalog
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PregnancyStatus {
    /// The record is not a reproductive-age female.
    NotApplicable,
    /// No pregnancy state reaches [`PREGNANCY_THRESHOLD`].
    Indeterminate,
    Assigned { cause: CauseIndex, likelihood: u32 },
}

impl PregnancyStatus {
    /// The text written to the `PREGSTAT` column.
    pub fn label(&self, catalog: &CauseCatalog) -> String {
        match self {
            Self::NotApplicable => "n/a".to_string(),
            Self::Indeterminate => "indeterminate".to_string(),
            Self::Assigned { cause, .. } => catalog.name(*cause).to_string(),
        }
    }

    pub fn likelihood(&self) -> Option<u32> {
        match self {
            Self::Assigned { likelihood, .. } => Some(*likelihood),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankedCause {
    pub cause: CauseIndex,
    pub likelihood: u32,
}

/// Up to three medical causes with their percentages, plus the unassigned remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CauseAssignment {
    pub ranked: [Option<RankedCause>; 3],
    pub indeterminate: u32,
}

impl CauseAssignment {
    pub fn primary(&self) -> Option<RankedCause> {
        self.ranked[0]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Circumstance {
    /// No category reaches [`CIRCUMSTANCE_THRESHOLD`].
    Multiple,
    Assigned { cause: CauseIndex, score: u32 },
}

impl Circumstance {
    pub fn label(&self, catalog: &CauseCatalog) -> String {
        match self {
            Self::Multiple => "Multiple".to_string(),
            Self::Assigned { cause, .. } => catalog.name(*cause).to_string(),
        }
    }

    pub fn score(&self) -> Option<u32> {
        match self {
            Self::Assigned { score, .. } => Some(*score),
            Self::Multiple => None,
        }
    }
}

/// Everything the engine concludes about one record.
#[derive(Debug, Clone)]
pub struct VaResult {
    pub id: String,
    pub pregnancy: PregnancyStatus,
    pub causes: CauseAssignment,
    pub circumstance: Circumstance,
    pub distribution: CauseDistribution,
}

impl fmt::Display for VaResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let catalog = self.distribution.catalog();
        write!(f, "{}: ", self.id)?;
        match self.causes.primary() {
            Some(primary) => write!(
                f,
                "{} ({}%)",
                catalog.name(primary.cause),
                primary.likelihood
            )?,
            None => f.write_str("indeterminate")?,
        }
        write!(f, ", circumstance {}", self.circumstance.label(catalog))
    }
}

// ========================================================================================
//                                    The engine
// ========================================================================================

pub struct InferenceEngine {
    base: Arc<ProbabilityBase>,
    prior: Prior,
    layout: IndicatorLayout,
}

impl InferenceEngine {
    pub fn new(
        base: Arc<ProbabilityBase>,
        prior: Prior,
        layout: IndicatorLayout,
    ) -> Result<Self, ConfigError> {
        layout.validate(base.num_indicators())?;
        Ok(Self {
            base,
            prior,
            layout,
        })
    }

    pub fn base(&self) -> &Arc<ProbabilityBase> {
        &self.base
    }

    pub fn prior(&self) -> &Prior {
        &self.prior
    }

    pub fn layout(&self) -> &IndicatorLayout {
        &self.layout
    }

    /// Computes the posterior over all 70 causes, with Block C rescaled to sum to one
    /// whenever it carries any mass.
    pub fn posterior(&self, record: &Record) -> Result<CauseDistribution, ShapeError> {
        let expected = self.base.num_indicators();
        if record.len() != expected {
            return Err(ShapeError {
                what: "record",
                expected,
                found: record.len(),
            });
        }

        let mut prob = self.prior.values().to_owned();
        for (position, answer) in record.values.iter().enumerate().skip(1) {
            // Missing answers never equal an evidence answer, which is always yes or no.
            if self.base.evidence_answer(position) == Some(*answer) {
                prob *= &self.base.row(position);
                renormalize_blocks(&mut prob);
            }
        }
        rescale(&mut prob, Block::Circumstance);

        CauseDistribution::new(prob, Arc::clone(self.base.catalog()))
    }

    /// Scores one record.
    pub fn infer(&self, record: &Record) -> Result<VaResult, ShapeError> {
        let distribution = self.posterior(record)?;

        let pregnancy = if self.layout.is_reproductive_female(record) {
            assess_pregnancy(distribution.block(Block::Pregnancy))
        } else {
            PregnancyStatus::NotApplicable
        };
        let causes = assign_causes(&distribution);
        let circumstance = assess_circumstance(distribution.block(Block::Circumstance));

        Ok(VaResult {
            id: record.id.clone(),
            pregnancy,
            causes,
            circumstance,
            distribution,
        })
    }
}

fn rescale(prob: &mut Array1<f64>, block: Block) {
    let mut view = prob.slice_mut(s![block.columns()]);
    let total = view.sum();
    if total > 0.0 {
        view /= total;
    }
}

fn renormalize_blocks(prob: &mut Array1<f64>) {
    for block in Block::ALL {
        rescale(prob, block);
    }
}

fn assess_pregnancy(prob_a: ArrayView1<'_, f64>) -> PregnancyStatus {
    match first_argmax(prob_a) {
        Some((idx, max)) if max >= PREGNANCY_THRESHOLD => PregnancyStatus::Assigned {
            cause: CauseIndex(Block::Pregnancy.columns().start + idx),
            likelihood: percent(max / prob_a.sum()),
        },
        _ => PregnancyStatus::Indeterminate,
    }
}

fn assign_causes(distribution: &CauseDistribution) -> CauseAssignment {
    let max = first_argmax(distribution.block(Block::Medical)).map_or(0.0, |(_, max)| max);
    if max < CAUSE_THRESHOLD {
        return CauseAssignment {
            ranked: [None; 3],
            indeterminate: 100,
        };
    }

    let mut ranked = [None; 3];
    for (slot, (rank, (cause, mass))) in ranked
        .iter_mut()
        .zip(ranked_medical(distribution, 3).into_iter().enumerate())
    {
        if rank == 0 || mass >= SECONDARY_RATIO * max {
            *slot = Some(RankedCause {
                cause,
                likelihood: percent(mass),
            });
        }
    }
    let assigned: u32 = ranked.iter().flatten().map(|r| r.likelihood).sum();

    CauseAssignment {
        ranked,
        indeterminate: 100u32.saturating_sub(assigned),
    }
}

fn assess_circumstance(prob_c: ArrayView1<'_, f64>) -> Circumstance {
    match first_argmax(prob_c) {
        Some((idx, max)) if max >= CIRCUMSTANCE_THRESHOLD => Circumstance::Assigned {
            cause: CauseIndex(Block::Circumstance.columns().start + idx),
            score: percent(max),
        },
        _ => Circumstance::Multiple,
    }
}
