//! Per-record medical cause listings.
//!
//! Unlike the three-cause summary produced by the engine, a listing applies no minimum
//! to the leading cause: the top medical cause is always named. Later ranks are blanked
//! when they fall below half of the leading mass.

use crate::engine::{CauseDistribution, SECONDARY_RATIO, VaResult, ranked_medical};
use crate::types::{Block, CauseIndex};

/// Shape of the individual cause listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndividualListingOptions {
    /// Number of ranked causes per record; 0 lists every medical cause mass instead.
    pub top: usize,
    /// Write each ranked cause's mass next to it.
    pub propensities: bool,
    pub groupcode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Propensity {
    pub cause: CauseIndex,
    pub mass: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndividualCauses {
    /// Every medical cause mass, in column order.
    Full(Vec<f64>),
    /// The leading medical causes; `None` marks a blanked rank.
    Ranked(Vec<Option<Propensity>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndividualRow {
    pub id: String,
    pub causes: IndividualCauses,
}

/// Ranks the medical causes of one distribution. `top == 0` returns every mass.
pub fn rank_individual_causes(distribution: &CauseDistribution, top: usize) -> IndividualCauses {
    if top == 0 {
        return IndividualCauses::Full(distribution.block(Block::Medical).to_vec());
    }

    let ranked = ranked_medical(distribution, top);
    let max = ranked.first().map_or(0.0, |&(_, mass)| mass);
    IndividualCauses::Ranked(
        ranked
            .into_iter()
            .enumerate()
            .map(|(rank, (cause, mass))| {
                (rank == 0 || mass >= SECONDARY_RATIO * max).then_some(Propensity { cause, mass })
            })
            .collect(),
    )
}

/// Lists the medical causes of every scored record, in result order.
pub fn individual_causes(results: &[VaResult], top: usize) -> Vec<IndividualRow> {
    results
        .iter()
        .map(|result| IndividualRow {
            id: result.id.clone(),
            causes: rank_individual_causes(&result.distribution, top),
        })
        .collect()
}
