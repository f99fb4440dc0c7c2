//! Fixtures shared by the integration tests: a synthetic probability base with the
//! standard 354-indicator layout and a builder for answer records.

use interva::causes::CauseCatalog;
use interva::engine::InferenceEngine;
use interva::normalize::IndicatorLayout;
use interva::probbase::{METADATA_COLUMNS, ProbabilityBase};
use interva::types::{CAUSE_COUNT, CauseIndex, Indicator, Record};
use ndarray::Array2;
use std::sync::Arc;

pub const INDICATORS: usize = 354;
pub const LAST_INDICATOR_NAME: &str = "i459o";

/// Position of a symptom whose likelihood row stays neutral in every fixture.
pub const NEUTRAL_SYMPTOM: usize = 327;
pub const MALE: usize = 3;
pub const FEMALE: usize = 4;
pub const ADULT: usize = 5;
pub const REPRODUCTIVE_AGE: usize = 17;

/// Builds probability bases where every indicator is neutral unless told otherwise.
///
/// The prior is 0.6/0.3/0.1 over the pregnancy block and uniform over the medical and
/// circumstance blocks. Every indicator counts as evidence when answered yes.
#[derive(Clone)]
pub struct BaseBuilder {
    likelihoods: Array2<f64>,
    evidence: Vec<Option<Indicator>>,
    names: Vec<String>,
}

impl BaseBuilder {
    pub fn neutral() -> Self {
        let mut likelihoods = Array2::from_elem((INDICATORS, CAUSE_COUNT), 1.0);
        let mut prior = likelihoods.row_mut(0);
        prior[0] = 0.6;
        prior[1] = 0.3;
        prior[2] = 0.1;
        for c in 3..64 {
            prior[c] = 1.0 / 61.0;
        }
        for c in 64..70 {
            prior[c] = 1.0 / 6.0;
        }

        let mut evidence = vec![Some(Indicator::Yes); INDICATORS];
        evidence[0] = None;

        let mut names: Vec<String> = (0..INDICATORS).map(|i| format!("i{i:03}a")).collect();
        names[0] = "ID".to_string();
        names[INDICATORS - 1] = LAST_INDICATOR_NAME.to_string();

        Self {
            likelihoods,
            evidence,
            names,
        }
    }

    /// Sets the likelihood of `indicator` for the listed causes.
    pub fn weights(mut self, indicator: usize, weights: &[(usize, f64)]) -> Self {
        for &(cause, weight) in weights {
            self.likelihoods[[indicator, cause]] = weight;
        }
        self
    }

    /// Zeroes every medical likelihood of `indicator` except the listed ones.
    pub fn medical_only(mut self, indicator: usize, weights: &[(usize, f64)]) -> Self {
        for cause in 3..64 {
            self.likelihoods[[indicator, cause]] = 0.0;
        }
        self.weights(indicator, weights)
    }

    pub fn evidence(mut self, indicator: usize, answer: Option<Indicator>) -> Self {
        self.evidence[indicator] = answer;
        self
    }

    pub fn prior(mut self, cause: usize, value: f64) -> Self {
        self.likelihoods[[0, cause]] = value;
        self
    }

    pub fn build(self) -> ProbabilityBase {
        ProbabilityBase::from_parts(
            "test-1",
            self.names,
            self.evidence,
            self.likelihoods,
            CauseCatalog::standard(),
        )
        .unwrap()
    }

    /// The same base in its CSV file form.
    pub fn to_csv(&self) -> String {
        let catalog = CauseCatalog::standard();
        let mut header: Vec<String> = (0..METADATA_COLUMNS).map(|i| format!("meta{i}")).collect();
        header[0] = "indic".to_string();
        header[2] = "version".to_string();
        header[5] = "subst".to_string();
        header.extend((0..CAUSE_COUNT).map(|c| catalog.code(CauseIndex(c)).to_string()));

        let mut lines = vec![header.join(",")];
        for (row, values) in self.likelihoods.rows().into_iter().enumerate() {
            let mut cells = vec![String::new(); METADATA_COLUMNS];
            cells[0] = self.names[row].clone();
            cells[2] = "test-1".to_string();
            cells[5] = match self.evidence[row] {
                Some(Indicator::Yes) => "Y".to_string(),
                Some(Indicator::No) => "N".to_string(),
                _ => String::new(),
            };
            cells.extend(values.iter().map(|v| v.to_string()));
            lines.push(cells.join(","));
        }
        lines.join("\n") + "\n"
    }
}

pub fn engine(base: ProbabilityBase) -> InferenceEngine {
    let base = Arc::new(base);
    let prior = base.base_prior();
    InferenceEngine::new(base, prior, IndicatorLayout::interva5()).unwrap()
}

/// Builds answer records. Unset indicators are answered "no".
#[derive(Clone)]
pub struct RecordBuilder {
    id: String,
    values: Vec<Indicator>,
}

impl RecordBuilder {
    /// An adult male with one neutral symptom: admitted, and uninformative.
    pub fn admitted(id: &str) -> Self {
        Self {
            id: id.to_string(),
            values: vec![Indicator::No; INDICATORS],
        }
        .yes(MALE)
        .yes(ADULT)
        .yes(NEUTRAL_SYMPTOM)
    }

    pub fn yes(self, position: usize) -> Self {
        self.set(position, Indicator::Yes)
    }

    pub fn no(self, position: usize) -> Self {
        self.set(position, Indicator::No)
    }

    pub fn missing(self, position: usize) -> Self {
        self.set(position, Indicator::Missing)
    }

    pub fn female(self) -> Self {
        self.no(MALE).yes(FEMALE)
    }

    pub fn reproductive_female(self) -> Self {
        self.female().yes(REPRODUCTIVE_AGE)
    }

    fn set(mut self, position: usize, answer: Indicator) -> Self {
        self.values[position] = answer;
        self
    }

    pub fn build(self) -> Record {
        Record::new(self.id, self.values)
    }

    /// The raw CSV cells of this record, identifier first.
    pub fn cells(&self) -> Vec<String> {
        let mut cells: Vec<String> = self.values.iter().map(|v| v.symbol().to_string()).collect();
        cells[0] = self.id.clone();
        cells
    }
}

/// Column names of an input table matching [`BaseBuilder::neutral`].
pub fn input_columns() -> Vec<String> {
    let mut names: Vec<String> = (0..INDICATORS).map(|i| format!("i{i:03}a")).collect();
    names[0] = "ID".to_string();
    names[INDICATORS - 1] = LAST_INDICATOR_NAME.to_string();
    names
}

/// Renders records as an input table in CSV form.
pub fn input_csv(records: &[RecordBuilder]) -> String {
    let mut lines = vec![input_columns().join(",")];
    lines.extend(records.iter().map(|r| r.cells().join(",")));
    lines.join("\n") + "\n"
}
