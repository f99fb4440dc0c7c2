// ========================================================================================
//
//                        The probability base: loading and priors
//
// ========================================================================================
//
// The probability base is a static table of symptom-by-cause likelihood weights. Each data
// row carries 17 metadata columns followed by one qualitative strength code per cause.
// Row 0 is special: its cause cells hold the numeric prior rather than a strength code.
// Everything here runs once per process, before any record is scored.

use crate::causes::CauseCatalog;
use crate::config::PrevalenceLevel;
use crate::io::open_table;
use crate::types::{CAUSE_COUNT, Indicator, ShapeError};
use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView1};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Number of metadata columns preceding the cause columns.
pub const METADATA_COLUMNS: usize = 17;

const NAME_COLUMN: usize = 0;
const VERSION_COLUMN: usize = 2;
const EVIDENCE_COLUMN: usize = 5;

/// Cause column receiving the HIV prevalence override.
pub const HIV_CAUSE: usize = 5;
/// Cause columns receiving the malaria prevalence override: malaria, then sickle cell.
pub const MALARIA_CAUSES: [usize; 2] = [7, 27];

#[derive(Error, Debug)]
pub enum ProbbaseError {
    #[error("Failed to read the probability base: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse the probability base as CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error(
        "Probability base line {line} has {found} columns, but {expected} are required (17 metadata columns followed by 70 cause columns)."
    )]
    ColumnCount {
        line: usize,
        found: usize,
        expected: usize,
    },
    #[error("The probability base contains no data rows. At least the prior row is required.")]
    Empty,
    #[error(
        "Probability base cell at data row {row}, column {column} holds '{value}', which is neither a known strength code nor a non-negative number."
    )]
    InvalidCell {
        row: usize,
        column: usize,
        value: String,
    },
    #[error("The probability base is malformed: {0}")]
    Shape(#[from] ShapeError),
}

/// Maps a qualitative strength code to its likelihood weight.
///
/// Codes are matched exactly after trimming surrounding whitespace. Cells that are not a
/// code must parse as a finite, non-negative number, which is how the prior row is stored.
pub fn strength_value(cell: &str) -> Option<f64> {
    let value = match cell.trim() {
        "I" => 1.0,
        "A+" => 0.8,
        "A" => 0.5,
        "A-" => 0.2,
        "B+" => 0.1,
        "B" => 0.05,
        "B-" | "B -" => 0.02,
        "C+" => 0.01,
        "C" => 0.005,
        "C-" => 0.002,
        "D+" => 0.001,
        "D" => 5e-4,
        "D-" => 1e-4,
        "E" => 1e-5,
        "N" | "" => 0.0,
        other => {
            let parsed: f64 = other.parse().ok()?;
            if !parsed.is_finite() || parsed < 0.0 {
                return None;
            }
            parsed
        }
    };
    Some(value)
}

fn evidence_from_code(code: &str) -> Option<Indicator> {
    match code.trim() {
        "Y" => Some(Indicator::Yes),
        "N" => Some(Indicator::No),
        _ => None,
    }
}

/// A prior over the cause columns, after any prevalence substitution.
#[derive(Debug, Clone, PartialEq)]
pub struct Prior {
    values: Array1<f64>,
}

impl Prior {
    pub fn new(values: Array1<f64>) -> Result<Self, ShapeError> {
        if values.len() != CAUSE_COUNT {
            return Err(ShapeError {
                what: "prior",
                expected: CAUSE_COUNT,
                found: values.len(),
            });
        }
        Ok(Self { values })
    }

    #[inline]
    pub fn values(&self) -> ArrayView1<'_, f64> {
        self.values.view()
    }

    /// Replaces the HIV and malaria entries with the fixed values for the given levels.
    pub fn with_prevalence(mut self, hiv: PrevalenceLevel, malaria: PrevalenceLevel) -> Self {
        self.values[HIV_CAUSE] = match hiv {
            PrevalenceLevel::High => 0.05,
            PrevalenceLevel::Low => 0.005,
            PrevalenceLevel::VeryLow => 1e-5,
        };
        let (malaria_prior, sickle_cell_prior) = match malaria {
            PrevalenceLevel::High => (0.05, 0.05),
            PrevalenceLevel::Low => (0.005, 1e-5),
            PrevalenceLevel::VeryLow => (1e-5, 1e-5),
        };
        self.values[MALARIA_CAUSES[0]] = malaria_prior;
        self.values[MALARIA_CAUSES[1]] = sickle_cell_prior;
        self
    }
}

/// The parsed probability base. Immutable once built and shared across workers via `Arc`.
#[derive(Debug, Clone)]
pub struct ProbabilityBase {
    version: String,
    indicator_names: Vec<String>,
    evidence: Vec<Option<Indicator>>,
    likelihoods: Array2<f64>,
    catalog: Arc<CauseCatalog>,
}

impl ProbabilityBase {
    /// Assembles a base from already-parsed parts, checking that every dimension agrees.
    pub fn from_parts(
        version: impl Into<String>,
        indicator_names: Vec<String>,
        evidence: Vec<Option<Indicator>>,
        likelihoods: Array2<f64>,
        catalog: CauseCatalog,
    ) -> Result<Self, ProbbaseError> {
        let rows = likelihoods.nrows();
        if rows == 0 {
            return Err(ProbbaseError::Empty);
        }
        if likelihoods.ncols() != CAUSE_COUNT {
            return Err(ShapeError {
                what: "probability base cause columns",
                expected: CAUSE_COUNT,
                found: likelihoods.ncols(),
            }
            .into());
        }
        if catalog.len() != CAUSE_COUNT {
            return Err(ShapeError {
                what: "cause catalogue",
                expected: CAUSE_COUNT,
                found: catalog.len(),
            }
            .into());
        }
        if indicator_names.len() != rows {
            return Err(ShapeError {
                what: "indicator name list",
                expected: rows,
                found: indicator_names.len(),
            }
            .into());
        }
        if evidence.len() != rows {
            return Err(ShapeError {
                what: "evidence answer list",
                expected: rows,
                found: evidence.len(),
            }
            .into());
        }
        if let Some(((row, column), value)) = likelihoods
            .indexed_iter()
            .find(|(_, v)| !v.is_finite() || **v < 0.0)
        {
            return Err(ProbbaseError::InvalidCell {
                row,
                column: column + METADATA_COLUMNS,
                value: value.to_string(),
            });
        }

        Ok(Self {
            version: version.into(),
            indicator_names,
            evidence,
            likelihoods,
            catalog: Arc::new(catalog),
        })
    }

    /// Parses a probability base from CSV text with a header row.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ProbbaseError> {
        let expected = METADATA_COLUMNS + CAUSE_COUNT;
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        if headers.len() != expected {
            return Err(ProbbaseError::ColumnCount {
                line: 1,
                found: headers.len(),
                expected,
            });
        }
        let cause_headers: Vec<&str> = headers.iter().skip(METADATA_COLUMNS).collect();
        let catalog = CauseCatalog::from_headers(&cause_headers);
        if !catalog.is_standard() {
            info!("Probability base uses non-standard cause columns; headers are used as cause names.");
        }

        let mut version = String::new();
        let mut indicator_names = Vec::new();
        let mut evidence = Vec::new();
        let mut cells: Vec<f64> = Vec::new();

        for (row, record) in csv_reader.records().enumerate() {
            let record = record?;
            if record.len() != expected {
                return Err(ProbbaseError::ColumnCount {
                    line: row + 2,
                    found: record.len(),
                    expected,
                });
            }
            if row == 0 {
                version = record.get(VERSION_COLUMN).unwrap_or_default().trim().to_string();
            }
            indicator_names.push(record.get(NAME_COLUMN).unwrap_or_default().trim().to_string());
            evidence.push(evidence_from_code(
                record.get(EVIDENCE_COLUMN).unwrap_or_default(),
            ));
            for (offset, cell) in record.iter().skip(METADATA_COLUMNS).enumerate() {
                let value = strength_value(cell).ok_or_else(|| ProbbaseError::InvalidCell {
                    row,
                    column: METADATA_COLUMNS + offset,
                    value: cell.to_string(),
                })?;
                cells.push(value);
            }
        }

        let rows = indicator_names.len();
        if rows == 0 {
            return Err(ProbbaseError::Empty);
        }
        let found = cells.len();
        let likelihoods =
            Array2::from_shape_vec((rows, CAUSE_COUNT), cells).map_err(|_| ShapeError {
                what: "probability base cells",
                expected: rows * CAUSE_COUNT,
                found,
            })?;
        debug!("Parsed probability base with {rows} rows.");

        Self::from_parts(version, indicator_names, evidence, likelihoods, catalog)
    }

    /// Loads a probability base from a CSV file, which may be gzip-compressed.
    pub fn from_csv_path(path: &Path) -> Result<Self, ProbbaseError> {
        let base = Self::from_reader(open_table(path)?)?;
        info!(
            "Using probability base version {} ({} indicators) from '{}'.",
            if base.version.is_empty() { "unknown" } else { &base.version },
            base.num_indicators(),
            path.display()
        );
        Ok(base)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// The number of rows, which equals the length of a well-formed record.
    #[inline]
    pub fn num_indicators(&self) -> usize {
        self.likelihoods.nrows()
    }

    pub fn indicator_names(&self) -> &[String] {
        &self.indicator_names
    }

    pub fn catalog(&self) -> &Arc<CauseCatalog> {
        &self.catalog
    }

    /// The likelihood weights of one indicator across all cause columns.
    #[inline]
    pub fn row(&self, indicator: usize) -> ArrayView1<'_, f64> {
        self.likelihoods.row(indicator)
    }

    /// The answer that counts as evidence for an indicator, if any.
    #[inline]
    pub fn evidence_answer(&self, indicator: usize) -> Option<Indicator> {
        self.evidence.get(indicator).copied().flatten()
    }

    /// Row 0 of the base, without prevalence substitution.
    pub fn base_prior(&self) -> Prior {
        Prior {
            values: self.likelihoods.row(0).to_owned(),
        }
    }

    pub fn prior(&self, hiv: PrevalenceLevel, malaria: PrevalenceLevel) -> Prior {
        self.base_prior().with_prevalence(hiv, malaria)
    }
}
