// ========================================================================================
//
//                                The batch pipeline
//
// ========================================================================================
//
// A batch run takes every raw row through the same stages: normalization, admission,
// consistency checking and inference. Records are independent, so the stages run on the
// rayon pool; outcomes are then gathered sequentially in input order, which keeps the
// result file and the population fractions identical from run to run.
//
// Nothing is dropped silently. A record that cannot be scored becomes an `Exclusion`
// carrying the reason, and those reasons end up in the error log.

use crate::aggregate::{Csmf, CsmfOptions, EmptyInputError, aggregate};
use crate::check::{ChangeLog, ConsistencyChecker, PassThroughChecker};
use crate::config::{ConfigError, RunConfig};
use crate::engine::{InferenceEngine, VaResult};
use crate::io::{
    ERROR_LOG_FILENAME, InputError, ResultLayout, ResultWriter, VaTable, write_checked,
    write_csmf, write_error_log,
};
use crate::normalize::AdmissionError;
use crate::probbase::ProbbaseError;
use crate::types::{Record, ShapeError};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, IsTerminal};
use std::sync::Arc;
use thiserror::Error;

/// File the reported population fractions are written to.
pub const CSMF_FILENAME: &str = "csmf.csv";

// ========================================================================================
//                          Public API, context & error handling
// ========================================================================================

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Probbase(#[from] ProbbaseError),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("Failed to write CSV output: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    Admission(AdmissionError),
    Shape(ShapeError),
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admission(err) => write!(f, "{err}"),
            Self::Shape(err) => write!(f, "Error in indicators: {err}"),
        }
    }
}

/// A record that was not scored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusion {
    /// Zero-based position of the record in the input.
    pub row: usize,
    pub id: String,
    pub reason: ExclusionReason,
}

/// Everything a batch run produces, in input order.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    pub results: Vec<VaResult>,
    pub exclusions: Vec<Exclusion>,
    /// Non-empty change logs, keyed by record identifier.
    pub change_logs: Vec<(String, ChangeLog)>,
    /// Cleaned records of every admitted row, when requested.
    pub checked: Option<Vec<Record>>,
}

impl RunOutput {
    pub fn csmf(&self, options: &CsmfOptions) -> Result<Csmf, EmptyInputError> {
        aggregate(
            self.results.iter().map(|result| Some(&result.distribution)),
            options,
        )
    }
}

enum Outcome {
    Excluded(Exclusion),
    Scored {
        result: Box<VaResult>,
        log: ChangeLog,
        cleaned: Option<Record>,
    },
}

fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let draw_target = if std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };

    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    if let Ok(style) = ProgressStyle::with_template(
        "\n> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    ) {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    pb.set_message(message.to_string());

    pb
}

// ========================================================================================
//                                   The pipeline
// ========================================================================================

pub struct Pipeline<C: ConsistencyChecker = PassThroughChecker> {
    engine: InferenceEngine,
    checker: C,
    keep_checked: bool,
}

impl Pipeline<PassThroughChecker> {
    pub fn new(engine: InferenceEngine) -> Self {
        Self {
            engine,
            checker: PassThroughChecker,
            keep_checked: false,
        }
    }
}

impl<C: ConsistencyChecker> Pipeline<C> {
    /// Replaces the consistency checker.
    pub fn with_checker<D: ConsistencyChecker>(self, checker: D) -> Pipeline<D> {
        Pipeline {
            engine: self.engine,
            checker,
            keep_checked: self.keep_checked,
        }
    }

    /// Retain the cleaned record of every admitted row in [`RunOutput::checked`].
    pub fn keep_checked(mut self, keep: bool) -> Self {
        self.keep_checked = keep;
        self
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    pub fn into_engine(self) -> InferenceEngine {
        self.engine
    }

    pub fn run(&self, table: &VaTable) -> RunOutput {
        self.run_records(table.records().collect())
    }

    pub fn run_records(&self, records: Vec<Record>) -> RunOutput {
        let pb = create_progress_bar(records.len() as u64, "Assigning causes of death");
        let outcomes: Vec<Outcome> = records
            .par_iter()
            .enumerate()
            .map(|(row, record)| {
                let outcome = self.process(row, record);
                pb.inc(1);
                outcome
            })
            .collect();
        pb.finish_and_clear();

        let mut output = RunOutput {
            checked: self.keep_checked.then(Vec::new),
            ..RunOutput::default()
        };
        for outcome in outcomes {
            match outcome {
                Outcome::Excluded(exclusion) => {
                    warn!(
                        "Record '{}' (row {}) excluded: {}",
                        exclusion.id,
                        exclusion.row + 1,
                        exclusion.reason
                    );
                    output.exclusions.push(exclusion);
                }
                Outcome::Scored {
                    result,
                    log,
                    cleaned,
                } => {
                    debug!("{result}");
                    if !log.is_empty() {
                        for message in log.first_pass.iter().chain(&log.second_pass) {
                            debug!("Record '{}': {message}", result.id);
                        }
                        output.change_logs.push((result.id.clone(), log));
                    }
                    if let (Some(checked), Some(cleaned)) = (output.checked.as_mut(), cleaned) {
                        checked.push(cleaned);
                    }
                    output.results.push(*result);
                }
            }
        }

        info!(
            "Assigned causes to {} records; {} excluded.",
            output.results.len(),
            output.exclusions.len()
        );
        output
    }

    fn process(&self, row: usize, record: &Record) -> Outcome {
        let exclude = |reason| {
            Outcome::Excluded(Exclusion {
                row,
                id: record.id.clone(),
                reason,
            })
        };

        let expected = self.engine.base().num_indicators();
        if record.len() != expected {
            return exclude(ExclusionReason::Shape(ShapeError {
                what: "record",
                expected,
                found: record.len(),
            }));
        }
        if let Err(err) = self.engine.layout().admit(record) {
            return exclude(ExclusionReason::Admission(err));
        }

        let outcome = self.checker.check(record);
        match self.engine.infer(&outcome.cleaned) {
            Ok(result) => Outcome::Scored {
                result: Box::new(result),
                log: outcome.log,
                cleaned: self.keep_checked.then_some(outcome.cleaned),
            },
            Err(err) => exclude(ExclusionReason::Shape(err)),
        }
    }
}

// ========================================================================================
//                                    Reporting
// ========================================================================================

/// Writes the result file, the error log, the population fractions and, when configured,
/// the checked data into the configured directory. Returns the fractions that were written,
/// or `None` when every record was excluded and there was nothing to aggregate.
pub fn write_reports(
    output: &RunOutput,
    config: &RunConfig,
    engine: &InferenceEngine,
    columns: &[String],
) -> Result<Option<Csmf>, PipelineError> {
    let (hiv, malaria) = config.prevalence()?;
    fs::create_dir_all(&config.directory)?;
    let catalog = Arc::clone(engine.base().catalog());

    let layout = ResultLayout {
        output: config.output,
        groupcode: config.groupcode,
        hiv,
        malaria,
    };
    let result_path = config.result_path();
    let mut writer = ResultWriter::create(&result_path, config.append, layout, catalog)?;
    for result in &output.results {
        writer.write(result)?;
    }
    writer.finish()?;
    info!("Wrote {} results to '{}'.", output.results.len(), result_path.display());

    write_error_log(
        &config.directory.join(ERROR_LOG_FILENAME),
        &output.exclusions,
        &output.change_logs,
    )?;

    if config.write_checked_data {
        if let Some(checked) = &output.checked {
            let path = config.checked_path();
            write_checked(BufWriter::new(File::create(&path)?), columns, checked)?;
            info!("Wrote checked data to '{}'.", path.display());
        }
    }

    let options = CsmfOptions {
        top: config.csmf.top,
        scope: config.csmf.scope,
        groupcode: config.groupcode,
    };
    match output.csmf(&options) {
        Ok(csmf) => {
            write_csmf(
                BufWriter::new(File::create(config.directory.join(CSMF_FILENAME))?),
                &csmf,
            )?;
            Ok(Some(csmf))
        }
        Err(err) => {
            warn!("{err} '{CSMF_FILENAME}' was not written.");
            Ok(None)
        }
    }
}
