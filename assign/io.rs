// ========================================================================================
//
//                       Tabular input and report output
//
// ========================================================================================
//
// Inputs are CSV tables, optionally gzip-compressed, with one record per row and the record
// identifier in the first column. Outputs are the per-record result file, the population
// fractions, the individual cause listing, the checked data and the plain-text error log.
// Report cells that carry no value hold a single space, which downstream tools expect.

use crate::aggregate::Csmf;
use crate::causes::CauseCatalog;
use crate::check::ChangeLog;
use crate::config::{OutputFormat, PrevalenceLevel};
use crate::engine::VaResult;
use crate::indiv::{IndividualCauses, IndividualListingOptions, IndividualRow};
use crate::normalize::normalize_row;
use crate::pipeline::Exclusion;
use crate::probbase::ProbabilityBase;
use crate::types::{Block, CauseIndex, Record};
use flate2::read::MultiGzDecoder;
use log::{info, warn};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Placeholder written for an empty report cell.
pub const BLANK: &str = " ";
/// File the error log is appended to, inside the output directory.
pub const ERROR_LOG_FILENAME: &str = "errorlogV5.txt";

/// Early questionnaires used this name for the indicator now called `i183a`.
const LEGACY_COLUMN: &str = "i183o";
const CURRENT_COLUMN: &str = "i183a";

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Failed to read the input table: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to parse the input table as CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("The input table contains no records.")]
    Empty,
    #[error(
        "The input table has {found} columns, but the probability base describes {expected} indicators. Each record needs one column per indicator, starting with the identifier."
    )]
    ColumnCount { found: usize, expected: usize },
    #[error("The last input column should be '{expected}', found '{found}'.")]
    LastColumn { expected: String, found: String },
}

fn is_gzip_magic(magic: &[u8]) -> bool {
    magic.len() >= 2 && magic[0] == 0x1F && magic[1] == 0x8B
}

/// Opens a table for reading, transparently decompressing gzip input.
pub fn open_table(path: &Path) -> io::Result<Box<dyn Read + Send>> {
    let mut reader = BufReader::new(File::open(path)?);
    let gzip = is_gzip_magic(reader.fill_buf()?);
    if gzip {
        Ok(Box::new(MultiGzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

// ========================================================================================
//                                   Input table
// ========================================================================================

/// A raw input table: column names plus the unparsed cells of every row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl VaTable {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, InputError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let mut columns: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|name| name.trim().to_string())
            .collect();
        if let Some(column) = columns.iter_mut().find(|name| name.as_str() == LEGACY_COLUMN) {
            *column = CURRENT_COLUMN.to_string();
            info!("Input column '{LEGACY_COLUMN}' was renamed to '{CURRENT_COLUMN}' to match the current indicator names.");
        }

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        if rows.is_empty() {
            return Err(InputError::Empty);
        }
        Ok(Self { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Checks the table against the probability base and adopts the base's indicator
    /// names. Returns the number of columns whose names differed.
    ///
    /// The identifier column keeps its name. A mismatch in the last column is fatal, since
    /// it usually means the table comes from a different questionnaire version.
    pub fn align_columns(&mut self, base: &ProbabilityBase) -> Result<usize, InputError> {
        let expected = base.num_indicators();
        if self.columns.len() != expected {
            return Err(InputError::ColumnCount {
                found: self.columns.len(),
                expected,
            });
        }
        let names = base.indicator_names();
        let last = expected - 1;
        if !self.columns[last].eq_ignore_ascii_case(&names[last]) {
            return Err(InputError::LastColumn {
                expected: names[last].clone(),
                found: self.columns[last].clone(),
            });
        }

        let mut changed = 0;
        for (column, standard) in self.columns.iter_mut().zip(names).skip(1) {
            if !column.eq_ignore_ascii_case(standard) {
                warn!("Input column '{column}' does not match the standard indicator '{standard}'.");
                *column = standard.clone();
                changed += 1;
            }
        }
        if changed > 0 {
            warn!(
                "{changed} column names changed in input. If the change is undesirable, rename the input columns to match the standard input format."
            );
        }
        Ok(changed)
    }

    /// Normalized records in table order.
    pub fn records(&self) -> impl Iterator<Item = Record> + '_ {
        self.rows.iter().map(|row| {
            let id = row.first().cloned().unwrap_or_default();
            normalize_row(id, row)
        })
    }
}

pub fn read_va_table(path: &Path) -> Result<VaTable, InputError> {
    let table = VaTable::from_reader(open_table(path)?)?;
    info!(
        "Read {} records with {} columns from '{}'.",
        table.len(),
        table.columns.len(),
        path.display()
    );
    Ok(table)
}

// ========================================================================================
//                                 Per-record results
// ========================================================================================

/// Column names shared by both output formats.
pub const RESULT_COLUMNS: [&str; 14] = [
    "ID", "MALPREV", "HIVPREV", "PREGSTAT", "PREGLIK", "CAUSE1", "LIK1", "CAUSE2", "LIK2",
    "CAUSE3", "LIK3", "INDET", "COMCAT", "COMNUM",
];

/// Settings that shape each line of the result file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultLayout {
    pub output: OutputFormat,
    pub groupcode: bool,
    pub hiv: PrevalenceLevel,
    pub malaria: PrevalenceLevel,
}

fn cell<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| BLANK.to_string(), |v| v.to_string())
}

/// Streams per-record results to CSV.
pub struct ResultWriter<W: Write> {
    writer: csv::Writer<W>,
    layout: ResultLayout,
    catalog: Arc<CauseCatalog>,
}

impl ResultWriter<BufWriter<File>> {
    /// Creates the result file. With `append`, rows are added to an existing file and the
    /// header is written only if the file did not exist yet.
    pub fn create(
        path: &Path,
        append: bool,
        layout: ResultLayout,
        catalog: Arc<CauseCatalog>,
    ) -> Result<Self, csv::Error> {
        let existed = path.exists();
        let file = if append {
            OpenOptions::new().create(true).append(true).open(path)?
        } else {
            File::create(path)?
        };
        Self::new(BufWriter::new(file), !(append && existed), layout, catalog)
    }
}

impl<W: Write> ResultWriter<W> {
    pub fn new(
        inner: W,
        write_header: bool,
        layout: ResultLayout,
        catalog: Arc<CauseCatalog>,
    ) -> Result<Self, csv::Error> {
        let mut result_writer = Self {
            writer: csv::Writer::from_writer(inner),
            layout,
            catalog,
        };
        if write_header {
            let header = result_writer.header();
            result_writer.writer.write_record(&header)?;
        }
        Ok(result_writer)
    }

    pub fn header(&self) -> Vec<String> {
        let mut header: Vec<String> = RESULT_COLUMNS.iter().map(|c| c.to_string()).collect();
        if self.layout.output == OutputFormat::Extended {
            header.extend(
                (0..self.catalog.len()).map(|c| self.catalog.label(CauseIndex(c), self.layout.groupcode)),
            );
        }
        header
    }

    pub fn write(&mut self, result: &VaResult) -> Result<(), csv::Error> {
        let catalog = &self.catalog;
        let groupcode = self.layout.groupcode;
        let mut row = Vec::with_capacity(RESULT_COLUMNS.len() + catalog.len());
        row.push(result.id.clone());
        row.push(self.layout.malaria.code().to_string());
        row.push(self.layout.hiv.code().to_string());
        row.push(result.pregnancy.label(catalog));
        row.push(cell(result.pregnancy.likelihood()));
        for slot in result.causes.ranked {
            row.push(cell(slot.map(|r| catalog.label(r.cause, groupcode))));
            row.push(cell(slot.map(|r| r.likelihood)));
        }
        row.push(result.causes.indeterminate.to_string());
        row.push(result.circumstance.label(catalog));
        row.push(cell(result.circumstance.score()));
        if self.layout.output == OutputFormat::Extended {
            row.extend(result.distribution.masses().iter().map(|m| m.to_string()));
        }
        self.writer.write_record(&row)
    }

    pub fn finish(mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

// ========================================================================================
//                                   Other reports
// ========================================================================================

/// Writes the reported population fractions as `label,fraction` rows without a header.
pub fn write_csmf<W: Write>(inner: W, csmf: &Csmf) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(inner);
    for entry in csmf.top() {
        let fraction = entry.fraction.to_string();
        writer.write_record([entry.label.as_str(), fraction.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the individual cause listing with an `ID` column first.
pub fn write_individual_causes<W: Write>(
    inner: W,
    rows: &[IndividualRow],
    catalog: &CauseCatalog,
    options: &IndividualListingOptions,
) -> Result<(), csv::Error> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(inner);

    let mut header = vec!["ID".to_string()];
    if options.top == 0 {
        header.extend(
            Block::Medical
                .columns()
                .map(|c| catalog.label(CauseIndex(c), options.groupcode)),
        );
    } else {
        for rank in 1..=options.top {
            header.push(format!("CAUSE{rank}"));
            if options.propensities {
                header.push(format!("PROPENSITY{rank}"));
            }
        }
    }
    writer.write_record(&header)?;

    for row in rows {
        let mut line = vec![row.id.clone()];
        match &row.causes {
            IndividualCauses::Full(masses) => {
                line.extend(masses.iter().map(|m| m.to_string()));
            }
            IndividualCauses::Ranked(ranked) => {
                for slot in ranked {
                    line.push(cell(slot.map(|p| catalog.label(p.cause, options.groupcode))));
                    if options.propensities {
                        line.push(cell(slot.map(|p| p.mass)));
                    }
                }
            }
        }
        writer.write_record(&line)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes records after consistency checking, one symbol per indicator.
pub fn write_checked<W: Write>(
    inner: W,
    columns: &[String],
    records: &[Record],
) -> Result<(), csv::Error> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(inner);
    writer.write_record(columns)?;
    for record in records {
        let mut line = Vec::with_capacity(record.len());
        line.push(record.id.as_str());
        line.extend(record.values.iter().skip(1).map(|v| v.symbol()));
        writer.write_record(&line)?;
    }
    writer.flush()?;
    Ok(())
}

/// Appends excluded records and consistency-check changes to the error log.
pub fn write_error_log(
    path: &Path,
    exclusions: &[Exclusion],
    change_logs: &[(String, ChangeLog)],
) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut out = BufWriter::new(file);
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());

    writeln!(out, "Error & warning log built for InterVA5 {stamp}")?;
    writeln!(
        out,
        "\nthe following records are incomplete and excluded from further processing:\n"
    )?;
    for exclusion in exclusions {
        writeln!(out, "{} {}", exclusion.id, exclusion.reason)?;
    }

    writeln!(
        out,
        "\nthe following data discrepancies were identified and handled:"
    )?;
    for (id, log) in change_logs.iter().filter(|(_, log)| !log.first_pass.is_empty()) {
        for message in &log.first_pass {
            writeln!(out, "{id} {message}")?;
        }
    }
    writeln!(out, "\nSecond pass")?;
    for (id, log) in change_logs.iter().filter(|(_, log)| !log.second_pass.is_empty()) {
        for message in &log.second_pass {
            writeln!(out, "{id} {message}")?;
        }
    }
    out.flush()
}
