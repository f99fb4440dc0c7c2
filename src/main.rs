// ========================================================================================
//
//                           The command-line front end: interva
//
// ========================================================================================
//
// This binary wires the library together: it resolves the run configuration from an
// optional TOML file and command-line flags, loads the probability base and the input
// table once, runs the pipeline, and writes the requested reports.

#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, Parser, Subcommand};
use interva::aggregate::CsmfScope;
use interva::config::{OutputFormat, PrevalenceLevel, RunConfig};
use interva::engine::InferenceEngine;
use interva::indiv::{IndividualListingOptions, individual_causes};
use interva::io::{VaTable, read_va_table, write_individual_causes};
use interva::normalize::IndicatorLayout;
use interva::pipeline::{Pipeline, PipelineError, RunOutput, write_reports};
use interva::probbase::ProbabilityBase;
use log::info;
use std::error::Error;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Instant;

// ========================================================================================
//                         Command-line interface definition
// ========================================================================================

#[derive(Parser)]
#[command(
    name = "interva",
    version,
    about = "Assign causes of death to verbal autopsy records",
    long_about = "Scores verbal autopsy records against a symptom-by-cause probability base, \
                 reports up to three likely causes per death and aggregates them into \
                 cause-specific mortality fractions."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SharedArgs {
    /// Path to the verbal autopsy input table (CSV, optionally gzip-compressed)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Path to the probability base (CSV, optionally gzip-compressed)
    #[arg(long, value_name = "CSV")]
    probbase: PathBuf,

    /// HIV prevalence level: h (high), l (low) or v (very low)
    #[arg(long, value_parser = PrevalenceLevel::parse_hiv)]
    hiv: Option<PrevalenceLevel>,

    /// Malaria prevalence level: h (high), l (low) or v (very low)
    #[arg(long, value_parser = PrevalenceLevel::parse_malaria)]
    malaria: Option<PrevalenceLevel>,

    /// TOML run configuration; command-line flags take precedence
    #[arg(long, value_name = "TOML")]
    config: Option<PathBuf>,

    /// Directory that receives every output file
    #[arg(long)]
    directory: Option<PathBuf>,

    /// Add the group code to medical cause names
    #[arg(long)]
    groupcode: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Assign causes of death and write results, the error log and population fractions
    #[command(about = "Assign causes of death (outputs: <filename>.csv, csmf.csv, errorlogV5.txt)")]
    Run {
        #[command(flatten)]
        shared: SharedArgs,

        /// Output file name without extension
        #[arg(long)]
        filename: Option<String>,

        /// Append the full 70-cause distribution to every result row
        #[arg(long)]
        extended: bool,

        /// Append to an existing result file instead of replacing it
        #[arg(long)]
        append: bool,

        /// Number of causes to report in the population fractions
        #[arg(long, value_name = "N")]
        csmf_top: Option<usize>,

        /// Include pregnancy and circumstance columns in the population fractions
        #[arg(long)]
        all_blocks: bool,

        /// Also write the records as seen after consistency checking
        #[arg(long)]
        write_checked: bool,
    },

    /// Write each record's ranked medical causes
    #[command(about = "List individual causes of death (outputs: indiv_prob.csv)")]
    Indiv {
        #[command(flatten)]
        shared: SharedArgs,

        /// Number of ranked causes per record; 0 lists every medical cause mass
        #[arg(long, default_value = "0")]
        top: usize,

        /// Write each ranked cause's propensity next to it
        #[arg(long)]
        propensities: bool,
    },
}

// ========================================================================================
//                            The main orchestration logic
// ========================================================================================

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let start_time = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            shared,
            filename,
            extended,
            append,
            csmf_top,
            all_blocks,
            write_checked,
        } => resolve_config(&shared).and_then(|mut config| {
            if let Some(filename) = filename {
                config.filename = filename;
            }
            if extended {
                config.output = OutputFormat::Extended;
            }
            config.append |= append;
            if let Some(top) = csmf_top {
                config.csmf.top = top;
            }
            if all_blocks {
                config.csmf.scope = CsmfScope::AllBlocks;
            }
            config.write_checked_data |= write_checked;
            run_command(&shared, &config)
        }),
        Commands::Indiv {
            shared,
            top,
            propensities,
        } => resolve_config(&shared).and_then(|config| {
            indiv_command(
                &shared,
                &config,
                IndividualListingOptions {
                    top,
                    propensities,
                    groupcode: config.groupcode,
                },
            )
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
    info!("Finished in {:.2?}.", start_time.elapsed());
}

/// Merges the optional configuration file with the flags shared by every subcommand.
fn resolve_config(shared: &SharedArgs) -> Result<RunConfig, Box<dyn Error>> {
    let mut config = match &shared.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    if shared.hiv.is_some() {
        config.hiv = shared.hiv;
    }
    if shared.malaria.is_some() {
        config.malaria = shared.malaria;
    }
    if let Some(directory) = &shared.directory {
        config.directory = directory.clone();
    }
    config.groupcode |= shared.groupcode;
    config.prevalence()?;
    Ok(config)
}

/// Loads the base, builds the engine and scores the input table.
fn score(
    shared: &SharedArgs,
    config: &RunConfig,
    keep_checked: bool,
) -> Result<(InferenceEngine, VaTable, RunOutput), PipelineError> {
    let (hiv, malaria) = config.prevalence()?;
    info!("HIV prevalence: {hiv}; malaria prevalence: {malaria}.");

    let base = Arc::new(ProbabilityBase::from_csv_path(&shared.probbase)?);
    let prior = base.prior(hiv, malaria);
    let engine = InferenceEngine::new(Arc::clone(&base), prior, IndicatorLayout::interva5())?;

    let mut table = read_va_table(&shared.input)?;
    table.align_columns(&base)?;

    let pipeline = Pipeline::new(engine).keep_checked(keep_checked);
    let output = pipeline.run(&table);
    Ok((pipeline.into_engine(), table, output))
}

fn run_command(shared: &SharedArgs, config: &RunConfig) -> Result<(), Box<dyn Error>> {
    let (engine, table, output) = score(shared, config, config.write_checked_data)?;
    if let Some(csmf) = write_reports(&output, config, &engine, &table.columns)? {
        info!("Top causes in the population:");
        for entry in csmf.top() {
            info!("  {:<40} {:>6.2}%", entry.label, entry.fraction * 100.0);
        }
    }
    Ok(())
}

fn indiv_command(
    shared: &SharedArgs,
    config: &RunConfig,
    options: IndividualListingOptions,
) -> Result<(), Box<dyn Error>> {
    let (engine, _, output) = score(shared, config, false)?;
    let rows = individual_causes(&output.results, options.top);
    fs::create_dir_all(&config.directory)?;
    let path = config.directory.join("indiv_prob.csv");
    write_individual_causes(
        BufWriter::new(File::create(&path)?),
        &rows,
        engine.base().catalog(),
        &options,
    )?;
    info!(
        "Wrote individual causes for {} records to '{}'.",
        rows.len(),
        path.display()
    );
    Ok(())
}
