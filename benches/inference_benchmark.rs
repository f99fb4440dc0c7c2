// ========================================================================================
//
//                       Inference throughput benchmark: interva
//
// ========================================================================================
//
// Measures how the cost of scoring a record grows with the number of symptoms answered
// "yes", and how a batch of records scales on the rayon pool.
//
// ========================================================================================

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use interva::causes::CauseCatalog;
use interva::engine::InferenceEngine;
use interva::normalize::IndicatorLayout;
use interva::pipeline::Pipeline;
use interva::probbase::ProbabilityBase;
use interva::types::{CAUSE_COUNT, Indicator, Record};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

// --- Benchmark Tuning Parameters ---

/// Rows of the simulated probability base, matching the standard questionnaire.
const NUM_INDICATORS: usize = 354;
/// Records per batch in the pipeline benchmark.
const BATCH_SIZE: usize = 2_000;
/// Fractions of symptoms answered "yes". Defines the x-axis of the report.
const SYMPTOM_DENSITIES: [f64; 5] = [0.01, 0.05, 0.1, 0.25, 0.5];

const STRENGTHS: [f64; 8] = [1.0, 0.8, 0.5, 0.2, 0.1, 0.02, 0.005, 1e-5];

/// A probability base with random strength codes and a flat prior.
fn simulated_engine(rng: &mut StdRng) -> InferenceEngine {
    let mut likelihoods = Array2::from_shape_fn((NUM_INDICATORS, CAUSE_COUNT), |_| {
        STRENGTHS[rng.gen_range(0..STRENGTHS.len())]
    });
    likelihoods.row_mut(0).fill(1.0 / CAUSE_COUNT as f64);

    let names = (0..NUM_INDICATORS).map(|i| format!("i{i:03}")).collect();
    let mut evidence = vec![Some(Indicator::Yes); NUM_INDICATORS];
    evidence[0] = None;

    let base = ProbabilityBase::from_parts(
        "bench",
        names,
        evidence,
        likelihoods,
        CauseCatalog::standard(),
    )
    .expect("simulated base is well formed");
    let base = Arc::new(base);
    let prior = base.base_prior();
    InferenceEngine::new(base, prior, IndicatorLayout::interva5())
        .expect("standard layout fits the simulated base")
}

/// An admissible record with roughly `density` of its symptoms answered "yes".
fn simulated_record(rng: &mut StdRng, id: usize, density: f64) -> Record {
    let mut values: Vec<Indicator> = (0..NUM_INDICATORS)
        .map(|_| {
            if rng.gen_bool(density) {
                Indicator::Yes
            } else {
                Indicator::No
            }
        })
        .collect();
    values[0] = Indicator::No;
    values[3] = Indicator::Yes;
    values[5] = Indicator::Yes;
    values[20] = Indicator::Yes;
    Record::new(format!("r{id}"), values)
}

fn benchmark_single_record(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let engine = simulated_engine(&mut rng);

    let mut group = c.benchmark_group("Single Record Inference");
    for density in SYMPTOM_DENSITIES {
        let record = simulated_record(&mut rng, 0, density);
        group.bench_with_input(
            BenchmarkId::new("infer", density),
            &record,
            |b, record| b.iter(|| engine.infer(black_box(record))),
        );
    }
    group.finish();
}

fn benchmark_batch(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let pipeline = Pipeline::new(simulated_engine(&mut rng));
    let records: Vec<Record> = (0..BATCH_SIZE)
        .map(|id| simulated_record(&mut rng, id, 0.1))
        .collect();

    let mut group = c.benchmark_group("Batch Pipeline");
    group.throughput(Throughput::Elements(BATCH_SIZE as u64));
    group.sample_size(20);
    group.bench_function("run_records", |b| {
        b.iter(|| pipeline.run_records(black_box(records.clone())))
    });
    group.finish();
}

criterion_group!(benches, benchmark_single_record, benchmark_batch);
criterion_main!(benches);
