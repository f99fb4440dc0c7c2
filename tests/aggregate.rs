use approx::assert_abs_diff_eq;
use interva::aggregate::{
    Csmf, CsmfAccumulator, CsmfCategory, CsmfOptions, CsmfScope, EmptyInputError, UNDETERMINED_LABEL,
    aggregate,
};
use interva::causes::CauseCatalog;
use interva::engine::CauseDistribution;
use interva::types::{CAUSE_COUNT, CauseIndex};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

fn distribution(catalog: &Arc<CauseCatalog>, pairs: &[(usize, f64)]) -> CauseDistribution {
    let mut masses = Array1::zeros(CAUSE_COUNT);
    for &(idx, mass) in pairs {
        masses[idx] = mass;
    }
    CauseDistribution::new(masses, Arc::clone(catalog)).unwrap()
}

fn options(top: usize) -> CsmfOptions {
    CsmfOptions {
        top,
        ..CsmfOptions::default()
    }
}

#[test]
fn near_ties_extend_the_reported_list() {
    let catalog = Arc::new(CauseCatalog::standard());
    let dists = [distribution(&catalog, &[(10, 0.5), (11, 0.5)])];

    let csmf = aggregate(dists.iter().map(Some), &options(1)).unwrap();
    let shown: Vec<CsmfCategory> = csmf.top().iter().map(|e| e.category).collect();
    assert_eq!(
        shown,
        vec![
            CsmfCategory::Cause(CauseIndex(10)),
            CsmfCategory::Cause(CauseIndex(11))
        ]
    );
    assert_abs_diff_eq!(csmf.top()[0].fraction, 0.5);
}

#[test]
fn small_masses_fall_into_the_undetermined_bucket() {
    let catalog = Arc::new(CauseCatalog::standard());
    let dists = [distribution(&catalog, &[(10, 0.6), (11, 0.3), (12, 0.1)])];

    let csmf = aggregate(dists.iter().map(Some), &options(10)).unwrap();
    let leading = catalog.name(CauseIndex(10)).to_string();
    assert_abs_diff_eq!(csmf.fraction(&leading).unwrap(), 0.6, epsilon = 1e-12);
    assert_abs_diff_eq!(csmf.undetermined(), 0.1, epsilon = 1e-12);
    assert_eq!(csmf.fraction(catalog.name(CauseIndex(12))), Some(0.0));
    assert_eq!(csmf.top().len(), 3);
    assert_eq!(csmf.top()[2].label, UNDETERMINED_LABEL);
}

#[test]
fn weak_records_are_entirely_undetermined() {
    let catalog = Arc::new(CauseCatalog::standard());
    let uniform: Vec<(usize, f64)> = (3..64).map(|c| (c, 1.0 / 61.0)).collect();
    let dists = [distribution(&catalog, &uniform), distribution(&catalog, &[])];

    let csmf = aggregate(dists.iter().map(Some), &options(10)).unwrap();
    assert_eq!(csmf.top().len(), 1);
    assert_eq!(csmf.top()[0].category, CsmfCategory::Undetermined);
    assert_abs_diff_eq!(csmf.undetermined(), 1.0, epsilon = 1e-12);
}

#[test]
fn fractions_sum_to_one_and_are_ranked() {
    let catalog = Arc::new(CauseCatalog::standard());
    let mut rng = StdRng::seed_from_u64(7);
    let dists: Vec<CauseDistribution> = (0..200)
        .map(|_| {
            let leading = rng.gen_range(3..64);
            let mut pairs = vec![(leading, rng.gen_range(0.4..1.0))];
            for _ in 0..5 {
                pairs.push((rng.gen_range(3..64), rng.gen_range(0.0..0.3)));
            }
            distribution(&catalog, &pairs)
        })
        .collect();

    let csmf = aggregate(dists.iter().map(Some), &options(5)).unwrap();
    let total: f64 = csmf.all().iter().map(|e| e.fraction).sum();
    assert_abs_diff_eq!(total, 1.0, epsilon = 1e-9);
    assert!(
        csmf.all()
            .windows(2)
            .all(|pair| pair[0].fraction >= pair[1].fraction)
    );
    assert!(csmf.top().len() >= 5);

    let again = aggregate(dists.iter().map(Some), &options(5)).unwrap();
    assert_eq!(csmf, again);
}

#[test]
fn excluded_records_are_skipped() {
    let catalog = Arc::new(CauseCatalog::standard());
    let dist = distribution(&catalog, &[(20, 1.0)]);

    let csmf = aggregate([None, Some(&dist), None], &options(10)).unwrap();
    assert_eq!(csmf.top().len(), 1);
    assert_abs_diff_eq!(csmf.top()[0].fraction, 1.0);
}

#[test]
fn no_distributions_is_an_error() {
    assert_eq!(
        aggregate(std::iter::empty(), &options(10)).unwrap_err(),
        EmptyInputError
    );
    assert_eq!(aggregate([None, None], &options(10)).unwrap_err(), EmptyInputError);
}

#[test]
fn zero_top_reports_nothing() {
    let catalog = Arc::new(CauseCatalog::standard());
    let dist = distribution(&catalog, &[(20, 1.0)]);
    let csmf = aggregate([Some(&dist)], &options(0)).unwrap();
    assert!(csmf.top().is_empty());
    assert_eq!(csmf.all().len(), 61);
}

#[test]
fn all_blocks_scope_includes_pregnancy_and_circumstance() {
    let catalog = Arc::new(CauseCatalog::standard());
    let dist = distribution(&catalog, &[(0, 1.0), (10, 1.0), (64, 1.0)]);
    let options = CsmfOptions {
        top: 3,
        scope: CsmfScope::AllBlocks,
        groupcode: true,
    };

    let mut accumulator = CsmfAccumulator::new(options.scope);
    accumulator.add(&dist);
    let csmf = accumulator.finish(&options).unwrap();

    let labels: Vec<&str> = csmf.top().iter().map(|e| e.label.as_str()).collect();
    assert_eq!(
        labels,
        vec!["Not pregnant or recently delivered", "01.08 Tetanus", "Culture"]
    );
    assert_abs_diff_eq!(csmf.top()[0].fraction, 1.0 / 3.0, epsilon = 1e-12);
}

/// Feeds the cause fractions of a finished CSMF back in as a single record.
fn as_distribution(catalog: &Arc<CauseCatalog>, csmf: &Csmf) -> CauseDistribution {
    let pairs: Vec<(usize, f64)> = csmf
        .all()
        .iter()
        .filter_map(|entry| match entry.category {
            CsmfCategory::Cause(cause) => Some((cause.0, entry.fraction)),
            CsmfCategory::Undetermined => None,
        })
        .collect();
    distribution(catalog, &pairs)
}

#[test]
fn reaggregation_is_stable_when_no_cause_falls_below_the_cutoff() {
    let catalog = Arc::new(CauseCatalog::standard());
    let dists = [
        distribution(&catalog, &[(10, 0.6), (11, 0.4)]),
        distribution(&catalog, &[(10, 0.5), (11, 0.5)]),
    ];
    let first = aggregate(dists.iter().map(Some), &options(10)).unwrap();
    assert_eq!(first.undetermined(), 0.0);

    let again = aggregate([Some(&as_distribution(&catalog, &first))], &options(10)).unwrap();
    assert_eq!(again.top().len(), first.top().len());
    for (a, b) in first.top().iter().zip(again.top()) {
        assert_eq!(a.category, b.category);
        assert_abs_diff_eq!(a.fraction, b.fraction, epsilon = 1e-12);
    }
}

#[test]
fn reaggregation_drops_causes_below_the_cutoff() {
    let catalog = Arc::new(CauseCatalog::standard());
    let dists = [
        distribution(&catalog, &[(10, 0.5), (11, 0.3), (12, 0.2)]),
        distribution(&catalog, &[(13, 0.9), (14, 0.1)]),
    ];
    let first = aggregate(dists.iter().map(Some), &options(10)).unwrap();
    let third = catalog.name(CauseIndex(11)).to_string();
    assert_abs_diff_eq!(first.fraction(&third).unwrap(), 0.15, epsilon = 1e-12);
    assert_abs_diff_eq!(first.undetermined(), 0.15, epsilon = 1e-12);

    // 0.15 sits below half of the leading 0.45, so a second pass moves it to undetermined.
    let again = aggregate([Some(&as_distribution(&catalog, &first))], &options(10)).unwrap();
    assert_eq!(again.fraction(&third), Some(0.0));
    assert_abs_diff_eq!(
        again.fraction(catalog.name(CauseIndex(13))).unwrap(),
        0.45 / 0.85,
        epsilon = 1e-12
    );
    assert_abs_diff_eq!(again.undetermined(), 0.15 / 0.85, epsilon = 1e-12);
}
