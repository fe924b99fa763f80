//! Criterion benchmarks for DrawLab hot paths.
//!
//! Benchmarks:
//! 1. Population searches (genetic, NSGA-II) at several population sizes
//! 2. Sampling strategies (Bayesian, hot/cold, trend, entropy) per candidate
//! 3. Pareto ranking (non-dominated sort + crowding) on random fronts
//! 4. Constraint policy check

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use drawlab_core::constraint::{self, ConstraintSpec};
use drawlab_core::domain::HistoricalDraw;
use drawlab_core::params::StrategyParams;
use drawlab_core::pareto;
use drawlab_core::registry;
use drawlab_core::strategy::Strategy as _;
use drawlab_core::synthetic::synthetic_history;

// ── Helpers ──────────────────────────────────────────────────────────

fn history() -> Vec<HistoricalDraw> {
    synthetic_history(200, 42)
}

fn random_points(n: usize, objectives: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..objectives).map(|_| rng.gen::<f64>()).collect())
        .collect()
}

// ── 1. Population searches ───────────────────────────────────────────

fn bench_population_searches(c: &mut Criterion) {
    let history = history();
    let mut group = c.benchmark_group("population_search");
    group.sample_size(10);

    for code in ["genetic_model", "nsga2"] {
        for population in [40usize, 120] {
            let params = StrategyParams::new()
                .with("population_size", population)
                .with("generations", 20);
            let strategy = registry::global()
                .instantiate(code, &history, &params)
                .unwrap();
            group.bench_with_input(
                BenchmarkId::new(code, population),
                &population,
                |b, _| {
                    let mut rng = StdRng::seed_from_u64(7);
                    b.iter(|| black_box(strategy.generate(&mut rng).unwrap()));
                },
            );
        }
    }
    group.finish();
}

// ── 2. Sampling strategies ───────────────────────────────────────────

fn bench_sampling_strategies(c: &mut Criterion) {
    let history = history();
    let mut group = c.benchmark_group("sampling_strategy");

    for code in [
        "bayesian_model",
        "hot_cold",
        "trend_tracking",
        "entropy_balanced",
        "random",
    ] {
        let strategy = registry::global()
            .instantiate(code, &history, &StrategyParams::new())
            .unwrap();
        group.bench_function(code, |b| {
            let mut rng = StdRng::seed_from_u64(3);
            b.iter(|| black_box(strategy.generate(&mut rng).unwrap()));
        });
    }
    group.finish();
}

// ── 3. Pareto ranking ────────────────────────────────────────────────

fn bench_pareto(c: &mut Criterion) {
    let mut group = c.benchmark_group("pareto");
    for n in [50usize, 150, 300] {
        let points = random_points(n, 5, n as u64);
        group.bench_with_input(BenchmarkId::new("select_half", n), &points, |b, pts| {
            b.iter(|| black_box(pareto::select(pts, n / 2)));
        });
    }
    group.finish();
}

// ── 4. Constraint policy ─────────────────────────────────────────────

fn bench_constraint(c: &mut Criterion) {
    let spec = ConstraintSpec::default().with_zones();
    let reds = [3u8, 8, 14, 19, 25, 30];
    c.bench_function("constraint_accepts", |b| {
        b.iter(|| black_box(constraint::accepts(black_box(&reds), &spec)));
    });
}

criterion_group!(
    benches,
    bench_population_searches,
    bench_sampling_strategies,
    bench_pareto,
    bench_constraint
);
criterion_main!(benches);
