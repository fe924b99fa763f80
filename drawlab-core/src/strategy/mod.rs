//! Strategy interface and the shared machinery every generator leans on.
//!
//! A strategy is built once from `(history, params)` and then asked for
//! candidates through [`Strategy::generate`]. Construction does all history
//! analysis up front, so `generate` only consumes randomness. Every strategy
//! shares the same retry shape: bounded attempts against the constraint
//! policy, then a deterministic best-effort floor flagged in metadata.

pub mod bayesian;
pub mod entropy;
pub mod genetic;
pub mod hot_cold;
pub mod nsga2;
pub mod objectives;
pub mod odd_even;
pub mod random;
pub mod sequence;
pub mod trend;

pub use bayesian::BayesianPosterior;
pub use entropy::{EntropyBalanced, EntropyMode};
pub use genetic::GeneticSearch;
pub use hot_cold::HotCold;
pub use nsga2::Nsga2Search;
pub use odd_even::OddEvenBalance;
pub use random::RandomBaseline;
pub use sequence::{EncoderError, PooledEncoder, RecurrentEncoder, SequenceEncoder, SequenceModel};
pub use trend::TrendTracking;

use std::fmt;

use rand::distributions::WeightedIndex;
use rand::prelude::*;
use thiserror::Error;
use tracing::warn;

use crate::constraint::{self, ConstraintSpec};
use crate::domain::{Candidate, HistoricalDraw, NumberError, BLUE_MAX, RED_COUNT, RED_MAX};
use crate::params::{ParamError, StrategyParams};

// ─── Error type ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error(transparent)]
    Params(#[from] ParamError),

    #[error("invalid combination: {0}")]
    Numbers(#[from] NumberError),

    #[error("{code} needs at least {need} draws of history, got {have}")]
    InsufficientHistory {
        code: &'static str,
        need: usize,
        have: usize,
    },

    #[error("invalid parameter '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error("sampling failed: {0}")]
    Sampling(String),
}

impl StrategyError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        StrategyError::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

// ─── Traits ─────────────────────────────────────────────────────────

/// A constructed generator.
///
/// Implementations are immutable after construction and must be shareable
/// across threads; all per-call randomness comes from the supplied RNG.
pub trait Strategy: Send + Sync + fmt::Debug {
    /// Registry code (e.g. `"hot_cold"`).
    fn code(&self) -> &'static str;

    /// Human-readable label recorded on every candidate.
    fn label(&self) -> String;

    /// Produce one candidate.
    fn generate(&self, rng: &mut dyn RngCore) -> Result<Candidate, StrategyError>;
}

/// Static description and constructor of a concrete strategy type.
pub trait StrategyKind: Strategy + Sized + 'static {
    const CODE: &'static str;
    const NAME: &'static str;
    const DESCRIPTION: &'static str;
    /// Shortest history the algorithm is defined for; below it the random
    /// baseline stands in.
    const MIN_HISTORY: usize;
    const ENABLED_BY_DEFAULT: bool = true;

    /// Complete default parameter set, including the constraint keys.
    fn default_params() -> StrategyParams;

    /// Build from chronological history (oldest first) and fully merged params.
    fn build(history: &[HistoricalDraw], params: &StrategyParams) -> Result<Self, StrategyError>;
}

/// Build a strategy behind a trait object, degrading to the random baseline
/// when history is shorter than the strategy's minimum.
pub fn build_boxed<K: StrategyKind>(
    history: &[HistoricalDraw],
    params: &StrategyParams,
) -> Result<Box<dyn Strategy>, StrategyError> {
    let merged = K::default_params().overlay(params);
    if history.len() < K::MIN_HISTORY {
        warn!(
            strategy = K::CODE,
            have = history.len(),
            need = K::MIN_HISTORY,
            "history below minimum, degrading to random baseline"
        );
        let reason = format!(
            "history has {} draws, {} needs {}",
            history.len(),
            K::CODE,
            K::MIN_HISTORY
        );
        return Ok(Box::new(Degraded::new(K::CODE, K::NAME, &merged, reason)?));
    }
    Ok(Box::new(K::build(history, &merged)?))
}

// ─── Random fallback wrapper ────────────────────────────────────────

/// Random baseline standing in for a strategy that cannot run.
#[derive(Debug)]
pub struct Degraded {
    code: &'static str,
    name: &'static str,
    reason: String,
    baseline: RandomBaseline,
}

impl Degraded {
    pub fn new(
        code: &'static str,
        name: &'static str,
        params: &StrategyParams,
        reason: impl Into<String>,
    ) -> Result<Self, StrategyError> {
        let baseline_params = RandomBaseline::default_params().overlay(params);
        Ok(Self {
            code,
            name,
            reason: reason.into(),
            baseline: RandomBaseline::build(&[], &baseline_params)?,
        })
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl Strategy for Degraded {
    fn code(&self) -> &'static str {
        self.code
    }

    fn label(&self) -> String {
        format!("{} (random fallback)", self.name)
    }

    fn generate(&self, rng: &mut dyn RngCore) -> Result<Candidate, StrategyError> {
        let mut candidate = self.baseline.generate(rng)?;
        candidate.set_label(self.label());
        candidate.insert_meta("strategy", self.code);
        candidate.insert_meta("fallback", "random");
        candidate.insert_meta("fallback_reason", self.reason.as_str());
        Ok(candidate)
    }
}

// ─── Shared helpers ─────────────────────────────────────────────────

/// Result of a constrained search: the reds, whether they pass the policy,
/// and how many attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Outcome {
    pub reds: Vec<u8>,
    pub satisfied: bool,
    pub attempts: usize,
}

/// Turn an outcome into a candidate with the standard metadata.
pub(crate) fn finish(
    code: &'static str,
    label: String,
    outcome: Outcome,
    blue: u8,
    params: &StrategyParams,
) -> Result<Candidate, StrategyError> {
    let candidate = Candidate::new(&outcome.reds, blue, label)?;
    let odd = candidate.odd_count();
    let sum = candidate.red_sum();
    Ok(candidate
        .with_meta("strategy", code)
        .with_meta("constraint_satisfied", outcome.satisfied)
        .with_meta("attempts", outcome.attempts)
        .with_meta("odd_count", odd)
        .with_meta("sum_reds", sum)
        .with_meta("params_used", params.to_json()))
}

/// The last `window` draws (or all of them when shorter).
pub(crate) fn tail(history: &[HistoricalDraw], window: usize) -> &[HistoricalDraw] {
    &history[history.len().saturating_sub(window)..]
}

/// Per-number red occurrence counts; index `n - 1` holds the count of `n`.
pub(crate) fn red_counts(draws: &[HistoricalDraw]) -> [u32; RED_MAX as usize] {
    let mut counts = [0u32; RED_MAX as usize];
    for draw in draws {
        for &r in draw.reds() {
            counts[(r - 1) as usize] += 1;
        }
    }
    counts
}

pub(crate) fn blue_counts(draws: &[HistoricalDraw]) -> [u32; BLUE_MAX as usize] {
    let mut counts = [0u32; BLUE_MAX as usize];
    for draw in draws {
        counts[(draw.blue() - 1) as usize] += 1;
    }
    counts
}

/// Six distinct uniformly drawn reds, sorted.
pub(crate) fn random_reds<R: Rng + ?Sized>(rng: &mut R) -> Vec<u8> {
    let mut reds: Vec<u8> = rand::seq::index::sample(rng, RED_MAX as usize, RED_COUNT)
        .into_iter()
        .map(|i| i as u8 + 1)
        .collect();
    reds.sort_unstable();
    reds
}

pub(crate) fn uniform_blue<R: Rng + ?Sized>(rng: &mut R) -> u8 {
    rng.gen_range(1..=BLUE_MAX)
}

/// A red not already present in `reds`.
pub(crate) fn fresh_red<R: Rng + ?Sized>(reds: &[u8], rng: &mut R) -> u8 {
    loop {
        let n = rng.gen_range(1..=RED_MAX);
        if !reds.contains(&n) {
            return n;
        }
    }
}

/// Replace one random position with a fresh value and re-sort.
pub(crate) fn replace_one<R: Rng + ?Sized>(reds: &mut Vec<u8>, rng: &mut R) {
    if reds.is_empty() {
        return;
    }
    let idx = rng.gen_range(0..reds.len());
    let n = fresh_red(reds, rng);
    reds[idx] = n;
    reds.sort_unstable();
}

/// Clamp into range, drop duplicates and top up with fresh values until
/// six distinct sorted reds remain.
pub(crate) fn repair<R: Rng + ?Sized>(mut reds: Vec<u8>, rng: &mut R) -> Vec<u8> {
    for r in reds.iter_mut() {
        *r = (*r).clamp(1, RED_MAX);
    }
    reds.sort_unstable();
    reds.dedup();
    reds.truncate(RED_COUNT);
    while reds.len() < RED_COUNT {
        let n = fresh_red(&reds, rng);
        reds.push(n);
    }
    reds.sort_unstable();
    reds
}

/// Mutate-and-retry: check, replace one value, repeat up to `max_attempts`
/// times. The floor is the last mutated combination.
pub(crate) fn mutate_until_accepted<R: Rng + ?Sized>(
    mut reds: Vec<u8>,
    spec: &ConstraintSpec,
    max_attempts: usize,
    rng: &mut R,
) -> Outcome {
    reds.sort_unstable();
    let mut attempts = 0;
    while attempts < max_attempts {
        if constraint::accepts(&reds, spec) {
            return Outcome {
                reds,
                satisfied: true,
                attempts,
            };
        }
        replace_one(&mut reds, rng);
        attempts += 1;
    }
    let satisfied = constraint::accepts(&reds, spec);
    Outcome {
        reds,
        satisfied,
        attempts,
    }
}

/// Sample `k` distinct numbers (1-based) from a weight vector without
/// replacement. Returns `None` when fewer than `k` weights are positive.
pub(crate) fn weighted_distinct<R: Rng + ?Sized>(
    weights: &[f64],
    k: usize,
    rng: &mut R,
) -> Option<Vec<u8>> {
    let mut w: Vec<f64> = weights
        .iter()
        .map(|&x| if x.is_finite() && x > 0.0 { x } else { 0.0 })
        .collect();
    let mut picked = Vec::with_capacity(k);
    for _ in 0..k {
        let dist = WeightedIndex::new(&w).ok()?;
        let i = dist.sample(rng);
        w[i] = 0.0;
        picked.push(i as u8 + 1);
    }
    picked.sort_unstable();
    Some(picked)
}

/// Indices (as 1-based numbers) of the `k` largest weights, ties to the lower number.
pub(crate) fn top_k(weights: &[f64], k: usize) -> Vec<u8> {
    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by(|&a, &b| {
        weights[b]
            .partial_cmp(&weights[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    let mut out: Vec<u8> = order.into_iter().take(k).map(|i| i as u8 + 1).collect();
    out.sort_unstable();
    out
}

/// Normalize a non-negative vector to sum to one; uniform when the sum is zero.
pub(crate) fn normalize(weights: &mut [f64]) {
    let total: f64 = weights.iter().sum();
    if total > 0.0 && total.is_finite() {
        for w in weights.iter_mut() {
            *w /= total;
        }
    } else if !weights.is_empty() {
        let uniform = 1.0 / weights.len() as f64;
        for w in weights.iter_mut() {
            *w = uniform;
        }
    }
}
