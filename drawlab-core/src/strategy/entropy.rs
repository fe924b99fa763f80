//! Entropy balance: sample constrained combinations and keep those whose
//! probability entropy sits closest to what history predicts.
//!
//! Red probabilities come from Laplace-smoothed counts over the last
//! `history_window` draws (clamped to `30..=200`). A combination's entropy is
//! `-Σ p ln p` over its six reds; the target is the expected value of that
//! sum for a uniformly drawn combination, `6/33 · H(p)`.
//!
//! Two modes:
//! - `entropy`: up to `monte_carlo_samples` draws, keep the closest, stop
//!   early once within `entropy_tolerance`
//! - `monte_carlo`: score every accepted sample and rank by distance;
//!   [`EntropyBalanced::top_candidates`] returns the best `top_k`

use std::fmt;
use std::str::FromStr;

use rand::prelude::*;

use super::{
    finish, random_reds, red_counts, tail, uniform_blue, Outcome, Strategy, StrategyError,
    StrategyKind,
};
use crate::constraint::{self, ConstraintSpec};
use crate::domain::{Candidate, HistoricalDraw, RED_COUNT, RED_MAX};
use crate::params::StrategyParams;

const MIN_WINDOW: usize = 30;
const MAX_WINDOW: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntropyMode {
    Entropy,
    MonteCarlo,
}

impl EntropyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntropyMode::Entropy => "entropy",
            EntropyMode::MonteCarlo => "monte_carlo",
        }
    }
}

impl fmt::Display for EntropyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntropyMode {
    type Err = StrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entropy" => Ok(EntropyMode::Entropy),
            "monte_carlo" | "montecarlo" => Ok(EntropyMode::MonteCarlo),
            other => Err(StrategyError::invalid(
                "mode",
                format!("expected 'entropy' or 'monte_carlo', got '{other}'"),
            )),
        }
    }
}

/// Shannon entropy `-Σ p ln p`, skipping non-positive terms.
pub fn shannon(probs: impl IntoIterator<Item = f64>) -> f64 {
    probs
        .into_iter()
        .filter(|&p| p > 0.0)
        .map(|p| -p * p.ln())
        .sum()
}

/// Laplace-smoothed red probabilities (`alpha = 1`); index `n - 1` holds `n`.
pub fn smoothed_red_probs(draws: &[HistoricalDraw]) -> [f64; RED_MAX as usize] {
    let counts = red_counts(draws);
    let total = (draws.len() * RED_COUNT) as f64 + RED_MAX as f64;
    let mut probs = [0.0; RED_MAX as usize];
    for (p, &c) in probs.iter_mut().zip(counts.iter()) {
        *p = (c as f64 + 1.0) / total;
    }
    probs
}

/// A constrained sample and its distance from the target entropy.
#[derive(Debug, Clone, PartialEq)]
struct Scored {
    reds: Vec<u8>,
    entropy: f64,
    diff: f64,
}

#[derive(Debug, Clone)]
pub struct EntropyBalanced {
    spec: ConstraintSpec,
    mode: EntropyMode,
    history_window: usize,
    tolerance: f64,
    samples: usize,
    top_k: usize,
    probs: [f64; RED_MAX as usize],
    target: f64,
    params: StrategyParams,
}

impl EntropyBalanced {
    pub fn mode(&self) -> EntropyMode {
        self.mode
    }

    pub fn history_window(&self) -> usize {
        self.history_window
    }

    pub fn target_entropy(&self) -> f64 {
        self.target
    }

    pub fn combo_entropy(&self, reds: &[u8]) -> f64 {
        shannon(reds.iter().map(|&r| self.probs[(r - 1) as usize]))
    }

    fn score(&self, reds: Vec<u8>) -> Scored {
        let entropy = self.combo_entropy(&reds);
        Scored {
            diff: (entropy - self.target).abs(),
            entropy,
            reds,
        }
    }

    /// Closest accepted sample, stopping early within tolerance. Returns the
    /// best sample (if any) and how many samples were drawn.
    fn search<R: Rng + ?Sized>(&self, rng: &mut R) -> (Option<Scored>, usize) {
        let mut best: Option<Scored> = None;
        let mut used = 0;
        for _ in 0..self.samples {
            used += 1;
            let reds = random_reds(rng);
            if !constraint::accepts(&reds, &self.spec) {
                continue;
            }
            let scored = self.score(reds);
            if best.as_ref().map_or(true, |b| scored.diff < b.diff) {
                best = Some(scored);
            }
            if best.as_ref().is_some_and(|b| b.diff <= self.tolerance) {
                break;
            }
        }
        (best, used)
    }

    /// Every accepted sample, closest first; ties go to the lower combination.
    fn ranked<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Scored> {
        let mut pool: Vec<Scored> = (0..self.samples)
            .map(|_| random_reds(rng))
            .filter(|reds| constraint::accepts(reds, &self.spec))
            .map(|reds| self.score(reds))
            .collect();
        pool.sort_by(|a, b| a.diff.total_cmp(&b.diff).then_with(|| a.reds.cmp(&b.reds)));
        pool.dedup_by(|a, b| a.reds == b.reds);
        pool
    }

    fn candidate(
        &self,
        scored: Scored,
        satisfied: bool,
        samples_used: usize,
        blue: u8,
    ) -> Result<Candidate, StrategyError> {
        let outcome = Outcome {
            reds: scored.reds,
            satisfied,
            attempts: samples_used,
        };
        Ok(finish(Self::CODE, self.label(), outcome, blue, &self.params)?
            .with_meta("mode", self.mode.as_str())
            .with_meta("history_window", self.history_window)
            .with_meta("target_entropy", self.target)
            .with_meta("combo_entropy", scored.entropy)
            .with_meta("entropy_diff", scored.diff)
            .with_meta("samples_used", samples_used))
    }

    /// Unconstrained draw used when no sample passed the policy.
    fn floor<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Candidate, StrategyError> {
        let scored = self.score(random_reds(rng));
        let satisfied = constraint::accepts(&scored.reds, &self.spec);
        let blue = uniform_blue(rng);
        self.candidate(scored, satisfied, self.samples, blue)
    }

    /// The `k` (at least one) best distinct combinations of one Monte Carlo
    /// pass, each with an independent blue.
    pub fn top_candidates<R: Rng + ?Sized>(
        &self,
        k: usize,
        rng: &mut R,
    ) -> Result<Vec<Candidate>, StrategyError> {
        let ranked = self.ranked(rng);
        if ranked.is_empty() {
            return Ok(vec![self.floor(rng)?]);
        }
        ranked
            .into_iter()
            .take(k.max(1))
            .map(|scored| {
                let blue = uniform_blue(rng);
                self.candidate(scored, true, self.samples, blue)
            })
            .collect()
    }

    /// `top_candidates` with the configured `top_k`.
    pub fn batch<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<Candidate>, StrategyError> {
        self.top_candidates(self.top_k, rng)
    }
}

impl Strategy for EntropyBalanced {
    fn code(&self) -> &'static str {
        Self::CODE
    }

    fn label(&self) -> String {
        format!("{} ({}, window {})", Self::NAME, self.mode, self.history_window)
    }

    fn generate(&self, rng: &mut dyn RngCore) -> Result<Candidate, StrategyError> {
        match self.mode {
            EntropyMode::Entropy => match self.search(rng) {
                (Some(best), used) => {
                    let blue = uniform_blue(rng);
                    self.candidate(best, true, used, blue)
                }
                (None, _) => self.floor(rng),
            },
            EntropyMode::MonteCarlo => {
                let mut top = self.top_candidates(1, rng)?;
                top.pop()
                    .ok_or_else(|| StrategyError::Sampling("no monte carlo candidate".into()))
            }
        }
    }
}

impl StrategyKind for EntropyBalanced {
    const CODE: &'static str = "entropy_balanced";
    const NAME: &'static str = "Entropy balance";
    const DESCRIPTION: &'static str =
        "Constrained sampling toward the historical probability entropy";
    const MIN_HISTORY: usize = 1;

    fn default_params() -> StrategyParams {
        ConstraintSpec::default_params()
            .with("min_sum", 80)
            .with("require_zones", true)
            .with("mode", "entropy")
            .with("history_window", 100)
            .with("entropy_tolerance", 0.05)
            .with("monte_carlo_samples", 5000)
            .with("top_k", 5)
    }

    fn build(history: &[HistoricalDraw], params: &StrategyParams) -> Result<Self, StrategyError> {
        let spec = ConstraintSpec::from_params(params)?;
        let mode: EntropyMode = params.text("mode")?.parse()?;
        let history_window = params.usize("history_window")?.clamp(MIN_WINDOW, MAX_WINDOW);
        let tolerance = params.f64("entropy_tolerance")?;
        if tolerance < 0.0 {
            return Err(StrategyError::invalid("entropy_tolerance", "must be non-negative"));
        }
        let samples = params.usize("monte_carlo_samples")?;
        if samples == 0 {
            return Err(StrategyError::invalid("monte_carlo_samples", "must be at least 1"));
        }

        let probs = smoothed_red_probs(tail(history, history_window));
        let target = shannon(probs.iter().copied()) * RED_COUNT as f64 / RED_MAX as f64;

        Ok(Self {
            spec,
            mode,
            history_window,
            tolerance,
            samples,
            top_k: params.usize("top_k")?,
            probs,
            target,
            params: params.clone(),
        })
    }
}
