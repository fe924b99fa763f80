//! Bayesian posterior sampling.
//!
//! Reds: Dirichlet posterior over the 33 positions with
//! `alpha[i] = prior_alpha + count[i] * likelihood_weight`. Each call draws a
//! probability vector from the posterior, floors it at `min_prob_threshold`,
//! reshapes it by `p^(1/T)` and samples six distinct reds, rejecting against
//! the constraint policy (zones included).
//!
//! Blue: Beta posterior on "blue == blue_reference". A Beta draw gives the
//! probability of a Bernoulli trial choosing the reference; otherwise blue is
//! uniform.

use rand::prelude::*;
use rand_distr::{Beta, Dirichlet};

use super::{
    finish, normalize, tail, top_k, uniform_blue, weighted_distinct, Outcome, Strategy,
    StrategyError, StrategyKind,
};
use crate::constraint::{self, ConstraintSpec};
use crate::domain::{check_blue, Candidate, HistoricalDraw, RED_COUNT, RED_MAX};
use crate::params::StrategyParams;

/// Dirichlet posterior parameters over the red positions.
pub fn red_posterior(
    draws: &[HistoricalDraw],
    prior_alpha: f64,
    likelihood_weight: f64,
) -> [f64; RED_MAX as usize] {
    let counts = super::red_counts(draws);
    let mut alpha = [prior_alpha; RED_MAX as usize];
    for (a, &c) in alpha.iter_mut().zip(counts.iter()) {
        *a += c as f64 * likelihood_weight;
    }
    alpha
}

/// Beta posterior `(alpha, beta)` for the event "blue == reference".
pub fn blue_posterior(
    draws: &[HistoricalDraw],
    reference: u8,
    prior_alpha: f64,
    prior_beta: f64,
    likelihood_weight: f64,
) -> (f64, f64) {
    let hits = draws.iter().filter(|d| d.blue() == reference).count() as f64;
    let misses = draws.len() as f64 - hits;
    (
        prior_alpha + hits * likelihood_weight,
        prior_beta + misses * likelihood_weight,
    )
}

/// Floor, renormalize and temperature-reshape a probability vector.
pub fn reshape(probs: &mut [f64], min_prob: f64, temperature: f64) {
    for p in probs.iter_mut() {
        *p = p.max(min_prob);
    }
    normalize(probs);
    if (temperature - 1.0).abs() > f64::EPSILON {
        let exponent = 1.0 / temperature;
        for p in probs.iter_mut() {
            *p = p.powf(exponent);
        }
        normalize(probs);
    }
}

#[derive(Debug, Clone)]
pub struct BayesianPosterior {
    spec: ConstraintSpec,
    red_alpha: [f64; RED_MAX as usize],
    blue_ab: (f64, f64),
    blue_reference: u8,
    temperature: f64,
    min_prob: f64,
    max_attempts: usize,
    params: StrategyParams,
}

impl BayesianPosterior {
    pub fn posterior(&self) -> &[f64; RED_MAX as usize] {
        &self.red_alpha
    }

    pub fn blue_posterior(&self) -> (f64, f64) {
        self.blue_ab
    }

    /// One reshaped probability vector drawn from the posterior.
    pub fn sample_probabilities<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Vec<f64>, StrategyError> {
        let dirichlet = Dirichlet::new(&self.red_alpha[..])
            .map_err(|e| StrategyError::Sampling(format!("dirichlet: {e}")))?;
        let mut probs: Vec<f64> = dirichlet.sample(rng);
        reshape(&mut probs, self.min_prob, self.temperature);
        Ok(probs)
    }
}

impl Strategy for BayesianPosterior {
    fn code(&self) -> &'static str {
        Self::CODE
    }

    fn label(&self) -> String {
        Self::NAME.to_string()
    }

    fn generate(&self, rng: &mut dyn RngCore) -> Result<Candidate, StrategyError> {
        let probs = self.sample_probabilities(rng)?;

        let mut outcome = None;
        for attempt in 1..=self.max_attempts {
            if let Some(reds) = weighted_distinct(&probs, RED_COUNT, rng) {
                if constraint::accepts(&reds, &self.spec) {
                    outcome = Some(Outcome {
                        reds,
                        satisfied: true,
                        attempts: attempt,
                    });
                    break;
                }
            }
        }
        let outcome = match outcome {
            Some(o) => o,
            None => {
                let reds = top_k(&probs, RED_COUNT);
                let satisfied = constraint::accepts(&reds, &self.spec);
                Outcome {
                    reds,
                    satisfied,
                    attempts: self.max_attempts,
                }
            }
        };

        let (a, b) = self.blue_ab;
        let beta =
            Beta::new(a, b).map_err(|e| StrategyError::Sampling(format!("beta: {e}")))?;
        let p_reference: f64 = beta.sample(rng);
        let blue = if rng.gen::<f64>() < p_reference {
            self.blue_reference
        } else {
            uniform_blue(rng)
        };

        let strength: f64 = self.red_alpha.iter().sum();
        Ok(
            finish(Self::CODE, self.label(), outcome, blue, &self.params)?
                .with_meta("posterior_strength", strength)
                .with_meta("blue_posterior_mean", a / (a + b)),
        )
    }
}

impl StrategyKind for BayesianPosterior {
    const CODE: &'static str = "bayesian_model";
    const NAME: &'static str = "Bayesian posterior sampling";
    const DESCRIPTION: &'static str =
        "Dirichlet posterior over reds and Beta posterior on a reference blue";
    const MIN_HISTORY: usize = 10;

    fn default_params() -> StrategyParams {
        ConstraintSpec::default_params()
            .with("require_zones", true)
            .with("prior_alpha", 1.0)
            .with("likelihood_weight", 1.0)
            .with("blue_prior_alpha", 1.0)
            .with("blue_prior_beta", 1.0)
            .with("blue_reference", 1)
            .with("temperature", 1.0)
            .with("min_prob_threshold", 0.001)
            .with("history_window", 100)
            .with("max_attempts", 40)
    }

    fn build(history: &[HistoricalDraw], params: &StrategyParams) -> Result<Self, StrategyError> {
        let prior_alpha = params.positive("prior_alpha")?;
        let likelihood_weight = params.f64("likelihood_weight")?;
        if likelihood_weight < 0.0 {
            return Err(StrategyError::invalid("likelihood_weight", "must be non-negative"));
        }
        let blue_reference = params.usize("blue_reference")?;
        let blue_reference = check_blue(blue_reference.min(u8::MAX as usize) as u8)?;

        let window = tail(history, params.usize("history_window")?);
        Ok(Self {
            spec: ConstraintSpec::from_params(params)?,
            red_alpha: red_posterior(window, prior_alpha, likelihood_weight),
            blue_ab: blue_posterior(
                window,
                blue_reference,
                params.positive("blue_prior_alpha")?,
                params.positive("blue_prior_beta")?,
                likelihood_weight,
            ),
            blue_reference,
            temperature: params.positive("temperature")?,
            min_prob: params.f64("min_prob_threshold")?.max(0.0),
            max_attempts: params.usize("max_attempts")?,
            params: params.clone(),
        })
    }
}
