//! Random baseline: the universal floor every other strategy falls back to.

use rand::prelude::*;

use super::{finish, random_reds, uniform_blue, Outcome, Strategy, StrategyError, StrategyKind};
use crate::constraint::{self, ConstraintSpec};
use crate::domain::{Candidate, HistoricalDraw, BLUE_MAX, RED_COUNT, RED_MAX};
use crate::params::StrategyParams;

/// Uniform sampling without replacement, optionally biased toward odd values.
#[derive(Debug, Clone)]
pub struct RandomBaseline {
    spec: ConstraintSpec,
    prefer_odd_red: bool,
    prefer_odd_blue: bool,
    max_attempts: usize,
    params: StrategyParams,
}

impl RandomBaseline {
    /// Baseline with default parameters. Never fails.
    pub fn standard() -> Self {
        Self {
            spec: ConstraintSpec::default(),
            prefer_odd_red: false,
            prefer_odd_blue: false,
            max_attempts: 50,
            params: Self::default_params(),
        }
    }

    fn draw_reds<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<u8> {
        if !self.prefer_odd_red {
            return random_reds(rng);
        }
        let odds: Vec<u8> = (1..=RED_MAX).filter(|n| n % 2 == 1).collect();
        let evens: Vec<u8> = (1..=RED_MAX).filter(|n| n % 2 == 0).collect();
        let n_odd = rng.gen_range(3..=4);
        let mut reds: Vec<u8> = odds.choose_multiple(rng, n_odd).copied().collect();
        reds.extend(evens.choose_multiple(rng, RED_COUNT - n_odd).copied());
        reds.sort_unstable();
        reds
    }

    fn draw_blue<R: Rng + ?Sized>(&self, rng: &mut R) -> u8 {
        if self.prefer_odd_blue {
            let odd_blues: Vec<u8> = (1..=BLUE_MAX).filter(|n| n % 2 == 1).collect();
            if let Some(&b) = odd_blues.choose(rng) {
                return b;
            }
        }
        uniform_blue(rng)
    }
}

impl Strategy for RandomBaseline {
    fn code(&self) -> &'static str {
        Self::CODE
    }

    fn label(&self) -> String {
        if self.prefer_odd_red {
            format!("{} (odd-leaning)", Self::NAME)
        } else {
            Self::NAME.to_string()
        }
    }

    fn generate(&self, rng: &mut dyn RngCore) -> Result<Candidate, StrategyError> {
        let attempts = self.max_attempts.max(1);
        let mut reds = self.draw_reds(rng);
        let mut used = 1;
        while !constraint::accepts(&reds, &self.spec) && used < attempts {
            reds = self.draw_reds(rng);
            used += 1;
        }
        let satisfied = constraint::accepts(&reds, &self.spec);
        let blue = self.draw_blue(rng);
        finish(
            Self::CODE,
            self.label(),
            Outcome {
                reds,
                satisfied,
                attempts: used,
            },
            blue,
            &self.params,
        )
    }
}

impl StrategyKind for RandomBaseline {
    const CODE: &'static str = "random";
    const NAME: &'static str = "Random baseline";
    const DESCRIPTION: &'static str =
        "Uniform sampling without replacement, optional odd bias, retried against constraints";
    const MIN_HISTORY: usize = 0;

    fn default_params() -> StrategyParams {
        ConstraintSpec::default_params()
            .with("prefer_odd_red", false)
            .with("prefer_odd_blue", false)
            .with("max_attempts", 50)
    }

    fn build(_history: &[HistoricalDraw], params: &StrategyParams) -> Result<Self, StrategyError> {
        Ok(Self {
            spec: ConstraintSpec::from_params(params)?,
            prefer_odd_red: params.bool("prefer_odd_red")?,
            prefer_odd_blue: params.bool("prefer_odd_blue")?,
            max_attempts: params.usize("max_attempts")?,
            params: params.clone(),
        })
    }
}
