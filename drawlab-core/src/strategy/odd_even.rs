//! Odd/Even balance: hold the odd count near a history-nudged target.

use rand::prelude::*;

use super::{
    finish, mutate_until_accepted, tail, uniform_blue, Strategy, StrategyError, StrategyKind,
};
use crate::constraint::ConstraintSpec;
use crate::domain::{Candidate, HistoricalDraw, BLUE_MAX, RED_COUNT, RED_MAX};
use crate::params::StrategyParams;

#[derive(Debug, Clone)]
pub struct OddEvenBalance {
    /// Constraint window with the odd bounds replaced by `target ± tolerance`.
    spec: ConstraintSpec,
    target_odd: usize,
    adjusted_odd: usize,
    odd_ratio: f64,
    prefer_odd_blue: bool,
    max_attempts: usize,
    params: StrategyParams,
}

/// Mean share of odd reds across `draws`; 0.5 when empty.
pub fn mean_odd_ratio(draws: &[HistoricalDraw]) -> f64 {
    if draws.is_empty() {
        return 0.5;
    }
    let total: usize = draws.iter().map(|d| d.odd_count()).sum();
    total as f64 / (draws.len() * RED_COUNT) as f64
}

/// Nudge `target` by `round((ratio - 0.5) * 2)` and clamp into `[min, max]`.
pub fn adjusted_target(target: usize, ratio: f64, min: usize, max: usize) -> usize {
    let nudged = (target as f64 + ((ratio - 0.5) * 2.0).round()).max(0.0) as usize;
    nudged.clamp(min.min(max), max)
}

impl OddEvenBalance {
    pub fn adjusted_odd(&self) -> usize {
        self.adjusted_odd
    }

    pub fn odd_ratio(&self) -> f64 {
        self.odd_ratio
    }

    fn draft<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<u8> {
        let odds: Vec<u8> = (1..=RED_MAX).filter(|n| n % 2 == 1).collect();
        let evens: Vec<u8> = (1..=RED_MAX).filter(|n| n % 2 == 0).collect();
        let n_odd = self.adjusted_odd.min(RED_COUNT);
        let mut reds: Vec<u8> = odds.choose_multiple(rng, n_odd).copied().collect();
        reds.extend(evens.choose_multiple(rng, RED_COUNT - n_odd).copied());
        reds.sort_unstable();
        reds
    }
}

impl Strategy for OddEvenBalance {
    fn code(&self) -> &'static str {
        Self::CODE
    }

    fn label(&self) -> String {
        format!(
            "{} ({} odd / {} even)",
            Self::NAME,
            self.adjusted_odd,
            RED_COUNT - self.adjusted_odd.min(RED_COUNT)
        )
    }

    fn generate(&self, rng: &mut dyn RngCore) -> Result<Candidate, StrategyError> {
        let draft = self.draft(rng);
        let outcome = mutate_until_accepted(draft, &self.spec, self.max_attempts, rng);
        let blue = if self.prefer_odd_blue {
            let odd_blues: Vec<u8> = (1..=BLUE_MAX).filter(|n| n % 2 == 1).collect();
            odd_blues.choose(rng).copied().unwrap_or(1)
        } else {
            uniform_blue(rng)
        };
        Ok(
            finish(Self::CODE, self.label(), outcome, blue, &self.params)?
                .with_meta("target_odd_count", self.target_odd)
                .with_meta("adjusted_odd_count", self.adjusted_odd)
                .with_meta("history_odd_ratio", self.odd_ratio),
        )
    }
}

impl StrategyKind for OddEvenBalance {
    const CODE: &'static str = "odd_even_balance";
    const NAME: &'static str = "Odd/Even balance";
    const DESCRIPTION: &'static str =
        "Keeps the odd count near a target nudged by the historical odd ratio";
    const MIN_HISTORY: usize = 1;

    fn default_params() -> StrategyParams {
        ConstraintSpec::default_params()
            .with("target_odd_count", 3)
            .with("odd_tolerance", 1)
            .with("use_history_trend", true)
            .with("history_window", 50)
            .with("prefer_odd_blue", false)
            .with("max_attempts", 30)
    }

    fn build(history: &[HistoricalDraw], params: &StrategyParams) -> Result<Self, StrategyError> {
        let base = ConstraintSpec::from_params(params)?;
        let target_odd = params.usize("target_odd_count")?;
        let tolerance = params.usize("odd_tolerance")?;
        if target_odd > RED_COUNT {
            return Err(StrategyError::invalid(
                "target_odd_count",
                format!("must be at most {RED_COUNT}"),
            ));
        }

        let odd_ratio = if params.bool("use_history_trend")? {
            mean_odd_ratio(tail(history, params.usize("history_window")?))
        } else {
            0.5
        };
        let adjusted_odd =
            adjusted_target(target_odd, odd_ratio, base.min_odd_count, base.max_odd_count);
        let spec = base.with_odd_window(target_odd.saturating_sub(tolerance), target_odd + tolerance);

        Ok(Self {
            spec,
            target_odd,
            adjusted_odd,
            odd_ratio,
            prefer_odd_blue: params.bool("prefer_odd_blue")?,
            max_attempts: params.usize("max_attempts")?,
            params: params.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::draw;
    use rand::rngs::StdRng;

    fn all_odd_history(n: usize) -> Vec<HistoricalDraw> {
        (0..n)
            .map(|i| draw(2024001 + i as u32, [1, 5, 9, 15, 21, 27], 3).unwrap())
            .collect()
    }

    #[test]
    fn nudge_and_clamp() {
        assert_eq!(adjusted_target(3, 0.5, 2, 4), 3);
        assert_eq!(adjusted_target(3, 1.0, 2, 4), 4);
        assert_eq!(adjusted_target(3, 0.0, 2, 4), 2);
        assert_eq!(adjusted_target(4, 1.0, 2, 4), 4);
        assert_eq!(adjusted_target(2, 0.0, 2, 4), 2);
    }

    #[test]
    fn odd_heavy_history_raises_target() {
        let history = all_odd_history(20);
        assert_eq!(mean_odd_ratio(&history), 1.0);
        let strategy = OddEvenBalance::build(&history, &OddEvenBalance::default_params()).unwrap();
        assert_eq!(strategy.adjusted_odd(), 4);
    }

    #[test]
    fn trend_can_be_disabled() {
        let params = OddEvenBalance::default_params().with("use_history_trend", false);
        let strategy = OddEvenBalance::build(&all_odd_history(20), &params).unwrap();
        assert_eq!(strategy.adjusted_odd(), 3);
        assert_eq!(strategy.odd_ratio(), 0.5);
    }

    #[test]
    fn candidates_stay_within_tolerance() {
        let strategy =
            OddEvenBalance::build(&all_odd_history(20), &OddEvenBalance::default_params())
                .unwrap();
        for seed in 0..40 {
            let mut rng = StdRng::seed_from_u64(seed);
            let c = strategy.generate(&mut rng).unwrap();
            if c.meta("constraint_satisfied") == Some(&serde_json::Value::Bool(true)) {
                assert!((2..=4).contains(&c.odd_count()));
            }
        }
    }
}
