//! Trend tracking with hot/cold and miss-count weighting.
//!
//! Starts from the most recent draw and shifts each number by a signed
//! offset of `trend_strength * max_offset * U(0.6, 1.4)`. Shifted values that
//! land on a hot or cold number may be swapped for another member of that
//! pool; values with a long miss streak may be swapped for another
//! long-missing number. Duplicates are redrawn, then the usual
//! mutate-and-retry applies.

use rand::prelude::*;

use super::{
    finish, fresh_red, mutate_until_accepted, red_counts, tail, uniform_blue, Strategy,
    StrategyError, StrategyKind,
};
use crate::constraint::ConstraintSpec;
use crate::domain::{Candidate, HistoricalDraw, RED_COUNT, RED_MAX};
use crate::params::StrategyParams;

/// Minimum recent occurrences for a hot number.
const HOT_MIN_COUNT: u32 = 3;
/// Maximum long-window occurrences for a cold number.
const COLD_MAX_COUNT: u32 = 2;

/// Periods since each red last appeared; index `n - 1` holds `n`.
/// A number seen in the latest draw has miss 1; never seen gives `len + 1`.
pub fn miss_values(draws: &[HistoricalDraw]) -> [usize; RED_MAX as usize] {
    let mut miss = [draws.len() + 1; RED_MAX as usize];
    for n in 1..=RED_MAX {
        if let Some(age) = draws.iter().rev().position(|d| d.contains_red(n)) {
            miss[(n - 1) as usize] = age + 1;
        }
    }
    miss
}

#[derive(Debug, Clone)]
pub struct TrendTracking {
    spec: ConstraintSpec,
    base: Vec<u8>,
    hot_reds: Vec<u8>,
    cold_reds: Vec<u8>,
    overdue: Vec<u8>,
    miss: [usize; RED_MAX as usize],
    trend_strength: f64,
    max_offset: f64,
    hot_weight: f64,
    cold_weight: f64,
    miss_weight: f64,
    miss_boost: f64,
    miss_threshold: usize,
    max_attempts: usize,
    params: StrategyParams,
}

impl TrendTracking {
    pub fn base(&self) -> &[u8] {
        &self.base
    }

    pub fn overdue(&self) -> &[u8] {
        &self.overdue
    }

    fn miss_swap_probability(&self, n: u8) -> f64 {
        let miss = self.miss[(n - 1) as usize];
        if miss <= self.miss_threshold || self.miss_threshold == 0 {
            return 0.0;
        }
        let scaled = miss as f64 / (2.0 * self.miss_threshold as f64);
        (self.miss_weight * self.miss_boost * scaled).min(1.0)
    }

    fn shift<R: Rng + ?Sized>(&self, base: u8, rng: &mut R) -> u8 {
        let direction = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        let offset =
            (direction * self.trend_strength * self.max_offset * rng.gen_range(0.6..1.4)).trunc();
        let mut n = (base as f64 + offset).clamp(1.0, RED_MAX as f64) as u8;

        if self.hot_reds.contains(&n) {
            if rng.gen::<f64>() < self.hot_weight {
                n = self.hot_reds.choose(rng).copied().unwrap_or(n);
            }
        } else if self.cold_reds.contains(&n) && rng.gen::<f64>() < self.cold_weight {
            n = self.cold_reds.choose(rng).copied().unwrap_or(n);
        }

        if rng.gen::<f64>() < self.miss_swap_probability(n) {
            n = self.overdue.choose(rng).copied().unwrap_or(n);
        }
        n
    }

    pub fn draft<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<u8> {
        let mut reds: Vec<u8> = Vec::with_capacity(RED_COUNT);
        for &b in &self.base {
            let mut n = self.shift(b, rng);
            if reds.contains(&n) {
                n = fresh_red(&reds, rng);
            }
            reds.push(n);
        }
        reds.sort_unstable();
        reds
    }
}

impl Strategy for TrendTracking {
    fn code(&self) -> &'static str {
        Self::CODE
    }

    fn label(&self) -> String {
        format!(
            "{} (strength {:.2}, hot weight {:.2})",
            Self::NAME,
            self.trend_strength,
            self.hot_weight
        )
    }

    fn generate(&self, rng: &mut dyn RngCore) -> Result<Candidate, StrategyError> {
        let draft = self.draft(rng);
        let outcome = mutate_until_accepted(draft, &self.spec, self.max_attempts, rng);
        let hot_used = outcome.reds.iter().filter(|n| self.hot_reds.contains(n)).count();
        let cold_used = outcome.reds.iter().filter(|n| self.cold_reds.contains(n)).count();
        let blue = uniform_blue(rng);
        Ok(finish(Self::CODE, self.label(), outcome, blue, &self.params)?
            .with_meta("hot_reds_used", hot_used)
            .with_meta("cold_reds_used", cold_used))
    }
}

impl StrategyKind for TrendTracking {
    const CODE: &'static str = "trend_tracking";
    const NAME: &'static str = "Trend tracking";
    const DESCRIPTION: &'static str =
        "Offsets the latest draw, biased by hot/cold pools and miss streaks";
    const MIN_HISTORY: usize = 5;

    fn default_params() -> StrategyParams {
        ConstraintSpec::default_params()
            .with("trend_strength", 0.65)
            .with("max_offset", 7)
            .with("hot_weight", 0.45)
            .with("cold_weight", 0.35)
            .with("recent_hot_periods", 8)
            .with("long_cold_periods", 30)
            .with("miss_weight", 0.25)
            .with("miss_boost", 1.8)
            .with("miss_threshold", 15)
            .with("history_window", 60)
            .with("max_attempts", 40)
    }

    fn build(history: &[HistoricalDraw], params: &StrategyParams) -> Result<Self, StrategyError> {
        let window = tail(history, params.usize("history_window")?);
        let Some(last) = window.last() else {
            return Err(StrategyError::InsufficientHistory {
                code: Self::CODE,
                need: Self::MIN_HISTORY,
                have: 0,
            });
        };

        let recent = red_counts(tail(window, params.usize("recent_hot_periods")?));
        let long = red_counts(tail(window, params.usize("long_cold_periods")?));
        let hot_reds: Vec<u8> = (1..=RED_MAX)
            .filter(|&n| recent[(n - 1) as usize] >= HOT_MIN_COUNT)
            .collect();
        let cold_reds: Vec<u8> = (1..=RED_MAX)
            .filter(|&n| long[(n - 1) as usize] <= COLD_MAX_COUNT)
            .collect();

        let miss_threshold = params.usize("miss_threshold")?;
        let miss = miss_values(window);
        let overdue: Vec<u8> = (1..=RED_MAX)
            .filter(|&n| miss[(n - 1) as usize] > miss_threshold)
            .collect();

        Ok(Self {
            spec: ConstraintSpec::from_params(params)?,
            base: last.reds().to_vec(),
            hot_reds,
            cold_reds,
            overdue,
            miss,
            trend_strength: params.probability("trend_strength")?,
            max_offset: params.f64("max_offset")?.abs(),
            hot_weight: params.probability("hot_weight")?,
            cold_weight: params.probability("cold_weight")?,
            miss_weight: params.probability("miss_weight")?,
            miss_boost: params.f64("miss_boost")?.max(0.0),
            miss_threshold,
            max_attempts: params.usize("max_attempts")?,
            params: params.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{draw, synthetic_history};
    use rand::rngs::StdRng;

    #[test]
    fn miss_values_count_periods_since_seen() {
        let history = vec![
            draw(2024001, [1, 2, 3, 4, 5, 6], 1).unwrap(),
            draw(2024002, [7, 8, 9, 10, 11, 12], 1).unwrap(),
            draw(2024003, [1, 8, 13, 14, 15, 16], 1).unwrap(),
        ];
        let miss = miss_values(&history);
        assert_eq!(miss[0], 1); // 1 in latest draw
        assert_eq!(miss[6], 2); // 7 one draw back
        assert_eq!(miss[1], 3); // 2 two draws back
        assert_eq!(miss[32], 4); // 33 never seen
    }

    #[test]
    fn zero_strength_without_swaps_reproduces_base() {
        let history = synthetic_history(12, 9);
        let params = TrendTracking::default_params()
            .with("trend_strength", 0.0)
            .with("hot_weight", 0.0)
            .with("cold_weight", 0.0)
            .with("miss_weight", 0.0);
        let strategy = TrendTracking::build(&history, &params).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        assert_eq!(strategy.draft(&mut rng), history[11].reds().to_vec());
    }

    #[test]
    fn candidates_are_valid() {
        let strategy =
            TrendTracking::build(&synthetic_history(40, 2), &TrendTracking::default_params())
                .unwrap();
        for seed in 0..30 {
            let mut rng = StdRng::seed_from_u64(seed);
            let c = strategy.generate(&mut rng).unwrap();
            assert!(crate::domain::normalize_reds(c.reds()).is_ok());
        }
    }
}
