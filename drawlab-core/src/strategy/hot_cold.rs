//! Hot/Cold: frequency split over a recent window.
//!
//! Numbers seen at least `hot_threshold` times in the last `recent_periods`
//! draws are hot, those seen at most `cold_threshold` times are cold. A draft
//! takes `floor(6 * hot_preference)` hot numbers, fills with cold numbers and
//! tops up uniformly; the draft then goes through mutate-and-retry.

use rand::prelude::*;

use super::{
    blue_counts, finish, fresh_red, mutate_until_accepted, red_counts, tail, uniform_blue,
    Strategy, StrategyError, StrategyKind,
};
use crate::constraint::ConstraintSpec;
use crate::domain::{Candidate, HistoricalDraw, RED_COUNT};
use crate::params::StrategyParams;

#[derive(Debug, Clone)]
pub struct HotCold {
    spec: ConstraintSpec,
    hot_threshold: usize,
    cold_threshold: usize,
    hot_preference: f64,
    max_attempts: usize,
    hot_reds: Vec<u8>,
    cold_reds: Vec<u8>,
    cold_blues: Vec<u8>,
    params: StrategyParams,
}

impl HotCold {
    pub fn hot_pool(&self) -> &[u8] {
        &self.hot_reds
    }

    pub fn cold_pool(&self) -> &[u8] {
        &self.cold_reds
    }

    /// Pre-constraint selection: hot share, cold fill, random top-up.
    pub fn draft<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<u8> {
        let wanted_hot = ((RED_COUNT as f64) * self.hot_preference).floor() as usize;
        let mut selected: Vec<u8> = self
            .hot_reds
            .choose_multiple(rng, wanted_hot.min(self.hot_reds.len()))
            .copied()
            .collect();

        let cold: Vec<u8> = self
            .cold_reds
            .iter()
            .copied()
            .filter(|n| !selected.contains(n))
            .collect();
        let remaining = RED_COUNT - selected.len();
        selected.extend(cold.choose_multiple(rng, remaining.min(cold.len())).copied());

        while selected.len() < RED_COUNT {
            let n = fresh_red(&selected, rng);
            selected.push(n);
        }
        selected.sort_unstable();
        selected
    }
}

impl Strategy for HotCold {
    fn code(&self) -> &'static str {
        Self::CODE
    }

    fn label(&self) -> String {
        format!(
            "{} (hot>={}, cold<={})",
            Self::NAME,
            self.hot_threshold,
            self.cold_threshold
        )
    }

    fn generate(&self, rng: &mut dyn RngCore) -> Result<Candidate, StrategyError> {
        let draft = self.draft(rng);
        let outcome = mutate_until_accepted(draft, &self.spec, self.max_attempts, rng);
        let blue = match self.cold_blues.choose(rng) {
            Some(&b) => b,
            None => uniform_blue(rng),
        };
        let hot_used = outcome
            .reds
            .iter()
            .filter(|n| self.hot_reds.contains(n))
            .count();
        Ok(
            finish(Self::CODE, self.label(), outcome, blue, &self.params)?
                .with_meta("hot_pool", self.hot_reds.clone())
                .with_meta("hot_used", hot_used),
        )
    }
}

impl StrategyKind for HotCold {
    const CODE: &'static str = "hot_cold";
    const NAME: &'static str = "Hot/Cold";
    const DESCRIPTION: &'static str =
        "Prefers recently frequent numbers, fills with rarely seen ones";
    const MIN_HISTORY: usize = 1;

    fn default_params() -> StrategyParams {
        ConstraintSpec::default_params()
            .with("recent_periods", 10)
            .with("hot_threshold", 4)
            .with("cold_threshold", 2)
            .with("hot_preference", 0.6)
            .with("history_window", 80)
            .with("max_attempts", 30)
    }

    fn build(history: &[HistoricalDraw], params: &StrategyParams) -> Result<Self, StrategyError> {
        let recent_periods = params.usize("recent_periods")?;
        let history_window = params.usize("history_window")?;
        let hot_threshold = params.usize("hot_threshold")?;
        let cold_threshold = params.usize("cold_threshold")?;
        if recent_periods == 0 {
            return Err(StrategyError::invalid("recent_periods", "must be at least 1"));
        }

        let window = tail(tail(history, history_window), recent_periods);
        let reds = red_counts(window);
        let blues = blue_counts(window);

        let pool = |counts: &[u32], keep: &dyn Fn(usize) -> bool| -> Vec<u8> {
            counts
                .iter()
                .enumerate()
                .filter(|&(_, &c)| keep(c as usize))
                .map(|(i, _)| i as u8 + 1)
                .collect()
        };

        Ok(Self {
            spec: ConstraintSpec::from_params(params)?,
            hot_threshold,
            cold_threshold,
            hot_preference: params.probability("hot_preference")?,
            max_attempts: params.usize("max_attempts")?,
            hot_reds: pool(&reds, &|c: usize| c >= hot_threshold),
            cold_reds: pool(&reds, &|c: usize| c <= cold_threshold),
            cold_blues: pool(&blues, &|c: usize| c <= cold_threshold),
            params: params.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint;
    use crate::synthetic::{draw, synthetic_history};
    use rand::rngs::StdRng;

    /// 60 draws that all contain 7; every other number appears at most
    /// twice in any 10-draw window.
    fn seven_everywhere() -> Vec<HistoricalDraw> {
        let others: Vec<u8> = (1..=33).filter(|&n| n != 7).collect();
        (0..60)
            .map(|i| {
                let mut reds = [7u8; 6];
                for k in 0..5 {
                    reds[k + 1] = others[(i * 5 + k) % others.len()];
                }
                draw(2024000 + i as u32, reds, (i % 16) as u8 + 1).unwrap()
            })
            .collect()
    }

    fn loose(params: StrategyParams) -> StrategyParams {
        params
            .with("min_odd_count", 0)
            .with("max_odd_count", 6)
            .with("min_sum", 0)
            .with("max_sum", 300)
            .with("max_consecutive", 6)
    }

    #[test]
    fn hot_number_enters_pool_and_candidate() {
        let history = seven_everywhere();
        let params = loose(HotCold::default_params());
        let strategy = HotCold::build(&history, &params).unwrap();
        assert_eq!(strategy.hot_pool(), &[7]);

        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            assert!(strategy.draft(&mut rng).contains(&7));
            let c = strategy.generate(&mut rng).unwrap();
            assert!(c.contains_red(7), "seed {seed}: {:?}", c.reds());
        }
    }

    #[test]
    fn default_constraints_usually_hold() {
        let history = synthetic_history(40, 5);
        let strategy = HotCold::build(&history, &HotCold::default_params()).unwrap();
        let mut satisfied = 0;
        for seed in 0..30 {
            let mut rng = StdRng::seed_from_u64(seed);
            let c = strategy.generate(&mut rng).unwrap();
            if constraint::accepts(c.reds(), &ConstraintSpec::default()) {
                satisfied += 1;
            }
        }
        assert!(satisfied >= 25, "only {satisfied}/30 satisfied");
    }

    #[test]
    fn zero_recent_periods_rejected() {
        let params = HotCold::default_params().with("recent_periods", 0);
        assert!(matches!(
            HotCold::build(&synthetic_history(5, 1), &params),
            Err(StrategyError::Invalid { .. })
        ));
    }
}
