//! Fitness terms shared by the population-based searches.
//!
//! Each term maps a red combination to `[0, 1]` (higher is better) except the
//! adjacency count, which is a raw penalty.

use crate::constraint;
use crate::domain::{HistoricalDraw, RED_COUNT};

use super::tail;

/// History features the fitness terms read, captured once at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct FitnessContext {
    last_reds: Vec<u8>,
    /// Red sums of up to the last four draws, oldest first.
    recent_sums: Vec<u32>,
    min_sum: u32,
    max_sum: u32,
}

impl FitnessContext {
    pub fn new(history: &[HistoricalDraw], window: usize, min_sum: u32, max_sum: u32) -> Self {
        let recent = tail(history, window);
        Self {
            last_reds: recent
                .last()
                .map(|d| d.reds().to_vec())
                .unwrap_or_default(),
            recent_sums: tail(recent, 4).iter().map(|d| d.red_sum()).collect(),
            min_sum,
            max_sum,
        }
    }

    /// Share of reds shared with the most recent draw.
    pub fn overlap(&self, reds: &[u8]) -> f64 {
        let shared = reds.iter().filter(|r| self.last_reds.contains(r)).count();
        shared as f64 / RED_COUNT as f64
    }

    /// 1.0 when the candidate sum continues the direction of the last
    /// three-draw average relative to the draw before them, else 0.4.
    pub fn trend_agreement(&self, reds: &[u8]) -> f64 {
        if self.recent_sums.len() < 4 {
            return 0.4;
        }
        let last3 = &self.recent_sums[1..];
        let avg = last3.iter().sum::<u32>() as f64 / last3.len() as f64;
        let before = self.recent_sums[0] as f64;
        let current = constraint::red_sum(reds) as f64;
        if (current - avg) * (avg - before) > 0.0 {
            1.0
        } else {
            0.4
        }
    }

    /// 1.0 inside the sum bounds, decaying linearly to 0 over 50 outside.
    pub fn sum_fitness(&self, reds: &[u8]) -> f64 {
        let total = constraint::red_sum(reds);
        if (self.min_sum..=self.max_sum).contains(&total) {
            return 1.0;
        }
        let distance = total.abs_diff(self.min_sum).min(total.abs_diff(self.max_sum)) as f64;
        (1.0 - distance / 50.0).max(0.0)
    }
}

/// Closeness of the odd count to a 3:3 split.
pub fn odd_even_balance(reds: &[u8]) -> f64 {
    1.0 - (constraint::odd_count(reds) as f64 - 3.0).abs() / 3.0
}

/// Fraction of the three zones that hold at least one value.
pub fn zone_spread(reds: &[u8]) -> f64 {
    constraint::zone_coverage(reds) as f64 / 3.0
}

/// Number of adjacent pairs, used as a penalty.
pub fn adjacency(reds: &[u8]) -> f64 {
    constraint::adjacent_pairs(reds) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::draw;

    fn context() -> FitnessContext {
        let history = vec![
            draw(2024001, [1, 2, 10, 11, 20, 30], 1).unwrap(), // 74
            draw(2024002, [3, 9, 14, 20, 25, 31], 2).unwrap(), // 102
            draw(2024003, [4, 8, 15, 21, 26, 32], 3).unwrap(), // 106
            draw(2024004, [5, 9, 16, 22, 27, 33], 4).unwrap(), // 112
        ];
        FitnessContext::new(&history, 80, 70, 140)
    }

    #[test]
    fn overlap_with_last_draw() {
        let ctx = context();
        assert_eq!(ctx.overlap(&[5, 9, 16, 22, 27, 33]), 1.0);
        assert_eq!(ctx.overlap(&[1, 2, 3, 4, 6, 7]), 0.0);
        assert!((ctx.overlap(&[5, 9, 16, 1, 2, 3]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn trend_follows_direction() {
        let ctx = context();
        // avg of last three = 106.67, rising from 74: a higher sum agrees.
        assert_eq!(ctx.trend_agreement(&[10, 15, 20, 25, 30, 33]), 1.0);
        assert_eq!(ctx.trend_agreement(&[1, 3, 5, 8, 10, 12]), 0.4);
    }

    #[test]
    fn sum_fitness_decays_outside_bounds() {
        let ctx = context();
        assert_eq!(ctx.sum_fitness(&[3, 8, 14, 19, 25, 30]), 1.0);
        // sum 21 is 49 below 70
        assert!((ctx.sum_fitness(&[1, 2, 3, 4, 5, 6]) - 0.02).abs() < 1e-9);
    }

    #[test]
    fn shape_terms() {
        assert_eq!(odd_even_balance(&[1, 3, 5, 2, 4, 6]), 1.0);
        assert_eq!(odd_even_balance(&[1, 3, 5, 7, 9, 11]), 0.0);
        assert_eq!(zone_spread(&[1, 2, 3, 4, 5, 6]), 1.0 / 3.0);
        assert_eq!(adjacency(&[1, 2, 3, 10, 20, 30]), 2.0);
    }
}
