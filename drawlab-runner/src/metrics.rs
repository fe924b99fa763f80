//! Scoring metrics: pure functions over candidates, draws and hit series.
//!
//! No dependencies on the simulator loop or the service; the simulator and
//! the CLI `score` command both call into here.

use serde::{Deserialize, Serialize};

use drawlab_core::domain::{Candidate, HistoricalDraw};

use crate::simulator::{PrizeTable, WIN_RED_HITS};

/// One candidate scored against one actual draw.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub red_hits: usize,
    pub blue_hit: bool,
    pub prize: f64,
    pub profit: f64,
}

impl Score {
    pub fn is_win(&self) -> bool {
        self.red_hits >= WIN_RED_HITS
    }
}

/// Score `candidate` against `actual`; `profit = prize − bet_amount`.
pub fn score(
    candidate: &Candidate,
    actual: &HistoricalDraw,
    prizes: &PrizeTable,
    bet_amount: f64,
) -> Score {
    let red_hits = candidate.red_hits(actual);
    let blue_hit = candidate.blue_hit(actual);
    let prize = prizes.prize(red_hits, blue_hit);
    Score {
        red_hits,
        blue_hit,
        prize,
        profit: prize - bet_amount,
    }
}

// ─── Series metrics ─────────────────────────────────────────────────

/// Round half away from zero to `dp` decimal places.
pub fn round_to(value: f64, dp: i32) -> f64 {
    let factor = 10f64.powi(dp);
    (value * factor).round() / factor
}

/// Mean red hits per period.
pub fn avg_hit(red_hits: &[usize]) -> f64 {
    if red_hits.is_empty() {
        return 0.0;
    }
    red_hits.iter().sum::<usize>() as f64 / red_hits.len() as f64
}

/// Percentage of periods with at least [`WIN_RED_HITS`] red hits.
pub fn hit_rate(red_hits: &[usize]) -> f64 {
    if red_hits.is_empty() {
        return 0.0;
    }
    let wins = red_hits.iter().filter(|&&h| h >= WIN_RED_HITS).count();
    wins as f64 / red_hits.len() as f64 * 100.0
}

/// Longest run of consecutive winning periods.
pub fn max_streak(red_hits: &[usize]) -> usize {
    let mut best = 0;
    let mut current = 0;
    for &h in red_hits {
        if h >= WIN_RED_HITS {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    best
}

/// `profit / bet × 100`; zero when nothing was bet.
pub fn roi(total_profit: f64, total_bet: f64) -> f64 {
    if total_bet > 0.0 {
        total_profit / total_bet * 100.0
    } else {
        0.0
    }
}

/// Largest peak-to-trough fall of a cumulative profit curve.
pub fn max_drawdown(cumulative: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &value in cumulative {
        peak = peak.max(value);
        worst = worst.max(peak - value);
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;
    use drawlab_core::synthetic::draw;

    #[test]
    fn scores_against_the_prize_table() {
        let actual = draw(2024001, [2, 7, 13, 19, 26, 31], 9).unwrap();
        let prizes = PrizeTable::default();

        let jackpot = Candidate::new(&[2, 7, 13, 19, 26, 31], 9, "t").unwrap();
        let s = score(&jackpot, &actual, &prizes, 2.0);
        assert_eq!(s.red_hits, 6);
        assert!(s.blue_hit);
        assert_eq!(s.prize, 5_000_000.0);
        assert!(s.is_win());

        let three_no_blue = Candidate::new(&[2, 7, 13, 20, 27, 32], 1, "t").unwrap();
        let s = score(&three_no_blue, &actual, &prizes, 2.0);
        assert_eq!(s.red_hits, 3);
        assert_eq!(s.prize, 0.0);
        assert_eq!(s.profit, -2.0);
        assert!(s.is_win());

        let blue_only = Candidate::new(&[1, 3, 5, 8, 10, 12], 9, "t").unwrap();
        let s = score(&blue_only, &actual, &prizes, 2.0);
        assert_eq!(s.prize, 5.0);
        assert_eq!(s.profit, 3.0);
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(2.345_67, 2), 2.35);
        assert_eq!(round_to(1.0 / 3.0, 4), 0.3333);
        assert_eq!(round_to(-12.344, 2), -12.34);
    }

    #[test]
    fn series_metrics() {
        let hits = [3, 4, 0, 3, 3, 3, 1];
        assert_eq!(max_streak(&hits), 3);
        assert!((avg_hit(&hits) - 17.0 / 7.0).abs() < 1e-12);
        assert!((hit_rate(&hits) - 500.0 / 7.0).abs() < 1e-9);
        assert_eq!(max_streak(&[]), 0);
        assert_eq!(hit_rate(&[]), 0.0);
    }

    #[test]
    fn roi_and_drawdown() {
        assert_eq!(roi(-50.0, 100.0), -50.0);
        assert_eq!(roi(10.0, 0.0), 0.0);
        assert_eq!(max_drawdown(&[0.0, 10.0, 4.0, 12.0, 1.0]), 11.0);
        assert_eq!(max_drawdown(&[]), 0.0);
    }
}
