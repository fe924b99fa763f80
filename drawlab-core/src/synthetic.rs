//! Synthetic draw histories for tests, benchmarks and demo runs.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::domain::{DrawError, HistoricalDraw, PeriodId, RED_COUNT};
use crate::strategy::{random_reds, uniform_blue};

/// First period token of every synthetic history.
pub const FIRST_PERIOD: u32 = 2024001;

fn base_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 2)
        .and_then(|d| d.and_hms_opt(21, 15, 0))
        .unwrap_or_default()
}

/// Open time of the `index`-th synthetic draw (two draws a week, roughly).
pub fn open_time(index: usize) -> NaiveDateTime {
    base_time() + Duration::days(index as i64 * 2)
}

/// A single draw with a numeric period token.
pub fn draw(period: u32, reds: [u8; RED_COUNT], blue: u8) -> Result<HistoricalDraw, DrawError> {
    let index = period.saturating_sub(FIRST_PERIOD) as usize;
    HistoricalDraw::new(PeriodId::from(period), reds, blue, open_time(index))
}

/// `n` uniformly random draws with consecutive period tokens, oldest first.
pub fn synthetic_history(n: usize, seed: u64) -> Vec<HistoricalDraw> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .filter_map(|i| {
            let reds = random_reds(&mut rng);
            let mut fixed = [0u8; RED_COUNT];
            fixed.copy_from_slice(&reds);
            let blue = uniform_blue(&mut rng);
            draw(FIRST_PERIOD + i as u32, fixed, blue).ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_ordered_and_reproducible() {
        let a = synthetic_history(30, 7);
        let b = synthetic_history(30, 7);
        assert_eq!(a, b);
        assert_eq!(a.len(), 30);
        assert!(a.windows(2).all(|w| w[0].period() < w[1].period()));
        assert!(a.windows(2).all(|w| w[0].opened_at() < w[1].opened_at()));
        assert_eq!(a[0].period().as_str(), "2024001");
    }
}
