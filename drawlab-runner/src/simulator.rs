//! Backtest simulator: replay one strategy over a historical range.
//!
//! For every period after the history window the strategy is rebuilt from
//! the visible prefix, asked for one candidate, and scored against the
//! actual draw with a fixed prize table. A [`BacktestRun`] folds the
//! outcomes into running totals and the ≥3-hit streak; finalizing freezes
//! it into [`BacktestStats`]. Nothing partial is ever returned: an error or
//! cancellation mid-replay discards the run.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use drawlab_core::domain::{Candidate, HistoricalDraw, PeriodId};
use drawlab_core::registry::{Registry, RegistryError};
use drawlab_core::rng::RngHierarchy;

use crate::feed::{FeedError, HistoryFeed, SnapshotError, SnapshotStore};
use crate::metrics::{self, round_to, score};

/// Red hits at or above this count as a win for hit rate and streaks.
pub const WIN_RED_HITS: usize = 3;
pub const DEFAULT_MIN_PERIODS: usize = 50;

// ─── Error type ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("insufficient data: {have} periods in range, need at least {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("bet amount must be positive and finite, got {0}")]
    InvalidBet(f64),

    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error("period {period}: {source}")]
    Strategy {
        period: PeriodId,
        #[source]
        source: RegistryError,
    },

    #[error("cancelled")]
    Cancelled,
}

impl BacktestError {
    /// Errors that retrying cannot fix.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, BacktestError::Feed(_) | BacktestError::Strategy { .. })
    }
}

// ─── Prize table ─────────────────────────────────────────────────────

/// One `(red_hits, blue_hit) → prize` entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrizeTier {
    pub reds: usize,
    pub blue: bool,
    pub prize: f64,
}

/// Prize per `(red_hits, blue_hit)`; combinations without a tier pay nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct PrizeTable {
    tiers: BTreeMap<(usize, bool), f64>,
}

impl Default for PrizeTable {
    fn default() -> Self {
        Self::empty()
            .with_tier(6, true, 5_000_000.0)
            .with_tier(6, false, 1_000_000.0)
            .with_tier(5, true, 300_000.0)
            .with_tier(5, false, 100_000.0)
            .with_tier(4, true, 3_000.0)
            .with_tier(4, false, 200.0)
            .with_tier(3, true, 200.0)
            .with_tier(2, true, 10.0)
            .with_tier(1, true, 5.0)
            .with_tier(0, true, 5.0)
    }
}

impl PrizeTable {
    pub fn empty() -> Self {
        Self {
            tiers: BTreeMap::new(),
        }
    }

    pub fn with_tier(mut self, reds: usize, blue: bool, prize: f64) -> Self {
        self.tiers.insert((reds, blue), prize);
        self
    }

    /// Default table with `overrides` replacing matching tiers.
    pub fn with_overrides(overrides: &[PrizeTier]) -> Self {
        overrides
            .iter()
            .fold(Self::default(), |t, o| t.with_tier(o.reds, o.blue, o.prize))
    }

    pub fn prize(&self, red_hits: usize, blue_hit: bool) -> f64 {
        self.tiers.get(&(red_hits, blue_hit)).copied().unwrap_or(0.0)
    }

    pub fn tiers(&self) -> Vec<PrizeTier> {
        self.tiers
            .iter()
            .map(|(&(reds, blue), &prize)| PrizeTier { reds, blue, prize })
            .collect()
    }
}

// ─── Request / results ───────────────────────────────────────────────

/// What to replay: a parameter snapshot over an inclusive period range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub strategy_version: String,
    pub start: PeriodId,
    pub end: PeriodId,
    pub bet_amount: f64,
}

impl BacktestRequest {
    pub fn new(
        strategy_version: impl Into<String>,
        start: impl Into<PeriodId>,
        end: impl Into<PeriodId>,
        bet_amount: f64,
    ) -> Self {
        Self {
            strategy_version: strategy_version.into(),
            start: start.into(),
            end: end.into(),
            bet_amount,
        }
    }

    /// Content hash of the request.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }

    /// Run id for the `seq`-th submission of this request.
    pub fn run_id(&self, seq: u64) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.fingerprint().as_bytes());
        hasher.update(&seq.to_le_bytes());
        hasher.finalize().to_hex()[..16].to_string()
    }
}

/// One replayed period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodOutcome {
    pub period: PeriodId,
    pub predicted_reds: Vec<u8>,
    pub predicted_blue: u8,
    pub actual_reds: Vec<u8>,
    pub actual_blue: u8,
    pub red_hits: usize,
    pub blue_hit: bool,
    pub prize: f64,
    pub profit: f64,
    pub cumulative_profit: f64,
}

/// Finalized statistics of a completed replay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestStats {
    pub strategy: String,
    pub periods: usize,
    /// Mean red hits per period, 4 dp.
    pub avg_hit: f64,
    /// Percentage of periods with ≥3 red hits, 2 dp.
    pub hit_rate: f64,
    pub total_bet: f64,
    pub total_profit: f64,
    /// `total_profit / total_bet × 100`, 2 dp.
    pub roi: f64,
    pub max_streak: usize,
    pub curve: Vec<PeriodOutcome>,
}

// ─── Accumulating state ──────────────────────────────────────────────

/// Mutable state of one replay, owned by the task driving it.
#[derive(Debug, Clone, Default)]
pub struct BacktestRun {
    cumulative_profit: f64,
    cumulative_bet: f64,
    red_hits: Vec<usize>,
    current_streak: usize,
    max_streak: usize,
    log: Vec<PeriodOutcome>,
}

impl BacktestRun {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score one prediction against the actual draw and fold it in.
    pub fn record(
        &mut self,
        predicted: &Candidate,
        actual: &HistoricalDraw,
        prizes: &PrizeTable,
        bet_amount: f64,
    ) -> &PeriodOutcome {
        let s = score(predicted, actual, prizes, bet_amount);

        self.cumulative_profit += s.profit;
        self.cumulative_bet += bet_amount;
        self.red_hits.push(s.red_hits);
        if s.is_win() {
            self.current_streak += 1;
            self.max_streak = self.max_streak.max(self.current_streak);
        } else {
            self.current_streak = 0;
        }

        self.log.push(PeriodOutcome {
            period: actual.period().clone(),
            predicted_reds: predicted.reds().to_vec(),
            predicted_blue: predicted.blue(),
            actual_reds: actual.reds().to_vec(),
            actual_blue: actual.blue(),
            red_hits: s.red_hits,
            blue_hit: s.blue_hit,
            prize: s.prize,
            profit: s.profit,
            cumulative_profit: self.cumulative_profit,
        });
        &self.log[self.log.len() - 1]
    }

    pub fn periods(&self) -> usize {
        self.log.len()
    }

    pub fn current_streak(&self) -> usize {
        self.current_streak
    }

    pub fn max_streak(&self) -> usize {
        self.max_streak
    }

    pub fn cumulative_profit(&self) -> f64 {
        self.cumulative_profit
    }

    pub fn finalize(self, strategy: &str) -> BacktestStats {
        BacktestStats {
            strategy: strategy.to_string(),
            periods: self.log.len(),
            avg_hit: round_to(metrics::avg_hit(&self.red_hits), 4),
            hit_rate: round_to(metrics::hit_rate(&self.red_hits), 2),
            total_bet: self.cumulative_bet,
            total_profit: self.cumulative_profit,
            roi: round_to(metrics::roi(self.cumulative_profit, self.cumulative_bet), 2),
            max_streak: self.max_streak,
            curve: self.log,
        }
    }
}

// ─── Simulator ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    pub min_periods: usize,
    pub prizes: PrizeTable,
    pub master_seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            min_periods: DEFAULT_MIN_PERIODS,
            prizes: PrizeTable::default(),
            master_seed: 42,
        }
    }
}

pub struct Simulator {
    registry: Arc<Registry>,
    feed: Arc<dyn HistoryFeed>,
    snapshots: Arc<dyn SnapshotStore>,
    config: SimulatorConfig,
}

impl Simulator {
    pub fn new(
        registry: Arc<Registry>,
        feed: Arc<dyn HistoryFeed>,
        snapshots: Arc<dyn SnapshotStore>,
        config: SimulatorConfig,
    ) -> Self {
        Self {
            registry,
            feed,
            snapshots,
            config,
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Replay the request. `cancel` is checked once per period.
    pub fn run(
        &self,
        run_id: &str,
        request: &BacktestRequest,
        cancel: &AtomicBool,
    ) -> Result<BacktestStats, BacktestError> {
        if !(request.bet_amount.is_finite() && request.bet_amount > 0.0) {
            return Err(BacktestError::InvalidBet(request.bet_amount));
        }

        let snapshot = self.snapshots.load(&request.strategy_version)?;
        let descriptor = self
            .registry
            .get(&snapshot.strategy)
            .ok_or_else(|| BacktestError::UnknownStrategy(snapshot.strategy.clone()))?;
        let params = snapshot.params_for(descriptor.code());
        let window = snapshot.history_window;

        let range = self.feed.get_range(&request.start, &request.end)?;
        let need = self.config.min_periods.max(window.saturating_add(1));
        if range.len() < need {
            return Err(BacktestError::InsufficientData {
                have: range.len(),
                need,
            });
        }

        info!(
            run_id,
            strategy = descriptor.code(),
            periods = range.len() - window,
            window,
            "backtest started"
        );

        let rng = RngHierarchy::new(self.config.master_seed);
        let mut run = BacktestRun::new();
        for i in window..range.len() {
            if cancel.load(Ordering::Relaxed) {
                info!(run_id, done = run.periods(), "backtest cancelled");
                return Err(BacktestError::Cancelled);
            }
            let actual = &range[i];
            let strategy = descriptor
                .instantiate(&range[..i], &params)
                .map_err(|e| BacktestError::Strategy {
                    period: actual.period().clone(),
                    source: e.into(),
                })?;
            let mut period_rng = rng.rng_for(run_id, actual.period().as_str(), 0);
            let candidate =
                strategy
                    .generate(&mut period_rng)
                    .map_err(|e| BacktestError::Strategy {
                        period: actual.period().clone(),
                        source: e.into(),
                    })?;
            let outcome = run.record(&candidate, actual, &self.config.prizes, request.bet_amount);
            debug!(
                run_id,
                period = %outcome.period,
                red_hits = outcome.red_hits,
                blue_hit = outcome.blue_hit,
                cumulative = outcome.cumulative_profit,
                "period scored"
            );
        }

        let stats = run.finalize(descriptor.code());
        info!(
            run_id,
            periods = stats.periods,
            hit_rate = stats.hit_rate,
            roi = stats.roi,
            max_streak = stats.max_streak,
            "backtest completed"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drawlab_core::synthetic::draw;

    fn actual(reds: [u8; 6], blue: u8) -> HistoricalDraw {
        draw(2024001, reds, blue).unwrap()
    }

    fn pick(reds: [u8; 6], blue: u8) -> Candidate {
        Candidate::new(&reds, blue, "test").unwrap()
    }

    #[test]
    fn default_prize_table() {
        let t = PrizeTable::default();
        assert_eq!(t.prize(6, true), 5_000_000.0);
        assert_eq!(t.prize(4, false), 200.0);
        assert_eq!(t.prize(3, false), 0.0);
        assert_eq!(t.prize(0, true), 5.0);
        assert_eq!(t.tiers().len(), 10);
    }

    #[test]
    fn prize_overrides_replace_tiers() {
        let t = PrizeTable::with_overrides(&[PrizeTier {
            reds: 3,
            blue: false,
            prize: 5.0,
        }]);
        assert_eq!(t.prize(3, false), 5.0);
        assert_eq!(t.prize(6, true), 5_000_000.0);
    }

    #[test]
    fn record_tracks_profit_and_streaks() {
        let prizes = PrizeTable::default();
        let draw = actual([1, 5, 9, 13, 17, 21], 3);
        let mut run = BacktestRun::new();

        // 4 reds + blue: 3000 - 2
        let out = run.record(&pick([1, 5, 9, 13, 30, 31], 3), &draw, &prizes, 2.0);
        assert_eq!(out.red_hits, 4);
        assert!(out.blue_hit);
        assert_eq!(out.profit, 2998.0);
        assert_eq!(run.current_streak(), 1);

        // miss: -2
        run.record(&pick([2, 6, 10, 14, 18, 22], 4), &draw, &prizes, 2.0);
        assert_eq!(run.current_streak(), 0);
        assert_eq!(run.cumulative_profit(), 2996.0);

        let stats = run.finalize("test");
        assert_eq!(stats.periods, 2);
        assert_eq!(stats.avg_hit, 2.0);
        assert_eq!(stats.hit_rate, 50.0);
        assert_eq!(stats.roi, round_to(2996.0 / 4.0 * 100.0, 2));
        assert_eq!(stats.max_streak, 1);
        assert_eq!(stats.curve[1].cumulative_profit, 2996.0);
    }

    #[test]
    fn alternating_hits_give_streak_of_one() {
        let prizes = PrizeTable::default();
        let draw = actual([1, 5, 9, 13, 17, 21], 3);
        let hit = pick([1, 5, 9, 20, 30, 31], 1);
        let miss = pick([2, 6, 10, 14, 18, 22], 1);
        let mut run = BacktestRun::new();
        for i in 0..20 {
            let c = if i % 2 == 0 { &hit } else { &miss };
            run.record(c, &draw, &prizes, 2.0);
        }
        assert_eq!(run.finalize("test").max_streak, 1);
    }

    #[test]
    fn five_consecutive_hits_give_streak_of_five() {
        let prizes = PrizeTable::default();
        let draw = actual([1, 5, 9, 13, 17, 21], 3);
        let hit = pick([1, 5, 9, 20, 30, 31], 1);
        let miss = pick([2, 6, 10, 14, 18, 22], 1);
        let mut run = BacktestRun::new();
        run.record(&miss, &draw, &prizes, 2.0);
        for _ in 0..5 {
            run.record(&hit, &draw, &prizes, 2.0);
        }
        run.record(&miss, &draw, &prizes, 2.0);
        run.record(&hit, &draw, &prizes, 2.0);
        assert_eq!(run.finalize("test").max_streak, 5);
    }

    #[test]
    fn empty_run_finalizes_to_zeros() {
        let stats = BacktestRun::new().finalize("random");
        assert_eq!(stats.periods, 0);
        assert_eq!(stats.roi, 0.0);
        assert_eq!(stats.hit_rate, 0.0);
    }

    #[test]
    fn run_ids_depend_on_request_and_sequence() {
        let r = BacktestRequest::new("v1", "2024001", "2024080", 2.0);
        assert_eq!(r.run_id(0), r.run_id(0));
        assert_ne!(r.run_id(0), r.run_id(1));
        let other = BacktestRequest::new("v2", "2024001", "2024080", 2.0);
        assert_ne!(r.run_id(0), other.run_id(0));
    }

    #[test]
    fn permanence_classification() {
        assert!(BacktestError::Cancelled.is_permanent());
        assert!(BacktestError::InsufficientData { have: 1, need: 50 }.is_permanent());
        assert!(BacktestError::Snapshot(SnapshotError::NotFound("v".into())).is_permanent());
        assert!(!BacktestError::Feed(FeedError::Unavailable("down".into())).is_permanent());
    }
}
