//! Collaborator boundaries: history feed, permissions, parameter
//! snapshots and the backtest result sink.
//!
//! Each boundary is a trait with an in-memory implementation. The core only
//! reads history and snapshots; the result sink is the single writer of run
//! state and serializes status transitions behind a mutex.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use drawlab_core::domain::draw::DrawRecord;
use drawlab_core::domain::{DrawError, HistoricalDraw, PeriodId};
use drawlab_core::params::StrategyParams;
use drawlab_core::registry::normalize_code;

use crate::archive::JsonlArchive;
use crate::simulator::{BacktestRequest, BacktestStats};

/// Opaque backtest run identifier.
pub type RunId = String;

// ─── History feed ────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: {source}")]
    Draw {
        row: usize,
        #[source]
        source: DrawError,
    },
    #[error("history feed unavailable: {0}")]
    Unavailable(String),
}

/// Read-only access to historical draws.
pub trait HistoryFeed: Send + Sync {
    /// Draws with `start <= period <= end`, oldest first.
    fn get_range(&self, start: &PeriodId, end: &PeriodId) -> Result<Vec<HistoricalDraw>, FeedError>;

    /// The `n` most recent draws, most recent first.
    fn get_last_n(&self, n: usize) -> Result<Vec<HistoricalDraw>, FeedError>;
}

/// History held in memory, sorted by period with duplicate periods dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    draws: Vec<HistoricalDraw>,
}

impl MemoryHistory {
    pub fn new(mut draws: Vec<HistoricalDraw>) -> Self {
        draws.sort_by(|a, b| a.period().cmp(b.period()));
        let before = draws.len();
        draws.dedup_by(|a, b| a.period() == b.period());
        if draws.len() != before {
            warn!(dropped = before - draws.len(), "duplicate periods in history");
        }
        Self { draws }
    }

    /// Load `qi_shu,red1..red6,blue,open_time` rows.
    pub fn from_csv(path: &Path) -> Result<Self, FeedError> {
        let file = File::open(path).map_err(|source| FeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let history = Self::from_reader(file)?;
        info!(path = %path.display(), draws = history.len(), "loaded history");
        Ok(history)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, FeedError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut draws = Vec::new();
        for (i, row) in rdr.deserialize::<DrawRecord>().enumerate() {
            // Row numbers count the header as row 1.
            let draw = HistoricalDraw::try_from(row?)
                .map_err(|source| FeedError::Draw { row: i + 2, source })?;
            draws.push(draw);
        }
        Ok(Self::new(draws))
    }

    /// Write the history back out in the same CSV layout.
    pub fn write_csv(&self, path: &Path) -> Result<(), FeedError> {
        let mut wtr = csv::Writer::from_path(path)?;
        for d in &self.draws {
            wtr.serialize(DrawRecord::from(d.clone()))?;
        }
        wtr.flush().map_err(|source| FeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    pub fn draws(&self) -> &[HistoricalDraw] {
        &self.draws
    }

    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }

    pub fn find(&self, period: &PeriodId) -> Option<&HistoricalDraw> {
        self.draws
            .binary_search_by(|d| d.period().cmp(period))
            .ok()
            .map(|i| &self.draws[i])
    }
}

impl HistoryFeed for MemoryHistory {
    fn get_range(&self, start: &PeriodId, end: &PeriodId) -> Result<Vec<HistoricalDraw>, FeedError> {
        Ok(self
            .draws
            .iter()
            .filter(|d| d.period() >= start && d.period() <= end)
            .cloned()
            .collect())
    }

    fn get_last_n(&self, n: usize) -> Result<Vec<HistoricalDraw>, FeedError> {
        Ok(self.draws.iter().rev().take(n).cloned().collect())
    }
}

// ─── Permissions ─────────────────────────────────────────────────────

/// One strategy a tier may use, with its fusion weight and parameter overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyGrant {
    pub code: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub params: StrategyParams,
}

fn default_weight() -> f64 {
    1.0
}

impl StrategyGrant {
    pub fn new(code: impl Into<String>, weight: f64) -> Self {
        Self {
            code: code.into(),
            weight,
            params: StrategyParams::new(),
        }
    }

    pub fn with_params(mut self, params: StrategyParams) -> Self {
        self.params = params;
        self
    }
}

/// Maps an access tier to its permitted strategies. An empty list means
/// "no permission", not an error.
pub trait PermissionResolver: Send + Sync {
    fn permitted_strategies(&self, tier: &str) -> Vec<StrategyGrant>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticPermissions {
    tiers: BTreeMap<String, Vec<StrategyGrant>>,
}

impl StaticPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, tier: &str, grant: StrategyGrant) -> Self {
        self.insert(tier, grant);
        self
    }

    pub fn insert(&mut self, tier: &str, grant: StrategyGrant) {
        self.tiers.entry(normalize_code(tier)).or_default().push(grant);
    }

    pub fn tiers(&self) -> impl Iterator<Item = &str> {
        self.tiers.keys().map(String::as_str)
    }
}

impl PermissionResolver for StaticPermissions {
    fn permitted_strategies(&self, tier: &str) -> Vec<StrategyGrant> {
        self.tiers.get(&normalize_code(tier)).cloned().unwrap_or_default()
    }
}

// ─── Parameter snapshots ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotError {
    #[error("parameter snapshot '{0}' not found")]
    NotFound(String),
    #[error("parameter snapshot '{version}' is invalid: {reason}")]
    Invalid { version: String, reason: String },
}

/// A named, versioned parameter set for backtests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSnapshot {
    pub version: String,
    pub strategy: String,
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default)]
    pub params: StrategyParams,
    /// Per-strategy overrides, keyed by strategy code.
    #[serde(default)]
    pub overrides: BTreeMap<String, StrategyParams>,
}

fn default_history_window() -> usize {
    50
}

impl ParamSnapshot {
    pub fn new(version: impl Into<String>, strategy: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            strategy: strategy.into(),
            history_window: default_history_window(),
            params: StrategyParams::new(),
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_params(mut self, params: StrategyParams) -> Self {
        self.params = params;
        self
    }

    /// Flat params with the strategy's own overrides on top.
    pub fn params_for(&self, code: &str) -> StrategyParams {
        let code = normalize_code(code);
        match self.overrides.iter().find(|(k, _)| normalize_code(k) == code) {
            Some((_, o)) => self.params.overlay(o),
            None => self.params.clone(),
        }
    }
}

pub trait SnapshotStore: Send + Sync {
    fn load(&self, version: &str) -> Result<ParamSnapshot, SnapshotError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemorySnapshots {
    snapshots: BTreeMap<String, ParamSnapshot>,
}

impl MemorySnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, snapshot: ParamSnapshot) -> Self {
        self.insert(snapshot);
        self
    }

    pub fn insert(&mut self, snapshot: ParamSnapshot) {
        self.snapshots.insert(snapshot.version.clone(), snapshot);
    }
}

impl SnapshotStore for MemorySnapshots {
    fn load(&self, version: &str) -> Result<ParamSnapshot, SnapshotError> {
        self.snapshots
            .get(version)
            .cloned()
            .ok_or_else(|| SnapshotError::NotFound(version.to_string()))
    }
}

// ─── Result sink ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_final(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

/// Persisted state of one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub request: BacktestRequest,
    /// Strategy code, known once the run's snapshot has been resolved.
    #[serde(default)]
    pub strategy: Option<String>,
    pub status: RunStatus,
    pub attempts: u32,
    pub stats: Option<BacktestStats>,
    pub error: Option<String>,
    pub created_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
}

impl RunRecord {
    /// Strategy code, or the snapshot version while it is unknown.
    pub fn strategy(&self) -> &str {
        self.strategy
            .as_deref()
            .unwrap_or(&self.request.strategy_version)
    }

    pub fn with_strategy(mut self, code: impl Into<String>) -> Self {
        self.strategy = Some(code.into());
        self
    }
}

/// Single writer of run state. Final states are sticky: once a run is
/// completed or failed, later transitions are ignored and reported as `false`.
pub trait ResultSink: Send + Sync {
    fn create(&self, request: &BacktestRequest) -> RunId;
    fn mark_running(&self, run_id: &str, attempt: u32) -> bool;
    fn finalize(&self, run_id: &str, stats: BacktestStats) -> bool;
    fn fail(&self, run_id: &str, reason: &str) -> bool;
    fn get(&self, run_id: &str) -> Option<RunRecord>;
}

#[derive(Debug, Default)]
pub struct MemoryResultSink {
    runs: Mutex<BTreeMap<RunId, RunRecord>>,
    counter: AtomicU64,
    archive: Option<JsonlArchive>,
}

impl MemoryResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also append every finalized or failed record to a JSONL archive.
    pub fn with_archive(mut self, archive: JsonlArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    fn runs(&self) -> MutexGuard<'_, BTreeMap<RunId, RunRecord>> {
        // A panic while holding the lock cannot leave a record half-written.
        self.runs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, run_id: &str, apply: impl FnOnce(&mut RunRecord)) -> bool {
        let finished = {
            let mut runs = self.runs();
            let Some(record) = runs.get_mut(run_id) else {
                warn!(run_id, "transition for unknown run");
                return false;
            };
            if record.status.is_final() {
                debug!(run_id, status = ?record.status, "run already final, ignoring");
                return false;
            }
            apply(record);
            record.status.is_final().then(|| record.clone())
        };

        // Archive outside the lock; the in-memory record is already final.
        if let (Some(record), Some(archive)) = (finished, &self.archive) {
            if let Err(e) = archive.append(&record) {
                warn!(run_id, error = %e, "failed to archive run record");
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.runs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs().is_empty()
    }
}

impl ResultSink for MemoryResultSink {
    fn create(&self, request: &BacktestRequest) -> RunId {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let run_id = request.run_id(seq);
        let record = RunRecord {
            run_id: run_id.clone(),
            request: request.clone(),
            strategy: None,
            status: RunStatus::Pending,
            attempts: 0,
            stats: None,
            error: None,
            created_at: Utc::now().naive_utc(),
            finished_at: None,
        };
        self.runs().insert(run_id.clone(), record);
        run_id
    }

    fn mark_running(&self, run_id: &str, attempt: u32) -> bool {
        self.transition(run_id, |r| {
            r.status = RunStatus::Running;
            r.attempts = attempt;
        })
    }

    fn finalize(&self, run_id: &str, stats: BacktestStats) -> bool {
        self.transition(run_id, |r| {
            r.status = RunStatus::Completed;
            r.strategy = Some(stats.strategy.clone());
            r.stats = Some(stats);
            r.error = None;
            r.finished_at = Some(Utc::now().naive_utc());
        })
    }

    fn fail(&self, run_id: &str, reason: &str) -> bool {
        self.transition(run_id, |r| {
            r.status = RunStatus::Failed;
            r.stats = None;
            r.error = Some(reason.to_string());
            r.finished_at = Some(Utc::now().naive_utc());
        })
    }

    fn get(&self, run_id: &str) -> Option<RunRecord> {
        self.runs().get(run_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drawlab_core::synthetic::{draw, synthetic_history};

    fn request() -> BacktestRequest {
        BacktestRequest::new("v1", "2024001", "2024080", 2.0)
    }

    #[test]
    fn memory_history_orders_and_slices() {
        let mut draws = synthetic_history(10, 1);
        draws.reverse();
        let history = MemoryHistory::new(draws);
        assert_eq!(history.draws()[0].period().as_str(), "2024001");

        let last = history.get_last_n(3).unwrap();
        assert_eq!(last.len(), 3);
        assert_eq!(last[0].period().as_str(), "2024010");
        assert_eq!(last[2].period().as_str(), "2024008");

        let range = history
            .get_range(&PeriodId::from("2024003"), &PeriodId::from("2024005"))
            .unwrap();
        let periods: Vec<&str> = range.iter().map(|d| d.period().as_str()).collect();
        assert_eq!(periods, vec!["2024003", "2024004", "2024005"]);
    }

    #[test]
    fn duplicate_periods_are_dropped() {
        let a = draw(2024001, [1, 5, 9, 13, 17, 21], 1).unwrap();
        let b = draw(2024001, [2, 6, 10, 14, 18, 22], 2).unwrap();
        assert_eq!(MemoryHistory::new(vec![a, b]).len(), 1);
    }

    #[test]
    fn csv_round_trip_through_file() {
        let history = MemoryHistory::new(synthetic_history(12, 3));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        history.write_csv(&path).unwrap();
        let loaded = MemoryHistory::from_csv(&path).unwrap();
        assert_eq!(loaded.draws(), history.draws());
    }

    #[test]
    fn csv_rejects_invalid_rows() {
        let data = "qi_shu,red1,red2,red3,red4,red5,red6,blue,open_time\n\
                    2024001,1,2,3,4,5,6,7,2024-01-02T21:15:00\n\
                    2024002,1,1,3,4,5,6,7,2024-01-04T21:15:00\n";
        let err = MemoryHistory::from_reader(data.as_bytes()).unwrap_err();
        assert!(matches!(err, FeedError::Draw { row: 3, .. }), "{err}");
    }

    #[test]
    fn permissions_are_normalized_by_tier() {
        let perms = StaticPermissions::new()
            .grant("VIP", StrategyGrant::new("hot_cold", 0.6))
            .grant("vip", StrategyGrant::new("bayesian_model", 0.4));
        assert_eq!(perms.permitted_strategies(" vip ").len(), 2);
        assert!(perms.permitted_strategies("normal").is_empty());
    }

    #[test]
    fn snapshot_overrides_layer_over_params() {
        let mut snap = ParamSnapshot::new("v1", "hot_cold")
            .with_params(StrategyParams::new().with("max_attempts", 10).with("recent_periods", 8));
        snap.overrides.insert(
            "HOT_COLD".into(),
            StrategyParams::new().with("recent_periods", 12),
        );
        let p = snap.params_for("hot_cold");
        assert_eq!(p.usize("recent_periods").unwrap(), 12);
        assert_eq!(p.usize("max_attempts").unwrap(), 10);

        let store = MemorySnapshots::new().with(snap);
        assert!(store.load("v1").is_ok());
        assert_eq!(store.load("v2"), Err(SnapshotError::NotFound("v2".into())));
    }

    #[test]
    fn sink_final_states_are_sticky() {
        let sink = MemoryResultSink::new();
        let id = sink.create(&request());
        assert_eq!(sink.get(&id).unwrap().status, RunStatus::Pending);
        assert!(sink.mark_running(&id, 1));
        assert!(sink.fail(&id, "boom"));
        assert!(!sink.finalize(&id, BacktestStats::default()));
        let record = sink.get(&id).unwrap();
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("boom"));
        assert!(record.stats.is_none());
    }

    #[test]
    fn identical_requests_get_distinct_ids() {
        let sink = MemoryResultSink::new();
        let a = sink.create(&request());
        let b = sink.create(&request());
        assert_ne!(a, b);
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn finalized_runs_are_archived() {
        let dir = tempfile::tempdir().unwrap();
        let archive = JsonlArchive::new(dir.path().join("runs.jsonl"));
        let sink = MemoryResultSink::new().with_archive(archive.clone());
        let id = sink.create(&request());
        sink.mark_running(&id, 1);
        sink.finalize(&id, BacktestStats::default());
        sink.finalize(&id, BacktestStats::default());
        let records = archive.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].run_id, id);
    }

    #[test]
    fn concurrent_finishes_archive_each_run_once() {
        let dir = tempfile::tempdir().unwrap();
        let archive = JsonlArchive::new(dir.path().join("runs.jsonl"));
        let sink = MemoryResultSink::new().with_archive(archive.clone());
        let ids: Vec<RunId> = (0..16).map(|_| sink.create(&request())).collect();

        std::thread::scope(|scope| {
            for (i, id) in ids.iter().enumerate() {
                let sink = &sink;
                scope.spawn(move || {
                    sink.mark_running(id, 1);
                    if i % 2 == 0 {
                        sink.finalize(id, BacktestStats::default());
                    } else {
                        sink.fail(id, "boom");
                    }
                    assert!(sink.get(id).unwrap().status.is_final());
                });
            }
        });

        let records = archive.read_all().unwrap();
        assert_eq!(records.len(), ids.len());
        for record in &records {
            assert_eq!(sink.get(&record.run_id).as_ref(), Some(record));
        }
    }
}
