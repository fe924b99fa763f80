//! DrawLab Runner: selection, backtesting and the run/poll service.
//!
//! This crate builds on `drawlab-core` to provide:
//! - Collaborator traits (history feed, permissions, snapshots, result sink)
//!   with in-memory and CSV/JSONL-backed implementations
//! - Selection manager with a total fallback chain
//! - Backtest simulator and prize-table scoring
//! - Background backtest service with cancellation and bounded retries
//! - TOML configuration

pub mod archive;
pub mod config;
pub mod feed;
pub mod metrics;
pub mod selection;
pub mod service;
pub mod simulator;

pub use archive::{summary_by_strategy, JsonlArchive, StrategySummary};
pub use config::{ConfigError, DrawLabConfig};
pub use feed::{
    FeedError, HistoryFeed, MemoryHistory, MemoryResultSink, MemorySnapshots, ParamSnapshot,
    PermissionResolver, ResultSink, RunId, RunRecord, RunStatus, SnapshotError, SnapshotStore,
    StaticPermissions, StrategyGrant,
};
pub use metrics::Score;
pub use selection::{ModelUsed, Recommendation, SelectionManager};
pub use service::BacktestService;
pub use simulator::{
    BacktestError, BacktestRequest, BacktestRun, BacktestStats, PeriodOutcome, PrizeTable,
    Simulator, SimulatorConfig,
};
