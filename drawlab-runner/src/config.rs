//! TOML configuration: `drawlab.toml`.
//!
//! Every section is optional; an empty file yields a usable configuration
//! with no permissions and no snapshots.
//!
//! ```toml
//! [engine]
//! master_seed = 42
//! history_window = 50
//!
//! [history]
//! csv = "data/draws.csv"
//!
//! [backtest]
//! bet_amount = 2.0
//! archive = "runs/backtests.jsonl"
//!
//! [[permissions]]
//! tier = "vip"
//! code = "hot_cold"
//! weight = 1.0
//!
//! [[snapshots]]
//! version = "v1"
//! strategy = "hot_cold"
//! history_window = 30
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use drawlab_core::fusion::{self, Fusion};
use drawlab_core::params::StrategyParams;
use drawlab_core::ConstraintSpec;

use crate::feed::{MemorySnapshots, ParamSnapshot, StaticPermissions, StrategyGrant};
use crate::service::DEFAULT_MAX_RETRIES;
use crate::simulator::{PrizeTable, PrizeTier, SimulatorConfig, DEFAULT_MIN_PERIODS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ─── Sections ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub master_seed: u64,
    /// Draws handed to strategies by `generate`.
    pub history_window: usize,
    pub fusion_max_attempts: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            master_seed: 42,
            history_window: 50,
            fusion_max_attempts: fusion::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub csv: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSection {
    pub bet_amount: f64,
    pub min_periods: usize,
    pub max_retries: u32,
    /// Tiers replacing the matching defaults.
    pub prizes: Vec<PrizeTier>,
    pub archive: Option<PathBuf>,
}

impl Default for BacktestSection {
    fn default() -> Self {
        Self {
            bet_amount: 2.0,
            min_periods: DEFAULT_MIN_PERIODS,
            max_retries: DEFAULT_MAX_RETRIES,
            prizes: Vec::new(),
            archive: None,
        }
    }
}

/// One `[[permissions]]` entry: a strategy granted to a tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub tier: String,
    pub code: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub params: StrategyParams,
}

fn default_weight() -> f64 {
    1.0
}

// ─── Top level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawLabConfig {
    pub engine: EngineConfig,
    pub history: HistoryConfig,
    pub backtest: BacktestSection,
    pub permissions: Vec<PermissionEntry>,
    pub snapshots: Vec<ParamSnapshot>,
}

impl DrawLabConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let bet = self.backtest.bet_amount;
        if !(bet.is_finite() && bet > 0.0) {
            return Err(invalid(format!("backtest.bet_amount must be positive, got {bet}")));
        }
        if self.backtest.min_periods == 0 {
            return Err(invalid("backtest.min_periods must be at least 1"));
        }
        for tier in &self.backtest.prizes {
            if tier.reds > 6 || !(tier.prize.is_finite() && tier.prize >= 0.0) {
                return Err(invalid(format!(
                    "prize tier ({}, {}) is out of range: {}",
                    tier.reds, tier.blue, tier.prize
                )));
            }
        }

        for (i, p) in self.permissions.iter().enumerate() {
            if p.tier.trim().is_empty() {
                return Err(invalid(format!("permissions[{i}]: empty tier")));
            }
            if p.code.trim().is_empty() {
                return Err(invalid(format!("permissions[{i}]: empty strategy code")));
            }
            if !(p.weight.is_finite() && p.weight >= 0.0) {
                return Err(invalid(format!(
                    "permissions[{i}] ({}): weight must be non-negative, got {}",
                    p.code, p.weight
                )));
            }
        }

        let mut versions = BTreeSet::new();
        for s in &self.snapshots {
            if s.version.trim().is_empty() {
                return Err(invalid("snapshot with empty version"));
            }
            if s.strategy.trim().is_empty() {
                return Err(invalid(format!("snapshot '{}': empty strategy", s.version)));
            }
            if !versions.insert(s.version.as_str()) {
                return Err(invalid(format!("duplicate snapshot version '{}'", s.version)));
            }
        }
        Ok(())
    }

    pub fn permissions(&self) -> StaticPermissions {
        self.permissions.iter().fold(StaticPermissions::new(), |acc, p| {
            acc.grant(
                &p.tier,
                StrategyGrant::new(p.code.as_str(), p.weight).with_params(p.params.clone()),
            )
        })
    }

    pub fn snapshots(&self) -> MemorySnapshots {
        self.snapshots
            .iter()
            .cloned()
            .fold(MemorySnapshots::new(), MemorySnapshots::with)
    }

    pub fn prize_table(&self) -> PrizeTable {
        PrizeTable::with_overrides(&self.backtest.prizes)
    }

    pub fn simulator_config(&self) -> SimulatorConfig {
        SimulatorConfig {
            min_periods: self.backtest.min_periods,
            prizes: self.prize_table(),
            master_seed: self.engine.master_seed,
        }
    }

    pub fn fusion(&self) -> Fusion {
        Fusion::new(ConstraintSpec::default()).with_max_attempts(self.engine.fusion_max_attempts)
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}
