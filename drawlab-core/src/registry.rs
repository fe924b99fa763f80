//! Strategy registry: maps a normalized string code to a constructor.
//!
//! Registration is explicit and happens once: a [`RegistryBuilder`] collects
//! `register::<K>()` calls and [`RegistryBuilder::build`] freezes them into an
//! immutable [`Registry`]. The process-wide standard registry is built lazily
//! by [`global`] and never mutated afterwards.

use std::any::TypeId;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use tracing::{debug, warn};

use crate::domain::HistoricalDraw;
use crate::params::StrategyParams;
use crate::strategy::{
    build_boxed, BayesianPosterior, EntropyBalanced, GeneticSearch, HotCold, Nsga2Search,
    OddEvenBalance, RandomBaseline, SequenceModel, Strategy, StrategyError, StrategyKind,
    TrendTracking,
};

// ─── Error type ──────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown strategy code: {0}")]
    UnknownCode(String),
    #[error(transparent)]
    Strategy(#[from] StrategyError),
}

type Constructor = fn(&[HistoricalDraw], &StrategyParams) -> Result<Box<dyn Strategy>, StrategyError>;

/// Trim and lower-case a strategy code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_lowercase()
}

// ─── Descriptor ──────────────────────────────────────────────────────

/// Everything the registry knows about one strategy type.
#[derive(Debug, Clone)]
pub struct StrategyDescriptor {
    code: String,
    name: &'static str,
    description: &'static str,
    min_history: usize,
    enabled_by_default: bool,
    type_id: TypeId,
    defaults: fn() -> StrategyParams,
    constructor: Constructor,
}

impl StrategyDescriptor {
    fn of<K: StrategyKind>(code: String) -> Self {
        Self {
            code,
            name: K::NAME,
            description: K::DESCRIPTION,
            min_history: K::MIN_HISTORY,
            enabled_by_default: K::ENABLED_BY_DEFAULT,
            type_id: TypeId::of::<K>(),
            defaults: K::default_params,
            constructor: build_boxed::<K>,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    pub fn min_history(&self) -> usize {
        self.min_history
    }

    pub fn enabled_by_default(&self) -> bool {
        self.enabled_by_default
    }

    pub fn default_params(&self) -> StrategyParams {
        (self.defaults)()
    }

    /// Build with `params` layered over the strategy defaults.
    pub fn instantiate(
        &self,
        history: &[HistoricalDraw],
        params: &StrategyParams,
    ) -> Result<Box<dyn Strategy>, StrategyError> {
        (self.constructor)(history, params)
    }
}

// ─── Builder ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: BTreeMap<String, StrategyDescriptor>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `K` under its own code.
    pub fn register<K: StrategyKind>(self) -> Self {
        self.register_as::<K>(K::CODE)
    }

    /// Register `K` under an explicit code.
    pub fn register_as<K: StrategyKind>(mut self, code: &str) -> Self {
        let code = normalize_code(code);
        let descriptor = StrategyDescriptor::of::<K>(code.clone());
        match self.entries.get(&code) {
            Some(existing) if existing.type_id == descriptor.type_id => {
                debug!(code = %code, "strategy already registered");
                return self;
            }
            Some(existing) => {
                warn!(
                    code = %code,
                    old = existing.name,
                    new = descriptor.name,
                    "strategy code re-registered, overwriting"
                );
            }
            None => {}
        }
        self.entries.insert(code, descriptor);
        self
    }

    pub fn build(self) -> Registry {
        Registry {
            entries: self.entries,
        }
    }
}

// ─── Registry ────────────────────────────────────────────────────────

/// Immutable code → descriptor map.
#[derive(Debug, Clone)]
pub struct Registry {
    entries: BTreeMap<String, StrategyDescriptor>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// All nine built-in strategies.
    pub fn standard() -> Self {
        RegistryBuilder::new()
            .register::<RandomBaseline>()
            .register::<HotCold>()
            .register::<OddEvenBalance>()
            .register::<BayesianPosterior>()
            .register::<GeneticSearch>()
            .register::<Nsga2Search>()
            .register::<TrendTracking>()
            .register::<SequenceModel>()
            .register::<EntropyBalanced>()
            .build()
    }

    pub fn get(&self, code: &str) -> Option<&StrategyDescriptor> {
        let found = self.entries.get(&normalize_code(code));
        if found.is_none() {
            warn!(code, "unknown strategy code");
        }
        found
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(&normalize_code(code))
    }

    pub fn codes(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Descriptors in code order.
    pub fn list(&self) -> Vec<&StrategyDescriptor> {
        self.entries.values().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn instantiate(
        &self,
        code: &str,
        history: &[HistoricalDraw],
        params: &StrategyParams,
    ) -> Result<Box<dyn Strategy>, RegistryError> {
        let descriptor = self
            .get(code)
            .ok_or_else(|| RegistryError::UnknownCode(code.to_string()))?;
        Ok(descriptor.instantiate(history, params)?)
    }
}

/// Process-wide standard registry, built on first use.
pub fn global() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(Registry::standard)
}
