//! DrawLab Core: draw domain types, constraint policy, strategies, fusion.
//!
//! This crate contains the generation engine:
//! - Domain types (historical draws, candidates, period tokens)
//! - Constraint policy shared by every generator
//! - Layered strategy parameters
//! - Nine strategies behind one `Strategy` trait
//! - Explicit strategy registry
//! - Pareto utilities for multi-objective search
//! - Weighted fusion of several strategies' candidates
//! - Deterministic RNG hierarchy

pub mod constraint;
pub mod domain;
pub mod fusion;
pub mod params;
pub mod pareto;
pub mod registry;
pub mod rng;
pub mod strategy;
pub mod synthetic;

pub use constraint::ConstraintSpec;
pub use domain::{Candidate, HistoricalDraw, PeriodId};
pub use params::StrategyParams;
pub use registry::Registry;
pub use strategy::{Strategy, StrategyError, StrategyKind};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything shared across generation threads is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::HistoricalDraw>();
        require_sync::<domain::HistoricalDraw>();
        require_send::<domain::Candidate>();
        require_sync::<domain::Candidate>();
        require_send::<domain::PeriodId>();
        require_sync::<domain::PeriodId>();

        // Configuration
        require_send::<params::StrategyParams>();
        require_sync::<params::StrategyParams>();
        require_send::<constraint::ConstraintSpec>();
        require_sync::<constraint::ConstraintSpec>();

        // Strategies and registry
        require_send::<Box<dyn strategy::Strategy>>();
        require_sync::<Box<dyn strategy::Strategy>>();
        require_send::<registry::Registry>();
        require_sync::<registry::Registry>();
        require_send::<strategy::GeneticSearch>();
        require_sync::<strategy::GeneticSearch>();
        require_send::<strategy::Nsga2Search>();
        require_sync::<strategy::Nsga2Search>();
        require_send::<strategy::SequenceModel>();
        require_sync::<strategy::SequenceModel>();

        // Errors cross thread boundaries in the runner.
        require_send::<strategy::StrategyError>();
        require_sync::<strategy::StrategyError>();
        require_send::<fusion::FusionError>();
        require_sync::<fusion::FusionError>();
    }

    #[test]
    fn global_registry_builds_every_strategy_on_empty_history() {
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for d in registry::global().list() {
            let s = d.instantiate(&[], &StrategyParams::new()).unwrap();
            let c = s.generate(&mut rng).unwrap();
            assert!(domain::normalize_reds(c.reds()).is_ok(), "{}", d.code());
            assert!((1..=domain::BLUE_MAX).contains(&c.blue()));
        }
    }
}
