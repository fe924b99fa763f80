//! Selection manager: pick strategies for a caller tier and produce one
//! recommendation.
//!
//! The fallback chain is total: missing history, no permissions, unknown
//! codes, failing constructors and failing or panicking generators all end
//! in the random baseline, so `generate_for` never returns an error.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use drawlab_core::constraint::ConstraintSpec;
use drawlab_core::domain::{Candidate, HistoricalDraw};
use drawlab_core::fusion::Fusion;
use drawlab_core::params::StrategyParams;
use drawlab_core::registry::Registry;
use drawlab_core::rng::RngHierarchy;
use drawlab_core::strategy::random::RandomBaseline;
use drawlab_core::strategy::{Strategy, StrategyKind};

use crate::feed::{HistoryFeed, PermissionResolver, StrategyGrant};
use crate::service::panic_message;

/// How a recommendation was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelUsed {
    Fallback { reason: String },
    Single { code: String, weight: f64 },
    Fusion { codes: Vec<String>, weights: Vec<f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub candidate: Candidate,
    pub model_used: ModelUsed,
    /// Draws the strategies saw.
    pub history_len: usize,
}

/// A permitted strategy, built and ready to generate.
struct Resolved {
    code: String,
    weight: f64,
    strategy: Box<dyn Strategy>,
}

pub struct SelectionManager {
    registry: Arc<Registry>,
    feed: Arc<dyn HistoryFeed>,
    permissions: Arc<dyn PermissionResolver>,
    caller_params: StrategyParams,
    fusion: Fusion,
    rng: RngHierarchy,
    calls: AtomicU64,
}

impl SelectionManager {
    pub fn new(
        registry: Arc<Registry>,
        feed: Arc<dyn HistoryFeed>,
        permissions: Arc<dyn PermissionResolver>,
        master_seed: u64,
    ) -> Self {
        Self {
            registry,
            feed,
            permissions,
            caller_params: StrategyParams::new(),
            fusion: Fusion::new(ConstraintSpec::default()),
            rng: RngHierarchy::new(master_seed),
            calls: AtomicU64::new(0),
        }
    }

    /// Overrides applied on top of every permission's own parameters.
    pub fn with_caller_params(mut self, params: StrategyParams) -> Self {
        self.caller_params = params;
        self
    }

    pub fn with_fusion(mut self, fusion: Fusion) -> Self {
        self.fusion = fusion;
        self
    }

    /// One recommendation for `tier` from the last `window` draws.
    pub fn generate_for(&self, tier: &str, window: usize) -> Recommendation {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);

        let history = self.load_history(window);
        if history.is_empty() {
            return self.fallback(tier, call, 0, "no history available");
        }

        let grants = self.permissions.permitted_strategies(tier);
        if grants.is_empty() {
            return self.fallback(tier, call, history.len(), "no strategies permitted for tier");
        }

        let resolved = self.resolve(tier, &history, grants);
        let history_len = history.len();

        match resolved.len() {
            0 => self.fallback(tier, call, history_len, "no permitted strategy could be built"),
            1 => {
                let r = &resolved[0];
                match self.generate_one(tier, call, r) {
                    Some(candidate) => {
                        info!(tier, code = %r.code, "single strategy recommendation");
                        Recommendation {
                            candidate,
                            model_used: ModelUsed::Single {
                                code: r.code.clone(),
                                weight: r.weight,
                            },
                            history_len,
                        }
                    }
                    None => self.fallback(tier, call, history_len, "strategy generation failed"),
                }
            }
            _ => self.fuse(tier, call, history_len, &resolved),
        }
    }

    /// Last `window` draws in chronological order; feed errors read as empty.
    fn load_history(&self, window: usize) -> Vec<HistoricalDraw> {
        match self.feed.get_last_n(window) {
            Ok(mut draws) => {
                draws.reverse();
                draws
            }
            Err(e) => {
                warn!(error = %e, "history feed failed");
                Vec::new()
            }
        }
    }

    fn resolve(
        &self,
        tier: &str,
        history: &[HistoricalDraw],
        grants: Vec<StrategyGrant>,
    ) -> Vec<Resolved> {
        let mut resolved = Vec::with_capacity(grants.len());
        for grant in grants {
            let Some(descriptor) = self.registry.get(&grant.code) else {
                warn!(tier, code = %grant.code, "permitted strategy is not registered, skipping");
                continue;
            };
            let params = grant.params.overlay(&self.caller_params);
            match descriptor.instantiate(history, &params) {
                Ok(strategy) => resolved.push(Resolved {
                    code: descriptor.code().to_string(),
                    weight: grant.weight,
                    strategy,
                }),
                Err(e) => {
                    error!(tier, code = descriptor.code(), error = %e, "strategy construction failed, skipping");
                }
            }
        }
        resolved
    }

    /// One candidate from `r` with its own seed; errors and panics read as `None`.
    fn generate_one(&self, tier: &str, call: u64, r: &Resolved) -> Option<Candidate> {
        let mut rng = self.rng.rng_for(tier, &r.code, call);
        match panic::catch_unwind(AssertUnwindSafe(|| r.strategy.generate(&mut rng))) {
            Ok(Ok(candidate)) => Some(candidate),
            Ok(Err(e)) => {
                error!(tier, code = %r.code, error = %e, "generation failed, dropping");
                None
            }
            Err(payload) => {
                error!(
                    tier,
                    code = %r.code,
                    panic = %panic_message(payload.as_ref()),
                    "strategy panicked, dropping"
                );
                None
            }
        }
    }

    fn fuse(&self, tier: &str, call: u64, history_len: usize, resolved: &[Resolved]) -> Recommendation {
        let mut generated: Vec<(String, f64, Candidate)> = resolved
            .par_iter()
            .filter_map(|r| {
                self.generate_one(tier, call, r)
                    .map(|c| (r.code.clone(), r.weight, c))
            })
            .collect();

        if generated.is_empty() {
            return self.fallback(tier, call, history_len, "every strategy failed to generate");
        }
        if generated.len() == 1 {
            if let Some((code, weight, candidate)) = generated.pop() {
                return Recommendation {
                    candidate,
                    model_used: ModelUsed::Single { code, weight },
                    history_len,
                };
            }
        }

        let codes: Vec<String> = generated.iter().map(|(c, _, _)| c.clone()).collect();
        let weights: Vec<f64> = generated.iter().map(|(_, w, _)| *w).collect();
        let results: Vec<Candidate> = generated.into_iter().map(|(_, _, c)| c).collect();

        let mut rng = self.rng.rng_for(tier, "fusion", call);
        match self.fusion.combine(&results, &weights, &mut rng) {
            Ok(candidate) => {
                info!(tier, strategies = codes.len(), "fused recommendation");
                Recommendation {
                    candidate,
                    model_used: ModelUsed::Fusion { codes, weights },
                    history_len,
                }
            }
            Err(e) => {
                error!(tier, error = %e, "fusion failed");
                self.fallback(tier, call, history_len, "fusion failed")
            }
        }
    }

    fn fallback(&self, tier: &str, call: u64, history_len: usize, reason: &str) -> Recommendation {
        debug!(tier, reason, "falling back to random baseline");
        let mut rng = self.rng.rng_for(tier, RandomBaseline::CODE, call);
        let candidate = RandomBaseline::standard()
            .generate(&mut rng)
            .unwrap_or_else(|_| Candidate::random(&mut rng, "Random baseline"))
            .with_meta("strategy", RandomBaseline::CODE)
            .with_meta("fallback_reason", reason);
        Recommendation {
            candidate,
            model_used: ModelUsed::Fallback {
                reason: reason.to_string(),
            },
            history_len,
        }
    }
}
