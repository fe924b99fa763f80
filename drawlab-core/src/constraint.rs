//! Constraint policy: shared structural acceptance rules for red combinations.
//!
//! The policy is a pure predicate: it never repairs a candidate. Rules are
//! checked in a fixed priority order and the first failure rejects:
//! 1. odd-count bounds
//! 2. sum bounds
//! 3. longest run of consecutive values
//! 4. zone occupancy (only when `require_zones` is set)

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::params::{ParamError, StrategyParams};

/// Inclusive zone bounds partitioning `1..=33` into three equal zones.
pub const ZONES: [(u8, u8); 3] = [(1, 11), (12, 22), (23, 33)];

/// Numeric bounds of the constraint policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSpec {
    pub min_odd_count: usize,
    pub max_odd_count: usize,
    pub min_sum: u32,
    pub max_sum: u32,
    /// Longest allowed run of consecutive values (a pair is a run of 2).
    pub max_consecutive: usize,
    pub require_zones: bool,
}

impl Default for ConstraintSpec {
    fn default() -> Self {
        Self {
            min_odd_count: 2,
            max_odd_count: 4,
            min_sum: 70,
            max_sum: 140,
            max_consecutive: 2,
            require_zones: false,
        }
    }
}

impl ConstraintSpec {
    /// Default constraint keys, merged into every strategy's defaults.
    pub fn default_params() -> StrategyParams {
        let d = Self::default();
        StrategyParams::new()
            .with("min_odd_count", d.min_odd_count)
            .with("max_odd_count", d.max_odd_count)
            .with("min_sum", d.min_sum)
            .with("max_sum", d.max_sum)
            .with("max_consecutive", d.max_consecutive)
            .with("require_zones", d.require_zones)
    }

    pub fn from_params(params: &StrategyParams) -> Result<Self, ParamError> {
        Ok(Self {
            min_odd_count: params.usize("min_odd_count")?,
            max_odd_count: params.usize("max_odd_count")?,
            min_sum: params.usize("min_sum")? as u32,
            max_sum: params.usize("max_sum")? as u32,
            max_consecutive: params.usize("max_consecutive")?,
            require_zones: params.bool("require_zones")?,
        })
    }

    pub fn with_zones(mut self) -> Self {
        self.require_zones = true;
        self
    }

    /// Replace the odd-count window, clamped to `0..=6`.
    pub fn with_odd_window(mut self, min: usize, max: usize) -> Self {
        self.min_odd_count = min.min(6);
        self.max_odd_count = max.min(6);
        self
    }
}

/// The first rule a combination failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    OddCount(usize),
    Sum(u32),
    ConsecutiveRun(usize),
    EmptyZone(usize),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::OddCount(n) => write!(f, "odd count {n} out of bounds"),
            Rejection::Sum(s) => write!(f, "sum {s} out of bounds"),
            Rejection::ConsecutiveRun(len) => write!(f, "run of {len} consecutive values"),
            Rejection::EmptyZone(z) => write!(f, "zone {} empty", z + 1),
        }
    }
}

/// Check a red combination against the policy.
pub fn accepts(reds: &[u8], spec: &ConstraintSpec) -> bool {
    rejection(reds, spec).is_none()
}

/// Report the first failing rule, if any.
pub fn rejection(reds: &[u8], spec: &ConstraintSpec) -> Option<Rejection> {
    let odd = odd_count(reds);
    if odd < spec.min_odd_count || odd > spec.max_odd_count {
        return Some(Rejection::OddCount(odd));
    }

    let sum = red_sum(reds);
    if sum < spec.min_sum || sum > spec.max_sum {
        return Some(Rejection::Sum(sum));
    }

    let run = longest_run(reds);
    if run > spec.max_consecutive {
        return Some(Rejection::ConsecutiveRun(run));
    }

    if spec.require_zones {
        let counts = zone_counts(reds);
        if let Some(empty) = counts.iter().position(|&c| c == 0) {
            return Some(Rejection::EmptyZone(empty));
        }
    }

    None
}

pub fn odd_count(reds: &[u8]) -> usize {
    reds.iter().filter(|&&r| r % 2 == 1).count()
}

pub fn red_sum(reds: &[u8]) -> u32 {
    reds.iter().map(|&r| r as u32).sum()
}

fn sorted(reds: &[u8]) -> Vec<u8> {
    let mut v = reds.to_vec();
    v.sort_unstable();
    v
}

/// Length (in values) of the longest run of consecutive integers.
pub fn longest_run(reds: &[u8]) -> usize {
    let v = sorted(reds);
    if v.is_empty() {
        return 0;
    }
    let mut best = 1;
    let mut current = 1;
    for w in v.windows(2) {
        if w[1] == w[0] + 1 {
            current += 1;
            best = best.max(current);
        } else {
            current = 1;
        }
    }
    best
}

/// Number of adjacent pairs `(x, x+1)` present, across all runs.
pub fn adjacent_pairs(reds: &[u8]) -> usize {
    sorted(reds).windows(2).filter(|w| w[1] == w[0] + 1).count()
}

/// Zone index (0, 1, 2) of a red value.
pub fn zone_of(n: u8) -> usize {
    ZONES
        .iter()
        .position(|&(lo, hi)| (lo..=hi).contains(&n))
        .unwrap_or(ZONES.len() - 1)
}

pub fn zone_counts(reds: &[u8]) -> [usize; 3] {
    let mut counts = [0usize; 3];
    for &r in reds {
        counts[zone_of(r)] += 1;
    }
    counts
}

/// Number of zones holding at least one value.
pub fn zone_coverage(reds: &[u8]) -> usize {
    zone_counts(reds).iter().filter(|&&c| c > 0).count()
}
