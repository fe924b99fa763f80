//! Fusion engine: combine several strategies' candidates into one.
//!
//! Each red scores the normalized weight of every candidate that contains
//! it. The top six by score win if they pass the constraint policy;
//! otherwise reds are resampled score-proportionally from the union of the
//! inputs, and as a last resort the heaviest input is returned unchanged.
//! Blue is the weighted-majority blue.

use std::collections::BTreeMap;

use rand::RngCore;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::constraint::{self, ConstraintSpec};
use crate::domain::{Candidate, NumberError, BLUE_MAX, RED_COUNT, RED_MAX};
use crate::strategy::{top_k, weighted_distinct};

pub const DEFAULT_MAX_ATTEMPTS: usize = 30;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FusionError {
    #[error("nothing to fuse")]
    Empty,
    #[error("{results} candidates but {weights} weights")]
    LengthMismatch { results: usize, weights: usize },
    #[error("weight {index} is invalid: {value}")]
    InvalidWeight { index: usize, value: f64 },
    #[error(transparent)]
    Numbers(#[from] NumberError),
}

/// Which step produced the fused reds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionPath {
    Vote,
    Resample,
    Heaviest,
}

impl FusionPath {
    pub fn as_str(self) -> &'static str {
        match self {
            FusionPath::Vote => "vote",
            FusionPath::Resample => "resample",
            FusionPath::Heaviest => "heaviest",
        }
    }
}

/// Normalized weights; all-zero input becomes uniform.
pub fn normalize_weights(weights: &[f64]) -> Result<Vec<f64>, FusionError> {
    for (index, &value) in weights.iter().enumerate() {
        if !value.is_finite() || value < 0.0 {
            return Err(FusionError::InvalidWeight { index, value });
        }
    }
    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        Ok(weights.iter().map(|w| w / total).collect())
    } else {
        Ok(vec![1.0 / weights.len() as f64; weights.len()])
    }
}

/// Per-red vote scores; index `n - 1` holds the score of `n`.
pub fn red_scores(results: &[Candidate], weights: &[f64]) -> [f64; RED_MAX as usize] {
    let mut scores = [0.0; RED_MAX as usize];
    for (c, w) in results.iter().zip(weights) {
        for &r in c.reds() {
            scores[(r - 1) as usize] += w;
        }
    }
    scores
}

pub fn blue_scores(results: &[Candidate], weights: &[f64]) -> [f64; BLUE_MAX as usize] {
    let mut scores = [0.0; BLUE_MAX as usize];
    for (c, w) in results.iter().zip(weights) {
        scores[(c.blue() - 1) as usize] += w;
    }
    scores
}

/// Index of the heaviest input, first on ties.
fn heaviest(weights: &[f64]) -> usize {
    weights
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &w)| if w > best.1 { (i, w) } else { best })
        .0
}

fn majority_blue(results: &[Candidate], weights: &[f64]) -> u8 {
    let scores = blue_scores(results, weights);
    let best = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    // Among tied blues, follow the heaviest candidate holding one.
    let mut pick: Option<(u8, f64)> = None;
    for (c, &w) in results.iter().zip(weights) {
        let tied = (scores[(c.blue() - 1) as usize] - best).abs() < 1e-12;
        if tied && pick.map_or(true, |(_, pw)| w > pw) {
            pick = Some((c.blue(), w));
        }
    }
    pick.map_or(1, |(b, _)| b)
}

fn score_map(scores: &[f64]) -> Value {
    let map: BTreeMap<String, Value> = scores
        .iter()
        .enumerate()
        .filter(|(_, &s)| s > 0.0)
        .map(|(i, &s)| ((i + 1).to_string(), Value::from((s * 1e4).round() / 1e4)))
        .collect();
    serde_json::to_value(map).unwrap_or(Value::Null)
}

/// Fusion settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fusion {
    pub spec: ConstraintSpec,
    pub max_attempts: usize,
}

impl Fusion {
    pub fn new(spec: ConstraintSpec) -> Self {
        Self {
            spec,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn combine(
        &self,
        results: &[Candidate],
        weights: &[f64],
        rng: &mut dyn RngCore,
    ) -> Result<Candidate, FusionError> {
        if results.is_empty() {
            return Err(FusionError::Empty);
        }
        if results.len() != weights.len() {
            return Err(FusionError::LengthMismatch {
                results: results.len(),
                weights: weights.len(),
            });
        }
        let weights = normalize_weights(weights)?;
        let scores = red_scores(results, &weights);

        let mut attempts = 0;
        let mut path = FusionPath::Heaviest;
        let vote = top_k(&scores, RED_COUNT);
        let mut reds = None;
        if constraint::accepts(&vote, &self.spec) {
            path = FusionPath::Vote;
            reds = Some(vote);
        } else {
            while attempts < self.max_attempts {
                attempts += 1;
                // Fewer than six distinct reds across the inputs: nothing to resample.
                let Some(sample) = weighted_distinct(&scores, RED_COUNT, rng) else {
                    break;
                };
                if constraint::accepts(&sample, &self.spec) {
                    path = FusionPath::Resample;
                    reds = Some(sample);
                    break;
                }
            }
        }
        let reds = match reds {
            Some(r) => r,
            None => results[heaviest(&weights)].reds().to_vec(),
        };
        let satisfied = constraint::accepts(&reds, &self.spec);
        let blue = majority_blue(results, &weights);

        debug!(path = path.as_str(), attempts, inputs = results.len(), "fused candidates");

        let labels: Vec<Value> = results.iter().map(|c| Value::from(c.label())).collect();
        let candidate = Candidate::new(&reds, blue, format!("Fusion of {} strategies", results.len()))?;
        let odd = candidate.odd_count();
        let sum = candidate.red_sum();
        Ok(candidate
            .with_meta("strategy", "fusion")
            .with_meta("fusion_path", path.as_str())
            .with_meta("constraint_satisfied", satisfied)
            .with_meta("attempts", attempts)
            .with_meta("odd_count", odd)
            .with_meta("sum_reds", sum)
            .with_meta("vote_scores", score_map(&scores))
            .with_meta("blue_scores", score_map(&blue_scores(results, &weights)))
            .with_meta("contributors", Value::Array(labels)))
    }
}

/// [`Fusion::combine`] with the default attempt budget.
pub fn combine(
    results: &[Candidate],
    weights: &[f64],
    spec: &ConstraintSpec,
    rng: &mut dyn RngCore,
) -> Result<Candidate, FusionError> {
    Fusion::new(*spec).combine(results, weights, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn cand(reds: [u8; 6], blue: u8, label: &str) -> Candidate {
        Candidate::new(&reds, blue, label).unwrap()
    }

    #[test]
    fn rejects_bad_inputs() {
        let mut rng = StdRng::seed_from_u64(0);
        let spec = ConstraintSpec::default();
        assert_eq!(combine(&[], &[], &spec, &mut rng), Err(FusionError::Empty));

        let one = vec![cand([3, 8, 14, 19, 25, 30], 5, "a")];
        assert!(matches!(
            combine(&one, &[1.0, 2.0], &spec, &mut rng),
            Err(FusionError::LengthMismatch { results: 1, weights: 2 })
        ));
        assert!(matches!(
            combine(&one, &[-1.0], &spec, &mut rng),
            Err(FusionError::InvalidWeight { index: 0, .. })
        ));
        assert!(matches!(
            combine(&one, &[f64::NAN], &spec, &mut rng),
            Err(FusionError::InvalidWeight { .. })
        ));
    }

    #[test]
    fn agreeing_inputs_vote_through() {
        let reds = [3, 8, 14, 19, 25, 30];
        let results = vec![cand(reds, 5, "a"), cand(reds, 5, "b")];
        let mut rng = StdRng::seed_from_u64(1);
        let fused = combine(&results, &[1.0, 3.0], &ConstraintSpec::default(), &mut rng).unwrap();
        assert_eq!(fused.reds(), &reds);
        assert_eq!(fused.blue(), 5);
        assert_eq!(fused.meta("fusion_path"), Some(&Value::from("vote")));
    }

    #[test]
    fn heavy_weight_wins_the_vote() {
        let heavy = [2, 9, 13, 20, 27, 31];
        let results = vec![
            cand([3, 8, 14, 19, 25, 30], 4, "light"),
            cand(heavy, 11, "heavy"),
        ];
        let mut rng = StdRng::seed_from_u64(2);
        let fused = combine(&results, &[0.2, 0.8], &ConstraintSpec::default(), &mut rng).unwrap();
        assert_eq!(fused.reds(), &heavy);
        assert_eq!(fused.blue(), 11);
    }

    #[test]
    fn zero_weights_count_equally() {
        assert_eq!(normalize_weights(&[0.0, 0.0]).unwrap(), vec![0.5, 0.5]);
    }

    #[test]
    fn fused_output_satisfies_policy_when_possible() {
        // The plain vote here is 1..6, which the policy rejects.
        let results = vec![
            cand([1, 2, 3, 14, 25, 30], 1, "a"),
            cand([4, 5, 6, 15, 22, 31], 2, "b"),
            cand([1, 2, 3, 4, 5, 6], 3, "c"),
        ];
        let spec = ConstraintSpec::default();
        let mut rng = StdRng::seed_from_u64(3);
        let fused = Fusion::new(spec)
            .with_max_attempts(500)
            .combine(&results, &[1.0, 1.0, 1.0], &mut rng)
            .unwrap();
        assert!(constraint::accepts(fused.reds(), &spec));
        assert_eq!(fused.meta("fusion_path"), Some(&Value::from("resample")));
    }

    #[test]
    fn impossible_policy_returns_heaviest_input() {
        let spec = ConstraintSpec {
            min_sum: 500,
            max_sum: 600,
            ..ConstraintSpec::default()
        };
        let results = vec![
            cand([3, 8, 14, 19, 25, 30], 4, "a"),
            cand([2, 9, 13, 20, 27, 31], 9, "b"),
        ];
        let mut rng = StdRng::seed_from_u64(4);
        let fused = combine(&results, &[1.0, 2.0], &spec, &mut rng).unwrap();
        assert_eq!(fused.reds(), &[2, 9, 13, 20, 27, 31]);
        assert_eq!(fused.meta("fusion_path"), Some(&Value::from("heaviest")));
        assert_eq!(fused.meta("constraint_satisfied"), Some(&Value::Bool(false)));
    }

    #[test]
    fn blue_ties_follow_heaviest_candidate() {
        let results = vec![
            cand([3, 8, 14, 19, 25, 30], 4, "a"),
            cand([3, 8, 14, 19, 25, 30], 9, "b"),
        ];
        let mut rng = StdRng::seed_from_u64(5);
        let fused = combine(&results, &[1.0, 1.0], &ConstraintSpec::default(), &mut rng).unwrap();
        assert_eq!(fused.blue(), 4);
    }
}
