//! Candidate: the transient output of one generation call.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{check_blue, normalize_reds, HistoricalDraw, NumberError, BLUE_MAX, RED_COUNT, RED_MAX};

/// A generated combination: six sorted distinct reds, one blue, a label and
/// free-form metadata (parameters used, diagnostic scores).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    reds: [u8; RED_COUNT],
    blue: u8,
    label: String,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
}

impl Candidate {
    /// Build a candidate, sorting and validating the reds.
    pub fn new(reds: &[u8], blue: u8, label: impl Into<String>) -> Result<Self, NumberError> {
        Ok(Self {
            reds: normalize_reds(reds)?,
            blue: check_blue(blue)?,
            label: label.into(),
            metadata: BTreeMap::new(),
        })
    }

    /// Uniformly random combination; valid by construction, so infallible.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, label: impl Into<String>) -> Self {
        let mut reds = [0u8; RED_COUNT];
        let picked = rand::seq::index::sample(rng, RED_MAX as usize, RED_COUNT);
        for (slot, i) in reds.iter_mut().zip(picked.into_iter()) {
            *slot = i as u8 + 1;
        }
        reds.sort_unstable();
        Self {
            reds,
            blue: rng.gen_range(1..=BLUE_MAX),
            label: label.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn reds(&self) -> &[u8; RED_COUNT] {
        &self.reds
    }

    pub fn blue(&self) -> u8 {
        self.blue
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Builder-style metadata insert.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn insert_meta(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn contains_red(&self, n: u8) -> bool {
        self.reds.binary_search(&n).is_ok()
    }

    pub fn odd_count(&self) -> usize {
        self.reds.iter().filter(|&&r| r % 2 == 1).count()
    }

    pub fn red_sum(&self) -> u32 {
        self.reds.iter().map(|&r| r as u32).sum()
    }

    /// Number of reds shared with an actual draw.
    pub fn red_hits(&self, draw: &HistoricalDraw) -> usize {
        self.reds.iter().filter(|&&r| draw.contains_red(r)).count()
    }

    pub fn blue_hit(&self, draw: &HistoricalDraw) -> bool {
        self.blue == draw.blue()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn candidate_is_sorted_and_validated() {
        let c = Candidate::new(&[20, 3, 9, 14, 27, 31], 5, "test").unwrap();
        assert_eq!(c.reds(), &[3, 9, 14, 20, 27, 31]);
        assert_eq!(c.odd_count(), 4);
        assert_eq!(c.red_sum(), 104);
        assert!(Candidate::new(&[20, 3, 9, 14, 27, 27], 5, "dup").is_err());
        assert!(Candidate::new(&[20, 3, 9, 14, 27, 30], 0, "blue").is_err());
        let mut rng = <rand::rngs::StdRng as rand::SeedableRng>::seed_from_u64(3);
        let r = Candidate::random(&mut rng, "floor");
        assert!(normalize_reds(r.reds()).is_ok());
    }

    #[test]
    fn hits_against_draw() {
        let opened = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(21, 15, 0)
            .unwrap();
        let draw = HistoricalDraw::new("2024020", [3, 9, 14, 1, 2, 4], 5, opened).unwrap();
        let c = Candidate::new(&[20, 3, 9, 14, 27, 31], 5, "test").unwrap();
        assert_eq!(c.red_hits(&draw), 3);
        assert!(c.blue_hit(&draw));
    }

    #[test]
    fn metadata_builder() {
        let c = Candidate::new(&[1, 2, 3, 4, 5, 6], 1, "meta")
            .unwrap()
            .with_meta("attempts", 3)
            .with_meta("constraint_satisfied", false);
        assert_eq!(c.meta("attempts"), Some(&Value::from(3)));
        assert_eq!(c.meta("constraint_satisfied"), Some(&Value::Bool(false)));
    }
}
