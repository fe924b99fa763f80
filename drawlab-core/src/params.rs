//! Strategy parameters: flat key/value configuration with layered merging.
//!
//! Every strategy declares a complete default set; stored and caller
//! overrides are layered on top in increasing priority. Because defaults
//! cover every recognized key, a merged set never misses a key the strategy
//! reads. Type mismatches surface as [`ParamError`] at construction time.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ParamValue {
    fn kind(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Number(_) => "number",
            ParamValue::Text(_) => "text",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Number(n) => write!(f, "{n}"),
            ParamValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Number(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Number(v as f64)
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        ParamValue::Number(v as f64)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Number(v as f64)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Text(v)
    }
}

/// Errors reading a typed value out of a parameter set.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("missing parameter '{0}'")]
    Missing(String),
    #[error("parameter '{key}' expected {expected}, found {found}")]
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("parameter '{key}' out of range: {value}")]
    OutOfRange { key: String, value: f64 },
}

/// Flat parameter map. `BTreeMap` keeps serialization (and hashing) deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyParams(BTreeMap<String, ParamValue>);

impl StrategyParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// Return a copy of `self` with every key in `overrides` replacing ours.
    pub fn overlay(&self, overrides: &StrategyParams) -> StrategyParams {
        let mut merged = self.0.clone();
        for (k, v) in &overrides.0 {
            merged.insert(k.clone(), v.clone());
        }
        StrategyParams(merged)
    }

    /// Merge `defaults ← stored ← caller`, later layers winning.
    pub fn merged(
        defaults: &StrategyParams,
        stored: &StrategyParams,
        caller: &StrategyParams,
    ) -> StrategyParams {
        defaults.overlay(stored).overlay(caller)
    }

    fn require(&self, key: &str) -> Result<&ParamValue, ParamError> {
        self.0
            .get(key)
            .ok_or_else(|| ParamError::Missing(key.to_string()))
    }

    pub fn f64(&self, key: &str) -> Result<f64, ParamError> {
        match self.require(key)? {
            ParamValue::Number(n) if n.is_finite() => Ok(*n),
            ParamValue::Number(n) => Err(ParamError::OutOfRange {
                key: key.to_string(),
                value: *n,
            }),
            other => Err(ParamError::WrongType {
                key: key.to_string(),
                expected: "number",
                found: other.kind(),
            }),
        }
    }

    /// Non-negative integer parameter. Fractional values are truncated.
    pub fn usize(&self, key: &str) -> Result<usize, ParamError> {
        let v = self.f64(key)?;
        if v < 0.0 {
            return Err(ParamError::OutOfRange {
                key: key.to_string(),
                value: v,
            });
        }
        Ok(v as usize)
    }

    /// Number constrained to `[0, 1]`.
    pub fn probability(&self, key: &str) -> Result<f64, ParamError> {
        let v = self.f64(key)?;
        if !(0.0..=1.0).contains(&v) {
            return Err(ParamError::OutOfRange {
                key: key.to_string(),
                value: v,
            });
        }
        Ok(v)
    }

    /// Strictly positive number.
    pub fn positive(&self, key: &str) -> Result<f64, ParamError> {
        let v = self.f64(key)?;
        if v <= 0.0 {
            return Err(ParamError::OutOfRange {
                key: key.to_string(),
                value: v,
            });
        }
        Ok(v)
    }

    pub fn bool(&self, key: &str) -> Result<bool, ParamError> {
        match self.require(key)? {
            ParamValue::Bool(b) => Ok(*b),
            other => Err(ParamError::WrongType {
                key: key.to_string(),
                expected: "bool",
                found: other.kind(),
            }),
        }
    }

    pub fn text(&self, key: &str) -> Result<&str, ParamError> {
        match self.require(key)? {
            ParamValue::Text(s) => Ok(s.as_str()),
            other => Err(ParamError::WrongType {
                key: key.to_string(),
                expected: "text",
                found: other.kind(),
            }),
        }
    }

    /// JSON view, used to record the parameters behind a candidate.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Content hash of the parameter set (sorted keys, canonical JSON).
    pub fn fingerprint(&self) -> String {
        let json = self.to_json().to_string();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

impl FromIterator<(String, ParamValue)> for StrategyParams {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        StrategyParams(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> StrategyParams {
        StrategyParams::new()
            .with("max_attempts", 50)
            .with("prefer_odd_red", false)
            .with("backbone", "pooled")
            .with("temperature", 1.0)
    }

    #[test]
    fn merge_priority_is_defaults_stored_caller() {
        let stored = StrategyParams::new()
            .with("max_attempts", 20)
            .with("temperature", 0.5);
        let caller = StrategyParams::new().with("temperature", 2.0);

        let merged = StrategyParams::merged(&defaults(), &stored, &caller);
        assert_eq!(merged.usize("max_attempts").unwrap(), 20);
        assert_eq!(merged.f64("temperature").unwrap(), 2.0);
        assert!(!merged.bool("prefer_odd_red").unwrap());
        assert_eq!(merged.text("backbone").unwrap(), "pooled");
    }

    #[test]
    fn merge_is_total_over_defaults() {
        let merged = StrategyParams::merged(
            &defaults(),
            &StrategyParams::new(),
            &StrategyParams::new(),
        );
        for (key, _) in defaults().iter() {
            assert!(merged.contains(key));
        }
    }

    #[test]
    fn typed_getters_report_errors() {
        let p = defaults().with("bad", "text").with("neg", -1.0);
        assert_eq!(p.f64("missing"), Err(ParamError::Missing("missing".into())));
        assert!(matches!(p.f64("bad"), Err(ParamError::WrongType { .. })));
        assert!(matches!(p.bool("max_attempts"), Err(ParamError::WrongType { .. })));
        assert!(matches!(p.usize("neg"), Err(ParamError::OutOfRange { .. })));
        assert!(matches!(p.probability("max_attempts"), Err(ParamError::OutOfRange { .. })));
    }

    #[test]
    fn untagged_deserialization() {
        let p: StrategyParams =
            serde_json::from_str(r#"{"a": true, "b": 3, "c": "lstm", "d": 0.25}"#).unwrap();
        assert!(p.bool("a").unwrap());
        assert_eq!(p.usize("b").unwrap(), 3);
        assert_eq!(p.text("c").unwrap(), "lstm");
        assert_eq!(p.f64("d").unwrap(), 0.25);
    }

    #[test]
    fn fingerprint_tracks_values() {
        let a = defaults();
        let b = defaults().with("temperature", 0.9);
        assert_eq!(a.fingerprint(), defaults().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
