//! Sequence model: a learned encoder over recent draws.
//!
//! The last `history_window` draws become a sequence of 33-dimensional
//! occurrence vectors (one-hot, or running frequencies when `use_onehot` is
//! off). A [`SequenceEncoder`] maps the sequence to 49 logits: 33 red, 16
//! blue. Reds are sampled from the temperature softmax with rejection against
//! the constraint policy; blue is the argmax.
//!
//! Encoders are trained out of band and loaded from a JSON weights file.
//! Without a usable encoder the strategy serves the random baseline.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use rand::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::{
    finish, tail, top_k, weighted_distinct, Degraded, Outcome, Strategy, StrategyError,
    StrategyKind,
};
use crate::constraint::{self, ConstraintSpec};
use crate::domain::{Candidate, HistoricalDraw, BLUE_MAX, RED_COUNT, RED_MAX};
use crate::params::StrategyParams;

pub const INPUT_DIM: usize = RED_MAX as usize;
pub const OUTPUT_DIM: usize = RED_MAX as usize + BLUE_MAX as usize;

// ─── Encoder ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("reading weights {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing weights: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{what}: expected {expected} values, got {got}")]
    Shape {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("weights are for backbone '{found}', '{wanted}' requested")]
    BackboneMismatch { wanted: String, found: String },
}

/// Maps a sequence of occurrence vectors to `OUTPUT_DIM` logits.
pub trait SequenceEncoder: Send + Sync + fmt::Debug {
    fn backbone(&self) -> &'static str;
    fn encode(&self, sequence: &[Vec<f64>]) -> Vec<f64>;
}

fn check_matrix(
    what: &'static str,
    m: &[Vec<f64>],
    rows: usize,
    cols: usize,
) -> Result<(), EncoderError> {
    if m.len() != rows {
        return Err(EncoderError::Shape {
            what,
            expected: rows,
            got: m.len(),
        });
    }
    for row in m {
        if row.len() != cols {
            return Err(EncoderError::Shape {
                what,
                expected: cols,
                got: row.len(),
            });
        }
    }
    Ok(())
}

fn check_vector(what: &'static str, v: &[f64], len: usize) -> Result<(), EncoderError> {
    if v.len() != len {
        return Err(EncoderError::Shape {
            what,
            expected: len,
            got: v.len(),
        });
    }
    Ok(())
}

/// `m · x + b`
fn affine(m: &[Vec<f64>], x: &[f64], b: &[f64]) -> Vec<f64> {
    m.iter()
        .zip(b)
        .map(|(row, bias)| row.iter().zip(x).map(|(w, v)| w * v).sum::<f64>() + bias)
        .collect()
}

/// Exponentially decay-weighted mean of the sequence followed by one linear layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PooledEncoder {
    pub decay: f64,
    /// `OUTPUT_DIM × INPUT_DIM`
    pub weight: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

impl PooledEncoder {
    pub fn validate(&self) -> Result<(), EncoderError> {
        check_matrix("pooled.weight", &self.weight, OUTPUT_DIM, INPUT_DIM)?;
        check_vector("pooled.bias", &self.bias, OUTPUT_DIM)
    }
}

impl SequenceEncoder for PooledEncoder {
    fn backbone(&self) -> &'static str {
        "pooled"
    }

    fn encode(&self, sequence: &[Vec<f64>]) -> Vec<f64> {
        let mut pooled = vec![0.0; INPUT_DIM];
        let mut total = 0.0;
        let mut w = 1.0;
        // Newest step gets weight 1.
        for step in sequence.iter().rev() {
            for (p, x) in pooled.iter_mut().zip(step) {
                *p += w * x;
            }
            total += w;
            w *= self.decay;
        }
        if total > 0.0 {
            for p in pooled.iter_mut() {
                *p /= total;
            }
        }
        affine(&self.weight, &pooled, &self.bias)
    }
}

/// Elman recurrent network with a tanh hidden state and a linear head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrentEncoder {
    pub hidden_size: usize,
    /// `hidden × INPUT_DIM`
    pub w_ih: Vec<Vec<f64>>,
    /// `hidden × hidden`
    pub w_hh: Vec<Vec<f64>>,
    pub b_h: Vec<f64>,
    /// `OUTPUT_DIM × hidden`
    pub w_out: Vec<Vec<f64>>,
    pub b_out: Vec<f64>,
}

impl RecurrentEncoder {
    pub fn validate(&self) -> Result<(), EncoderError> {
        let h = self.hidden_size;
        check_matrix("recurrent.w_ih", &self.w_ih, h, INPUT_DIM)?;
        check_matrix("recurrent.w_hh", &self.w_hh, h, h)?;
        check_vector("recurrent.b_h", &self.b_h, h)?;
        check_matrix("recurrent.w_out", &self.w_out, OUTPUT_DIM, h)?;
        check_vector("recurrent.b_out", &self.b_out, OUTPUT_DIM)
    }
}

impl SequenceEncoder for RecurrentEncoder {
    fn backbone(&self) -> &'static str {
        "recurrent"
    }

    fn encode(&self, sequence: &[Vec<f64>]) -> Vec<f64> {
        let mut hidden = vec![0.0; self.hidden_size];
        for step in sequence {
            let input = affine(&self.w_ih, step, &self.b_h);
            let recurrent = affine(&self.w_hh, &hidden, &vec![0.0; self.hidden_size]);
            hidden = input
                .iter()
                .zip(&recurrent)
                .map(|(a, b)| (a + b).tanh())
                .collect();
        }
        affine(&self.w_out, &hidden, &self.b_out)
    }
}

/// On-disk weights, tagged by backbone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backbone", rename_all = "snake_case")]
pub enum EncoderWeights {
    Pooled(PooledEncoder),
    Recurrent(RecurrentEncoder),
}

impl EncoderWeights {
    pub fn backbone(&self) -> &'static str {
        match self {
            EncoderWeights::Pooled(_) => "pooled",
            EncoderWeights::Recurrent(_) => "recurrent",
        }
    }

    pub fn into_encoder(self) -> Result<Box<dyn SequenceEncoder>, EncoderError> {
        match self {
            EncoderWeights::Pooled(e) => {
                e.validate()?;
                Ok(Box::new(e))
            }
            EncoderWeights::Recurrent(e) => {
                e.validate()?;
                Ok(Box::new(e))
            }
        }
    }
}

/// Load and validate an encoder, checking it matches the requested backbone.
pub fn load_encoder(path: &Path, backbone: &str) -> Result<Box<dyn SequenceEncoder>, EncoderError> {
    let text = fs::read_to_string(path).map_err(|source| EncoderError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let weights: EncoderWeights = serde_json::from_str(&text)?;
    if weights.backbone() != backbone {
        return Err(EncoderError::BackboneMismatch {
            wanted: backbone.to_string(),
            found: weights.backbone().to_string(),
        });
    }
    weights.into_encoder()
}

// ─── Feature encoding ───────────────────────────────────────────────

/// Occurrence vectors for each draw, oldest first.
///
/// One-hot marks the draw's reds; otherwise each step carries the running
/// frequency of every number over the draws seen so far.
pub fn encode_history(draws: &[HistoricalDraw], one_hot: bool) -> Vec<Vec<f64>> {
    let mut running = vec![0.0; INPUT_DIM];
    draws
        .iter()
        .enumerate()
        .map(|(i, d)| {
            if one_hot {
                let mut v = vec![0.0; INPUT_DIM];
                for &r in d.reds() {
                    v[(r - 1) as usize] = 1.0;
                }
                v
            } else {
                for &r in d.reds() {
                    running[(r - 1) as usize] += 1.0;
                }
                let seen = (i + 1) as f64;
                running.iter().map(|c| c / seen).collect()
            }
        })
        .collect()
}

/// Temperature softmax.
pub fn softmax(logits: &[f64], temperature: f64) -> Vec<f64> {
    let t = if temperature > 0.0 { temperature } else { 1.0 };
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| ((l - max) / t).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

// ─── Strategy ───────────────────────────────────────────────────────

#[derive(Debug)]
enum Mode {
    Model {
        backbone: &'static str,
        red_probs: Vec<f64>,
        blue: u8,
    },
    Fallback(Degraded),
}

#[derive(Debug)]
pub struct SequenceModel {
    spec: ConstraintSpec,
    mode: Mode,
    max_attempts: usize,
    params: StrategyParams,
}

impl SequenceModel {
    /// Build around an already constructed encoder.
    pub fn with_encoder(
        history: &[HistoricalDraw],
        params: &StrategyParams,
        encoder: &dyn SequenceEncoder,
    ) -> Result<Self, StrategyError> {
        let window = tail(history, params.usize("history_window")?);
        let sequence = encode_history(window, params.bool("use_onehot")?);
        let logits = encoder.encode(&sequence);
        if logits.len() != OUTPUT_DIM {
            return Err(EncoderError::Shape {
                what: "encoder output",
                expected: OUTPUT_DIM,
                got: logits.len(),
            }
            .into());
        }
        let temperature = params.positive("temperature")?;
        let red_probs = softmax(&logits[..INPUT_DIM], temperature);
        let blue_logits = &logits[INPUT_DIM..];
        let blue = blue_logits
            .iter()
            .enumerate()
            .fold((0usize, f64::NEG_INFINITY), |best, (i, &l)| {
                if l > best.1 {
                    (i, l)
                } else {
                    best
                }
            })
            .0 as u8
            + 1;

        Ok(Self {
            spec: ConstraintSpec::from_params(params)?,
            mode: Mode::Model {
                backbone: encoder.backbone(),
                red_probs,
                blue,
            },
            max_attempts: params.usize("max_attempts")?,
            params: params.clone(),
        })
    }

    fn fallback(params: &StrategyParams, reason: String) -> Result<Self, StrategyError> {
        warn!(strategy = Self::CODE, %reason, "no usable encoder, serving random baseline");
        Ok(Self {
            spec: ConstraintSpec::from_params(params)?,
            mode: Mode::Fallback(Degraded::new(Self::CODE, Self::NAME, params, reason)?),
            max_attempts: params.usize("max_attempts")?,
            params: params.clone(),
        })
    }

    /// Whether a trained encoder is driving generation.
    pub fn has_model(&self) -> bool {
        matches!(self.mode, Mode::Model { .. })
    }

    pub fn red_probabilities(&self) -> Option<&[f64]> {
        match &self.mode {
            Mode::Model { red_probs, .. } => Some(red_probs),
            Mode::Fallback(_) => None,
        }
    }
}

impl Strategy for SequenceModel {
    fn code(&self) -> &'static str {
        Self::CODE
    }

    fn label(&self) -> String {
        match &self.mode {
            Mode::Model { backbone, .. } => format!("{} ({backbone})", Self::NAME),
            Mode::Fallback(d) => d.label(),
        }
    }

    fn generate(&self, rng: &mut dyn RngCore) -> Result<Candidate, StrategyError> {
        let (backbone, red_probs, blue) = match &self.mode {
            Mode::Fallback(d) => return d.generate(rng),
            Mode::Model {
                backbone,
                red_probs,
                blue,
            } => (*backbone, red_probs, *blue),
        };

        let mut outcome = None;
        for attempt in 1..=self.max_attempts {
            if let Some(reds) = weighted_distinct(red_probs, RED_COUNT, rng) {
                if constraint::accepts(&reds, &self.spec) {
                    outcome = Some(Outcome {
                        reds,
                        satisfied: true,
                        attempts: attempt,
                    });
                    break;
                }
            }
        }
        let outcome = outcome.unwrap_or_else(|| {
            let reds = top_k(red_probs, RED_COUNT);
            let satisfied = constraint::accepts(&reds, &self.spec);
            Outcome {
                reds,
                satisfied,
                attempts: self.max_attempts,
            }
        });
        debug!(strategy = Self::CODE, backbone, attempts = outcome.attempts, "sequence sample");
        Ok(finish(Self::CODE, self.label(), outcome, blue, &self.params)?
            .with_meta("backbone", backbone))
    }
}

impl StrategyKind for SequenceModel {
    const CODE: &'static str = "sequence_model";
    const NAME: &'static str = "Sequence model";
    const DESCRIPTION: &'static str =
        "Learned sequence encoder over recent draws; random baseline without trained weights";
    const MIN_HISTORY: usize = 5;
    const ENABLED_BY_DEFAULT: bool = false;

    fn default_params() -> StrategyParams {
        ConstraintSpec::default_params()
            .with("require_zones", true)
            .with("backbone", "pooled")
            .with("weights_path", "")
            .with("history_window", 15)
            .with("use_onehot", true)
            .with("temperature", 1.0)
            .with("max_attempts", 40)
    }

    fn build(history: &[HistoricalDraw], params: &StrategyParams) -> Result<Self, StrategyError> {
        let backbone = params.text("backbone")?;
        let path = params.text("weights_path")?;
        if path.trim().is_empty() {
            return Self::fallback(params, "no weights_path configured".to_string());
        }
        match load_encoder(Path::new(path), backbone) {
            Ok(encoder) => Self::with_encoder(history, params, encoder.as_ref()),
            Err(e) => Self::fallback(params, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::synthetic_history;
    use rand::rngs::StdRng;
    use serde_json::Value;
    use std::io::Write;

    /// Encoder that ignores its input and favours fixed numbers.
    #[derive(Debug)]
    struct Favourites;

    impl SequenceEncoder for Favourites {
        fn backbone(&self) -> &'static str {
            "fixed"
        }

        fn encode(&self, _sequence: &[Vec<f64>]) -> Vec<f64> {
            let mut logits = vec![0.0; OUTPUT_DIM];
            for n in [3usize, 8, 14, 19, 25, 30] {
                logits[n - 1] = 12.0;
            }
            logits[INPUT_DIM + 6] = 5.0; // blue 7
            logits
        }
    }

    fn zero_pooled() -> PooledEncoder {
        PooledEncoder {
            decay: 0.9,
            weight: vec![vec![0.0; INPUT_DIM]; OUTPUT_DIM],
            bias: vec![0.0; OUTPUT_DIM],
        }
    }

    #[test]
    fn injected_encoder_drives_sampling() {
        let history = synthetic_history(20, 1);
        let model =
            SequenceModel::with_encoder(&history, &SequenceModel::default_params(), &Favourites)
                .unwrap();
        assert!(model.has_model());
        let mut rng = StdRng::seed_from_u64(4);
        let c = model.generate(&mut rng).unwrap();
        assert_eq!(c.blue(), 7);
        assert_eq!(c.reds(), &[3, 8, 14, 19, 25, 30]);
        assert_eq!(c.meta("backbone"), Some(&Value::from("fixed")));
    }

    #[test]
    fn softmax_temperature() {
        let p = softmax(&[1.0, 2.0, 3.0], 1.0);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        let sharp = softmax(&[1.0, 2.0, 3.0], 0.1);
        assert!(sharp[2] > p[2]);
    }

    #[test]
    fn history_encoding_modes() {
        let history = synthetic_history(4, 2);
        let one_hot = encode_history(&history, true);
        assert_eq!(one_hot.len(), 4);
        assert!(one_hot.iter().all(|v| v.iter().sum::<f64>() == 6.0));
        let freq = encode_history(&history, false);
        assert!((freq[3].iter().sum::<f64>() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn pooled_weights_load_from_file() {
        let weights = EncoderWeights::Pooled(zero_pooled());
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&weights).unwrap()).unwrap();

        let params = SequenceModel::default_params()
            .with("weights_path", file.path().to_string_lossy().to_string());
        let model = SequenceModel::build(&synthetic_history(20, 3), &params).unwrap();
        assert!(model.has_model());
        // Zero logits give a uniform red distribution.
        let probs = model.red_probabilities().unwrap();
        assert!(probs.iter().all(|p| (p - 1.0 / 33.0).abs() < 1e-12));
    }

    #[test]
    fn recurrent_shapes_are_validated() {
        let bad = RecurrentEncoder {
            hidden_size: 4,
            w_ih: vec![vec![0.0; INPUT_DIM]; 4],
            w_hh: vec![vec![0.0; 4]; 3],
            b_h: vec![0.0; 4],
            w_out: vec![vec![0.0; 4]; OUTPUT_DIM],
            b_out: vec![0.0; OUTPUT_DIM],
        };
        assert!(matches!(
            bad.validate(),
            Err(EncoderError::Shape { what: "recurrent.w_hh", .. })
        ));
    }

    #[test]
    fn recurrent_encoder_outputs_logits() {
        let enc = RecurrentEncoder {
            hidden_size: 2,
            w_ih: vec![vec![0.1; INPUT_DIM]; 2],
            w_hh: vec![vec![0.5; 2]; 2],
            b_h: vec![0.0; 2],
            w_out: vec![vec![1.0; 2]; OUTPUT_DIM],
            b_out: vec![0.0; OUTPUT_DIM],
        };
        enc.validate().unwrap();
        let seq = encode_history(&synthetic_history(5, 3), true);
        let logits = enc.encode(&seq);
        assert_eq!(logits.len(), OUTPUT_DIM);
        assert!(logits.iter().all(|l| l.abs() <= 2.0));
    }

    #[test]
    fn missing_weights_fall_back_to_random() {
        let model =
            SequenceModel::build(&synthetic_history(20, 5), &SequenceModel::default_params())
                .unwrap();
        assert!(!model.has_model());
        let mut rng = StdRng::seed_from_u64(1);
        let c = model.generate(&mut rng).unwrap();
        assert_eq!(c.meta("fallback"), Some(&Value::from("random")));
        assert_eq!(c.meta("strategy"), Some(&Value::from("sequence_model")));
    }

    #[test]
    fn backbone_mismatch_is_reported() {
        let weights = EncoderWeights::Pooled(zero_pooled());
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&weights).unwrap()).unwrap();
        let err = load_encoder(file.path(), "recurrent").unwrap_err();
        assert!(matches!(err, EncoderError::BackboneMismatch { .. }));
    }
}
