//! HistoricalDraw: the fundamental fact the engine reads.

use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{check_blue, normalize_reds, NumberError, RED_COUNT};

/// Opaque, orderable identifier of one draw event.
///
/// Tokens are compared numerically-aware: a shorter token sorts before a
/// longer one, equal-length tokens compare lexicographically. This keeps
/// `"999"` before `"1000"` without parsing the token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeriodId(String);

impl PeriodId {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for PeriodId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for PeriodId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PeriodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeriodId {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<u32> for PeriodId {
    fn from(token: u32) -> Self {
        Self(token.to_string())
    }
}

/// Errors raised while building a draw from raw fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DrawError {
    #[error("empty period token")]
    EmptyPeriod,
    #[error("period {period}: {source}")]
    Numbers {
        period: String,
        #[source]
        source: NumberError,
    },
}

/// One historical draw: six distinct reds, one blue, a period token and open time.
///
/// Reds are stored sorted ascending. Instances are only created through
/// [`HistoricalDraw::new`] (or deserialization, which goes through it), so
/// the numeric invariants always hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DrawRecord", into = "DrawRecord")]
pub struct HistoricalDraw {
    period: PeriodId,
    reds: [u8; RED_COUNT],
    blue: u8,
    opened_at: NaiveDateTime,
}

impl HistoricalDraw {
    pub fn new(
        period: impl Into<PeriodId>,
        reds: [u8; RED_COUNT],
        blue: u8,
        opened_at: NaiveDateTime,
    ) -> Result<Self, DrawError> {
        let period = period.into();
        if period.as_str().is_empty() {
            return Err(DrawError::EmptyPeriod);
        }
        let wrap = |source| DrawError::Numbers {
            period: period.to_string(),
            source,
        };
        let reds = normalize_reds(&reds).map_err(wrap)?;
        let blue = check_blue(blue).map_err(wrap)?;
        Ok(Self {
            period,
            reds,
            blue,
            opened_at,
        })
    }

    pub fn period(&self) -> &PeriodId {
        &self.period
    }

    pub fn reds(&self) -> &[u8; RED_COUNT] {
        &self.reds
    }

    pub fn blue(&self) -> u8 {
        self.blue
    }

    pub fn opened_at(&self) -> NaiveDateTime {
        self.opened_at
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
}

/// Flat row layout used for CSV/JSON interchange (`qi_shu,red1..red6,blue,open_time`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawRecord {
    pub qi_shu: String,
    pub red1: u8,
    pub red2: u8,
    pub red3: u8,
    pub red4: u8,
    pub red5: u8,
    pub red6: u8,
    pub blue: u8,
    pub open_time: NaiveDateTime,
}

impl TryFrom<DrawRecord> for HistoricalDraw {
    type Error = DrawError;

    fn try_from(r: DrawRecord) -> Result<Self, Self::Error> {
        HistoricalDraw::new(
            PeriodId::new(r.qi_shu),
            [r.red1, r.red2, r.red3, r.red4, r.red5, r.red6],
            r.blue,
            r.open_time,
        )
    }
}

impl From<HistoricalDraw> for DrawRecord {
    fn from(d: HistoricalDraw) -> Self {
        let [red1, red2, red3, red4, red5, red6] = d.reds;
        Self {
            qi_shu: d.period.0,
            red1,
            red2,
            red3,
            red4,
            red5,
            red6,
            blue: d.blue,
            open_time: d.opened_at,
        }
    }
}
