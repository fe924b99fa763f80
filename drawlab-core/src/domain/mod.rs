//! Domain types for DrawLab: historical draws and generated candidates.

pub mod candidate;
pub mod draw;

pub use candidate::Candidate;
pub use draw::{DrawError, HistoricalDraw, PeriodId};

use thiserror::Error;

/// Highest red value (reds are drawn from `1..=RED_MAX`).
pub const RED_MAX: u8 = 33;
/// Highest blue value (blue is drawn from `1..=BLUE_MAX`).
pub const BLUE_MAX: u8 = 16;
/// Number of reds in a combination.
pub const RED_COUNT: usize = 6;

/// Structural problems with a red/blue combination.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NumberError {
    #[error("expected {RED_COUNT} reds, got {0}")]
    WrongRedCount(usize),
    #[error("red value {0} outside 1..={RED_MAX}")]
    RedOutOfRange(u8),
    #[error("red value {0} appears more than once")]
    DuplicateRed(u8),
    #[error("blue value {0} outside 1..={BLUE_MAX}")]
    BlueOutOfRange(u8),
}

/// Validate a red slice and return it as a sorted fixed-size array.
pub fn normalize_reds(reds: &[u8]) -> Result<[u8; RED_COUNT], NumberError> {
    if reds.len() != RED_COUNT {
        return Err(NumberError::WrongRedCount(reds.len()));
    }
    let mut out = [0u8; RED_COUNT];
    out.copy_from_slice(reds);
    out.sort_unstable();

    for (i, &r) in out.iter().enumerate() {
        if !(1..=RED_MAX).contains(&r) {
            return Err(NumberError::RedOutOfRange(r));
        }
        if i > 0 && out[i - 1] == r {
            return Err(NumberError::DuplicateRed(r));
        }
    }
    Ok(out)
}

/// Validate a blue value.
pub fn check_blue(blue: u8) -> Result<u8, NumberError> {
    if (1..=BLUE_MAX).contains(&blue) {
        Ok(blue)
    } else {
        Err(NumberError::BlueOutOfRange(blue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_sorts_valid_reds() {
        assert_eq!(
            normalize_reds(&[30, 2, 17, 9, 11, 25]).unwrap(),
            [2, 9, 11, 17, 25, 30]
        );
    }

    #[test]
    fn normalize_rejects_duplicates_and_range() {
        assert_eq!(
            normalize_reds(&[1, 1, 2, 3, 4, 5]),
            Err(NumberError::DuplicateRed(1))
        );
        assert_eq!(
            normalize_reds(&[0, 1, 2, 3, 4, 5]),
            Err(NumberError::RedOutOfRange(0))
        );
        assert_eq!(
            normalize_reds(&[1, 2, 3, 4, 5, 34]),
            Err(NumberError::RedOutOfRange(34))
        );
        assert_eq!(normalize_reds(&[1, 2, 3]), Err(NumberError::WrongRedCount(3)));
    }

    #[test]
    fn blue_range() {
        assert!(check_blue(1).is_ok());
        assert!(check_blue(16).is_ok());
        assert_eq!(check_blue(17), Err(NumberError::BlueOutOfRange(17)));
        assert_eq!(check_blue(0), Err(NumberError::BlueOutOfRange(0)));
    }
}
