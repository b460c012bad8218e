//! Bar timeframe parsing

use chrono::Duration;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Timeframe parse errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseTimeframeError {
    /// Not of the form `<count><s|m|h|d>`
    #[error("Invalid timeframe format: {0}")]
    InvalidFormat(String),
    /// Count was zero
    #[error("Timeframe must be positive: {0}")]
    Zero(String),
    /// Count overflows a second count
    #[error("Timeframe too large: {0}")]
    Overflow(String),
}

/// A bar interval such as `1m`, `5m`, `1h` or `1d`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timeframe {
    seconds: u64,
}

impl Timeframe {
    /// Timeframe of the given number of seconds
    pub fn from_seconds(seconds: u64) -> Option<Self> {
        (seconds > 0).then_some(Self { seconds })
    }

    /// Length in seconds
    pub fn as_secs(&self) -> u64 {
        self.seconds
    }

    /// Length as a chrono duration
    pub fn duration(&self) -> Duration {
        Duration::seconds(self.seconds as i64)
    }
}

impl FromStr for Timeframe {
    type Err = ParseTimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let invalid = || ParseTimeframeError::InvalidFormat(s.to_string());

        let unit = lower.chars().last().ok_or_else(invalid)?;
        let multiplier: u64 = match unit {
            's' => 1,
            'm' => 60,
            'h' => 3_600,
            'd' => 86_400,
            _ => return Err(invalid()),
        };

        let digits = &lower[..lower.len() - 1];
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let count: u64 = digits
            .parse()
            .map_err(|_| ParseTimeframeError::Overflow(s.to_string()))?;
        if count == 0 {
            return Err(ParseTimeframeError::Zero(s.to_string()));
        }

        let seconds = count
            .checked_mul(multiplier)
            .ok_or_else(|| ParseTimeframeError::Overflow(s.to_string()))?;

        Ok(Self { seconds })
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.seconds;
        if s % 86_400 == 0 {
            write!(f, "{}d", s / 86_400)
        } else if s % 3_600 == 0 {
            write!(f, "{}h", s / 3_600)
        } else if s % 60 == 0 {
            write!(f, "{}m", s / 60)
        } else {
            write!(f, "{}s", s)
        }
    }
}
