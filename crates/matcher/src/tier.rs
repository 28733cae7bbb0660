use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ConfidenceTier;

/// Rejected tier threshold combinations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TierConfigError {
    #[error("{name} threshold {value} is outside 0..=100")]
    OutOfRange { name: &'static str, value: u8 },
    #[error("low threshold {low} must be strictly below high threshold {high}")]
    LowNotBelowHigh { low: u8, high: u8 },
    #[error("medium threshold {medium} must lie within [{low}, {high})")]
    MediumOutOfBand { medium: u8, low: u8, high: u8 },
}

/// Score bands for fuzzy results.
///
/// `score >= high` is HIGH, `score >= medium` is MEDIUM, `score >= low` is
/// LOW and anything below `low` is rejected. When `medium` is unset it equals
/// `low`, which means LOW is never produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierThresholds {
    high: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    medium: Option<u8>,
    low: u8,
}

impl TierThresholds {
    pub fn new(high: u8, low: u8) -> Result<Self, TierConfigError> {
        let thresholds = Self {
            high,
            medium: None,
            low,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Adds a distinct MEDIUM floor between `low` and `high`.
    pub fn with_medium(mut self, medium: u8) -> Result<Self, TierConfigError> {
        self.medium = Some(medium);
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), TierConfigError> {
        for (name, value) in [("high", self.high), ("low", self.low)] {
            if value > 100 {
                return Err(TierConfigError::OutOfRange { name, value });
            }
        }
        if self.low >= self.high {
            return Err(TierConfigError::LowNotBelowHigh {
                low: self.low,
                high: self.high,
            });
        }
        if let Some(medium) = self.medium {
            if medium < self.low || medium >= self.high {
                return Err(TierConfigError::MediumOutOfBand {
                    medium,
                    low: self.low,
                    high: self.high,
                });
            }
        }
        Ok(())
    }

    pub fn high(&self) -> u8 {
        self.high
    }

    pub fn low(&self) -> u8 {
        self.low
    }

    pub fn medium(&self) -> u8 {
        self.medium.unwrap_or(self.low)
    }

    /// Boundaries are inclusive on the lower edge of each band.
    pub fn classify(&self, score: u8) -> ConfidenceTier {
        if score >= self.high {
            ConfidenceTier::High
        } else if score >= self.medium() {
            ConfidenceTier::Medium
        } else if score >= self.low {
            ConfidenceTier::Low
        } else {
            ConfidenceTier::None
        }
    }
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            high: 90,
            medium: None,
            low: 75,
        }
    }
}
