//! Mapping from device loudness units onto the display scale.
//!
//! Every mapping is pure, monotonically non-decreasing and clamped to
//! `[0, max_display]`, so the aggregator can treat the result as a bounded
//! level without knowing where the raw value came from.

use serde::{Deserialize, Serialize};

use crate::error::{AggregatorError, Result};

/// Default top of the display scale.
pub const DEFAULT_MAX_DISPLAY: f64 = 100.0;

/// Quietest dBFS value the default mapping distinguishes from silence.
pub const DEFAULT_FLOOR_DB: f64 = -60.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Normalizer {
    /// `raw * gain`.
    Linear { gain: f64 },
    /// `[floor_db, ceiling_db]` spread linearly across the display scale.
    DecibelRange { floor_db: f64, ceiling_db: f64 },
    /// Linear RMS amplitude to decibels: `20 * log10(raw) + offset_db`.
    RmsToDb { offset_db: f64 },
}

impl Default for Normalizer {
    fn default() -> Self {
        Normalizer::DecibelRange {
            floor_db: DEFAULT_FLOOR_DB,
            ceiling_db: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub normalizer: Normalizer,
    pub max_display: f64,
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            normalizer: Normalizer::default(),
            max_display: DEFAULT_MAX_DISPLAY,
        }
    }
}

impl Normalization {
    pub fn new(normalizer: Normalizer, max_display: f64) -> Self {
        Self {
            normalizer,
            max_display,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.max_display.is_finite() || self.max_display <= 0.0 {
            return Err(AggregatorError::InvalidConfig(format!(
                "max display level must be positive, got {}",
                self.max_display
            )));
        }
        match self.normalizer {
            Normalizer::Linear { gain } => {
                if !gain.is_finite() || gain < 0.0 {
                    return Err(AggregatorError::InvalidConfig(format!(
                        "linear gain must be non-negative, got {gain}"
                    )));
                }
            }
            Normalizer::DecibelRange {
                floor_db,
                ceiling_db,
            } => {
                if !floor_db.is_finite() || !ceiling_db.is_finite() || ceiling_db <= floor_db {
                    return Err(AggregatorError::InvalidConfig(format!(
                        "decibel range [{floor_db}, {ceiling_db}] is empty"
                    )));
                }
            }
            Normalizer::RmsToDb { offset_db } => {
                if !offset_db.is_finite() {
                    return Err(AggregatorError::InvalidConfig(format!(
                        "rms offset must be finite, got {offset_db}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Map `raw` onto `[0, max_display]`. NaN reads as silence.
    pub fn normalize(&self, raw: f64) -> f64 {
        if raw.is_nan() {
            return 0.0;
        }
        let scaled = match self.normalizer {
            Normalizer::Linear { gain } => raw * gain,
            Normalizer::DecibelRange {
                floor_db,
                ceiling_db,
            } => (raw - floor_db) / (ceiling_db - floor_db) * self.max_display,
            Normalizer::RmsToDb { offset_db } => {
                if raw <= 0.0 {
                    0.0
                } else {
                    20.0 * raw.log10() + offset_db
                }
            }
        };
        // 0 * inf from a zero gain.
        if scaled.is_nan() {
            return 0.0;
        }
        scaled.clamp(0.0, self.max_display)
    }
}
