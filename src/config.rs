//! Aggregator configuration and defaults.

use serde::{Deserialize, Serialize};

use crate::error::{AggregatorError, Result};
use crate::normalize::Normalization;

/// Trailing window kept for the running average (seconds).
pub const DEFAULT_WINDOW_SECS: f64 = 5.0;

/// Display level above which time counts as speech.
pub const DEFAULT_ACTIVITY_THRESHOLD: f64 = 30.0;

/// Display level below which a sample is left out of the average.
pub const DEFAULT_SILENCE_FLOOR: f64 = 10.0;

/// Active time credited to the first sample of a session (seconds).
pub const DEFAULT_NOMINAL_TICK_SECS: f64 = 0.1;

/// Minimum speech time for a stopped session to report a non-zero average.
pub const MIN_ACTIVE_SECS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    pub window_duration_secs: f64,
    pub activity_threshold: f64,
    pub silence_floor: f64,
    pub nominal_tick_secs: f64,
    pub normalization: Normalization,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window_duration_secs: DEFAULT_WINDOW_SECS,
            activity_threshold: DEFAULT_ACTIVITY_THRESHOLD,
            silence_floor: DEFAULT_SILENCE_FLOOR,
            nominal_tick_secs: DEFAULT_NOMINAL_TICK_SECS,
            normalization: Normalization::default(),
        }
    }
}

impl AggregatorConfig {
    pub fn validate(&self) -> Result<()> {
        positive("window duration", self.window_duration_secs)?;
        positive("activity threshold", self.activity_threshold)?;
        positive("nominal tick", self.nominal_tick_secs)?;
        if !self.silence_floor.is_finite() || self.silence_floor < 0.0 {
            return Err(AggregatorError::InvalidConfig(format!(
                "silence floor must be non-negative, got {}",
                self.silence_floor
            )));
        }
        self.normalization.validate()
    }
}

fn positive(label: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AggregatorError::InvalidConfig(format!(
            "{label} must be positive, got {value}"
        )))
    }
}
