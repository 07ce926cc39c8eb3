//! Error types for the loudness engine.

use thiserror::Error;

/// Errors reported by [`LoudnessAggregator`](crate::LoudnessAggregator).
///
/// None of these leave the aggregator half-updated: a rejected call is a no-op
/// on the window and session state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregatorError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no active session")]
    InactiveSession,

    #[error("sample at {time}s arrived after {previous}s")]
    OutOfOrderSample { time: f64, previous: f64 },
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
