//! Loudness sampling and windowed aggregation for microphone meters.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod level;
pub mod normalize;

pub use aggregator::{LoudnessAggregator, Sample, SessionPhase, SessionState, Snapshot, StopSummary};
pub use config::AggregatorConfig;
pub use error::{AggregatorError, Result};
pub use level::{LevelFrame, LevelFramer};
pub use normalize::{Normalization, Normalizer};
