//! Time-windowed loudness aggregation.
//!
//! [`LoudnessAggregator`] is fed `(raw_level, time_secs)` pairs by whatever
//! owns the audio stream. Each sample is normalized, appended to a trailing
//! window, and folded into a running average (near-silence excluded) and a
//! cumulative speech-time counter. The aggregator has no timers or threads;
//! callers serialize access themselves.

use std::collections::VecDeque;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{AggregatorConfig, MIN_ACTIVE_SECS};
use crate::error::{AggregatorError, Result};

/// One normalized reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub time_secs: f64,
    pub raw_level: f64,
    pub display_level: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    Active,
    Stopped,
}

/// Per-session counters. Zeroed by `start` and `clear`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionState {
    pub is_active: bool,
    pub started_at: Option<Instant>,
    pub elapsed_secs: f64,
    pub active_duration_secs: f64,
    pub running_average: f64,
}

/// Read-only view for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Snapshot {
    pub current_level: f64,
    pub running_average: f64,
    pub active_duration_secs: f64,
    pub elapsed_secs: f64,
    pub sample_count: usize,
}

/// What `stop` reports for the finished session.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StopSummary {
    pub final_average: f64,
    pub active_duration_secs: f64,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Default)]
pub struct LoudnessAggregator {
    config: AggregatorConfig,
    phase: SessionPhase,
    window: VecDeque<Sample>,
    session: SessionState,
    last_sample_time: Option<f64>,
    // Sum and count of window samples at or above the silence floor,
    // rebuilt from the window whenever one of them is evicted.
    qualifying_sum: f64,
    qualifying_count: usize,
    rejected: u64,
    last_summary: Option<StopSummary>,
}

impl LoudnessAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn state(&self) -> SessionPhase {
        self.phase
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Start a session with the given window and threshold, keeping the rest
    /// of the held configuration.
    pub fn start(&mut self, window_duration_secs: f64, activity_threshold: f64) -> Result<()> {
        let config = AggregatorConfig {
            window_duration_secs,
            activity_threshold,
            ..self.config
        };
        self.start_with(config)
    }

    /// Start (or re-arm) a session. On error nothing changes.
    pub fn start_with(&mut self, config: AggregatorConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.reset_history();
        self.phase = SessionPhase::Active;
        self.session = SessionState {
            is_active: true,
            started_at: Some(Instant::now()),
            ..SessionState::default()
        };
        info!(
            window_secs = config.window_duration_secs,
            threshold = config.activity_threshold,
            "loudness session started"
        );
        Ok(())
    }

    /// Fold one reading into the window. Rejected samples leave the window
    /// and session untouched; only the rejection counter moves.
    pub fn push_sample(&mut self, raw_level: f64, time_secs: f64) -> Result<()> {
        if self.phase != SessionPhase::Active {
            self.rejected += 1;
            return Err(AggregatorError::InactiveSession);
        }
        let previous = self.last_sample_time;
        let lower_bound = previous.unwrap_or(0.0);
        if !time_secs.is_finite() || time_secs < lower_bound {
            self.rejected += 1;
            warn!(time_secs, previous = lower_bound, "dropping out-of-order sample");
            return Err(AggregatorError::OutOfOrderSample {
                time: time_secs,
                previous: lower_bound,
            });
        }

        let display_level = self.config.normalization.normalize(raw_level);
        let sample = Sample {
            time_secs,
            raw_level,
            display_level,
        };
        if display_level >= self.config.silence_floor {
            self.qualifying_sum += display_level;
            self.qualifying_count += 1;
        }
        self.window.push_back(sample);
        self.evict_before(time_secs - self.config.window_duration_secs);

        if self.qualifying_count > 0 {
            self.session.running_average = self.qualifying_sum / self.qualifying_count as f64;
        }

        if display_level > self.config.activity_threshold {
            let delta = match previous {
                Some(prev) => time_secs - prev,
                None => self.config.nominal_tick_secs,
            };
            self.session.active_duration_secs += delta;
        }
        self.session.elapsed_secs = time_secs;
        self.last_sample_time = Some(time_secs);
        Ok(())
    }

    /// End the session. Less than a second of speech reports a zero average.
    pub fn stop(&mut self) -> Result<StopSummary> {
        if self.phase != SessionPhase::Active {
            return Err(AggregatorError::InactiveSession);
        }
        self.phase = SessionPhase::Stopped;
        self.session.is_active = false;

        let final_average = if self.session.active_duration_secs < MIN_ACTIVE_SECS {
            0.0
        } else {
            self.session.running_average
        };
        let summary = StopSummary {
            final_average,
            active_duration_secs: self.session.active_duration_secs,
            elapsed_secs: self.session.elapsed_secs,
        };
        self.last_summary = Some(summary);
        info!(
            final_average = summary.final_average,
            active_secs = summary.active_duration_secs,
            elapsed_secs = summary.elapsed_secs,
            "loudness session stopped"
        );
        Ok(summary)
    }

    /// Drop all history without leaving the current phase.
    pub fn clear(&mut self) {
        self.reset_history();
        self.session = SessionState {
            is_active: self.session.is_active,
            started_at: self.session.started_at,
            ..SessionState::default()
        };
        debug!(phase = ?self.phase, "loudness history cleared");
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            current_level: self.window.back().map_or(0.0, |s| s.display_level),
            running_average: self.session.running_average,
            active_duration_secs: self.session.active_duration_secs,
            elapsed_secs: self.session.elapsed_secs,
            sample_count: self.window.len(),
        }
    }

    /// Retained samples, oldest first.
    pub fn window(&self) -> impl ExactSizeIterator<Item = &Sample> + '_ {
        self.window.iter()
    }

    pub fn rejected_samples(&self) -> u64 {
        self.rejected
    }

    pub fn last_summary(&self) -> Option<StopSummary> {
        self.last_summary
    }

    fn reset_history(&mut self) {
        self.window.clear();
        self.last_sample_time = None;
        self.qualifying_sum = 0.0;
        self.qualifying_count = 0;
        self.rejected = 0;
    }

    fn evict_before(&mut self, cutoff: f64) {
        let mut evicted_qualifying = false;
        while let Some(front) = self.window.front() {
            if front.time_secs >= cutoff {
                break;
            }
            evicted_qualifying |= front.display_level >= self.config.silence_floor;
            self.window.pop_front();
        }
        // Subtracting from the running sum cancels badly when a loud sample
        // leaves a window of quiet ones, so rebuild it from what remains.
        if evicted_qualifying {
            self.recount_qualifying();
        }
    }

    fn recount_qualifying(&mut self) {
        let floor = self.config.silence_floor;
        let (sum, count) = self
            .window
            .iter()
            .filter(|s| s.display_level >= floor)
            .fold((0.0, 0), |(sum, count), s| (sum + s.display_level, count + 1));
        self.qualifying_sum = sum;
        self.qualifying_count = count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{Normalization, Normalizer};

    // Raw values pass straight through onto a 0..100 scale.
    fn identity_config() -> AggregatorConfig {
        AggregatorConfig {
            window_duration_secs: 5.0,
            activity_threshold: 10.0,
            silence_floor: 10.0,
            nominal_tick_secs: 0.1,
            normalization: Normalization::new(Normalizer::Linear { gain: 1.0 }, 100.0),
        }
    }

    fn active(config: AggregatorConfig) -> LoudnessAggregator {
        let mut agg = LoudnessAggregator::new(config);
        agg.start_with(config).unwrap();
        agg
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn new_aggregator_is_idle_and_empty() {
        let agg = LoudnessAggregator::default();
        assert_eq!(agg.state(), SessionPhase::Idle);
        assert_eq!(agg.snapshot(), Snapshot::default());
    }

    #[test]
    fn push_before_start_is_rejected() {
        let mut agg = LoudnessAggregator::new(identity_config());
        assert_eq!(
            agg.push_sample(50.0, 0.0),
            Err(AggregatorError::InactiveSession)
        );
        assert_eq!(agg.snapshot().sample_count, 0);
        assert_eq!(agg.rejected_samples(), 1);
    }

    #[test]
    fn invalid_start_keeps_prior_state() {
        let mut agg = active(identity_config());
        agg.push_sample(50.0, 0.0).unwrap();
        let before = agg.snapshot();

        assert!(matches!(
            agg.start(0.0, 10.0),
            Err(AggregatorError::InvalidConfig(_))
        ));
        assert_eq!(agg.state(), SessionPhase::Active);
        assert_eq!(agg.snapshot(), before);
        assert_eq!(agg.config().window_duration_secs, 5.0);
    }

    #[test]
    fn eviction_keeps_samples_on_the_boundary() {
        let mut agg = active(identity_config());
        for (t, level) in [(0.0, 50.0), (0.5, 60.0), (1.0, 5.0), (6.0, 70.0)] {
            agg.push_sample(level, t).unwrap();
        }
        let times: Vec<f64> = agg.window().map(|s| s.time_secs).collect();
        assert_eq!(times, vec![1.0, 6.0]);
        // 0.1 nominal tick + 0.5 + 5.0; the 5.0-level sample adds nothing.
        assert!(approx(agg.snapshot().active_duration_secs, 5.6));
        // The sample at level 5 sits under the silence floor.
        assert!(approx(agg.snapshot().running_average, 70.0));
    }

    #[test]
    fn average_excludes_near_silence() {
        let mut agg = active(identity_config());
        agg.push_sample(40.0, 0.0).unwrap();
        agg.push_sample(2.0, 0.1).unwrap();
        agg.push_sample(60.0, 0.2).unwrap();
        assert!(approx(agg.snapshot().running_average, 50.0));
    }

    #[test]
    fn average_holds_when_window_has_only_silence() {
        let mut agg = active(identity_config());
        agg.push_sample(40.0, 0.0).unwrap();
        agg.push_sample(3.0, 10.0).unwrap();
        let snap = agg.snapshot();
        assert_eq!(snap.sample_count, 1);
        assert!(approx(snap.running_average, 40.0));
        assert!(approx(snap.current_level, 3.0));
    }

    #[test]
    fn out_of_order_sample_changes_nothing() {
        let mut agg = active(identity_config());
        agg.push_sample(50.0, 1.0).unwrap();
        agg.push_sample(60.0, 2.0).unwrap();
        let before = agg.snapshot();
        let window_before: Vec<Sample> = agg.window().copied().collect();

        assert_eq!(
            agg.push_sample(90.0, 1.5),
            Err(AggregatorError::OutOfOrderSample {
                time: 1.5,
                previous: 2.0
            })
        );
        assert_eq!(agg.snapshot(), before);
        assert_eq!(agg.window().copied().collect::<Vec<_>>(), window_before);
        assert_eq!(agg.rejected_samples(), 1);

        // The session keeps going.
        agg.push_sample(70.0, 2.5).unwrap();
        assert_eq!(agg.snapshot().sample_count, 3);
    }

    #[test]
    fn rejects_negative_and_non_finite_times() {
        let mut agg = active(identity_config());
        assert!(agg.push_sample(50.0, -0.1).is_err());
        assert!(agg.push_sample(50.0, f64::NAN).is_err());
        assert!(agg.push_sample(50.0, f64::INFINITY).is_err());
        assert_eq!(agg.snapshot().sample_count, 0);
    }

    #[test]
    fn equal_timestamps_are_accepted() {
        let mut agg = active(identity_config());
        agg.push_sample(50.0, 1.0).unwrap();
        agg.push_sample(50.0, 1.0).unwrap();
        assert_eq!(agg.snapshot().sample_count, 2);
        assert!(approx(agg.snapshot().active_duration_secs, 0.1));
    }

    #[test]
    fn stop_with_little_speech_reports_zero_average() {
        let mut agg = active(identity_config());
        agg.push_sample(80.0, 0.0).unwrap();
        agg.push_sample(80.0, 0.5).unwrap();
        let summary = agg.stop().unwrap();
        assert_eq!(summary.final_average, 0.0);
        assert!(approx(summary.active_duration_secs, 0.6));
        assert!(approx(summary.elapsed_secs, 0.5));
        assert_eq!(agg.state(), SessionPhase::Stopped);
        assert!(!agg.session().is_active);
        assert_eq!(agg.last_summary(), Some(summary));
    }

    #[test]
    fn stop_with_enough_speech_reports_window_average() {
        let mut agg = active(identity_config());
        for i in 0..=20 {
            agg.push_sample(40.0, i as f64 * 0.1).unwrap();
        }
        let summary = agg.stop().unwrap();
        assert!(summary.active_duration_secs >= MIN_ACTIVE_SECS);
        assert!(approx(summary.final_average, 40.0));
    }

    #[test]
    fn stop_requires_an_active_session() {
        let mut agg = LoudnessAggregator::default();
        assert_eq!(agg.stop(), Err(AggregatorError::InactiveSession));
        agg.start(5.0, 10.0).unwrap();
        agg.stop().unwrap();
        assert_eq!(agg.stop(), Err(AggregatorError::InactiveSession));
        assert_eq!(
            agg.push_sample(50.0, 1.0),
            Err(AggregatorError::InactiveSession)
        );
    }

    #[test]
    fn restart_after_stop_begins_fresh() {
        let mut agg = active(identity_config());
        agg.push_sample(50.0, 3.0).unwrap();
        agg.stop().unwrap();
        agg.start(5.0, 10.0).unwrap();
        assert_eq!(agg.state(), SessionPhase::Active);
        assert_eq!(agg.snapshot(), Snapshot::default());
        // Time restarts at session zero.
        agg.push_sample(50.0, 0.0).unwrap();
    }

    #[test]
    fn clear_during_session_keeps_recording() {
        let mut agg = active(identity_config());
        agg.push_sample(50.0, 0.0).unwrap();
        agg.push_sample(60.0, 1.0).unwrap();
        agg.clear();

        assert_eq!(agg.snapshot(), Snapshot::default());
        assert_eq!(agg.state(), SessionPhase::Active);
        assert!(agg.session().is_active);

        agg.push_sample(70.0, 0.5).unwrap();
        let snap = agg.snapshot();
        assert_eq!(snap.sample_count, 1);
        assert!(approx(snap.active_duration_secs, 0.1));
    }

    #[test]
    fn clear_is_legal_when_idle_or_stopped() {
        let mut agg = LoudnessAggregator::default();
        agg.clear();
        assert_eq!(agg.state(), SessionPhase::Idle);

        let mut agg = active(identity_config());
        agg.push_sample(50.0, 0.0).unwrap();
        agg.stop().unwrap();
        agg.clear();
        assert_eq!(agg.state(), SessionPhase::Stopped);
        assert_eq!(agg.snapshot(), Snapshot::default());
    }

    #[test]
    fn evicting_a_loud_sample_keeps_quiet_ones_averaged() {
        let mut agg = active(AggregatorConfig {
            window_duration_secs: 1.0,
            silence_floor: 0.5,
            normalization: Normalization::new(Normalizer::Linear { gain: 1.0 }, 1e20),
            ..identity_config()
        });
        agg.push_sample(1e20, 0.0).unwrap();
        agg.push_sample(1.0, 0.5).unwrap();
        agg.push_sample(1.0, 1.2).unwrap();

        let levels: Vec<f64> = agg.window().map(|s| s.display_level).collect();
        assert_eq!(levels, vec![1.0, 1.0]);
        assert_eq!(agg.snapshot().running_average, 1.0);
    }

    #[test]
    fn average_matches_window_after_many_evictions() {
        let mut agg = active(AggregatorConfig {
            window_duration_secs: 0.2,
            ..identity_config()
        });
        for i in 0..50_000u32 {
            let level = 10.0 + f64::from(i * 7919 % 90) + 0.37;
            agg.push_sample(level, f64::from(i) * 0.01).unwrap();
        }
        let floor = agg.config().silence_floor;
        let qualifying: Vec<f64> = agg
            .window()
            .map(|s| s.display_level)
            .filter(|&l| l >= floor)
            .collect();
        let exact = qualifying.iter().sum::<f64>() / qualifying.len() as f64;
        assert!((agg.snapshot().running_average - exact).abs() < 1e-9);
    }

    #[test]
    fn running_sum_tracks_long_sessions() {
        let mut agg = active(identity_config());
        for i in 0..10_000 {
            let level = if i % 2 == 0 { 20.0 } else { 60.0 };
            agg.push_sample(level, i as f64 * 0.05).unwrap();
        }
        let snap = agg.snapshot();
        // 5s window at 50ms cadence; the boundary sample may round either way.
        assert!((100..=101).contains(&snap.sample_count));
        assert!((snap.running_average - 40.0).abs() < 0.5);
    }
}
