//! Frame-level loudness measurement for capture callbacks.

/// Level reported for an empty frame (dBFS).
pub const EMPTY_FRAME_DB: f32 = -60.0;

// Keeps digital silence finite: 20 * log10(1e-6) = -120 dBFS.
const MIN_AMPLITUDE: f32 = 1e-6;

pub fn amplitude_to_dbfs(amplitude: f32) -> f32 {
    20.0 * amplitude.max(MIN_AMPLITUDE).log10()
}

/// RMS and peak level of one frame, in a single pass.
pub fn measure_frame(samples: &[f32]) -> (f32, f32) {
    if samples.is_empty() {
        return (EMPTY_FRAME_DB, EMPTY_FRAME_DB);
    }
    let (energy, peak) = samples
        .iter()
        .fold((0.0_f32, 0.0_f32), |(energy, peak), &s| {
            (energy + s * s, peak.max(s.abs()))
        });
    let rms = (energy / samples.len() as f32).sqrt();
    (amplitude_to_dbfs(rms), amplitude_to_dbfs(peak))
}

/// One measured frame, timed from the start of capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelFrame {
    pub time_secs: f64,
    pub rms_db: f32,
    pub peak_db: f32,
}

/// Cuts interleaved capture data into fixed-length frames.
///
/// Time is derived from the number of samples consumed, so frames are spaced
/// exactly `frame_ms` apart no matter how the driver sizes its callbacks.
#[derive(Debug)]
pub struct LevelFramer {
    frame_len: usize,
    samples_per_sec: f64,
    pending: Vec<f32>,
    consumed: u64,
}

impl LevelFramer {
    pub fn new(sample_rate: u32, channels: u16, frame_ms: u32) -> Self {
        let samples_per_sec = sample_rate as u64 * channels.max(1) as u64;
        let frame_len = ((samples_per_sec * frame_ms as u64) / 1000).max(1) as usize;
        Self {
            frame_len,
            samples_per_sec: samples_per_sec as f64,
            pending: Vec::with_capacity(frame_len),
            consumed: 0,
        }
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Append callback data and emit every frame it completes.
    pub fn push<F>(&mut self, data: &[f32], mut emit: F)
    where
        F: FnMut(LevelFrame),
    {
        let mut rest = data;
        while !rest.is_empty() {
            let take = (self.frame_len - self.pending.len()).min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.pending.len() == self.frame_len {
                self.consumed += self.frame_len as u64;
                let (rms_db, peak_db) = measure_frame(&self.pending);
                emit(LevelFrame {
                    time_secs: self.consumed as f64 / self.samples_per_sec,
                    rms_db,
                    peak_db,
                });
                self.pending.clear();
            }
        }
    }
}
