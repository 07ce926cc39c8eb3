use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{bail, Result};
use micmeter::config::{DEFAULT_ACTIVITY_THRESHOLD, DEFAULT_SILENCE_FLOOR, DEFAULT_WINDOW_SECS};
use micmeter::AggregatorConfig;

use crate::band::Bands;

pub const DEFAULT_FRAME_MS: u32 = 50;
pub const MIN_FRAME_MS: u32 = 20;
pub const MAX_FRAME_MS: u32 = 200;

/// Live microphone loudness meter.
#[derive(Debug, Parser, Clone)]
#[command(version)]
pub struct Cli {
    /// Trailing window used for the running average (seconds)
    #[arg(long = "window-secs", default_value_t = DEFAULT_WINDOW_SECS)]
    pub window_secs: f64,

    /// Display level above which time counts as speech
    #[arg(long = "activity-threshold", default_value_t = DEFAULT_ACTIVITY_THRESHOLD)]
    pub activity_threshold: f64,

    /// Display level below which samples are left out of the average
    #[arg(long = "silence-floor", default_value_t = DEFAULT_SILENCE_FLOOR)]
    pub silence_floor: f64,

    /// Measurement frame length (milliseconds)
    #[arg(long = "frame-ms", default_value_t = DEFAULT_FRAME_MS)]
    pub frame_ms: u32,

    /// Stop the session automatically after this many seconds
    #[arg(long = "max-session-secs")]
    pub max_session_secs: Option<f64>,

    /// Levels below this read as quiet
    #[arg(long = "quiet-below", default_value_t = Bands::default().quiet_below)]
    pub quiet_below: f64,

    /// Levels above this read as loud
    #[arg(long = "loud-above", default_value_t = Bands::default().loud_above)]
    pub loud_above: f64,

    /// Preferred audio input device name
    #[arg(long)]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Write logs to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Print the final session summary as JSON on exit
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl Cli {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let cli = Self::parse();
        cli.validate()?;
        Ok(cli)
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_FRAME_MS..=MAX_FRAME_MS).contains(&self.frame_ms) {
            bail!(
                "--frame-ms must be between {MIN_FRAME_MS} and {MAX_FRAME_MS}, got {}",
                self.frame_ms
            );
        }
        if let Some(limit) = self.max_session_secs {
            if !limit.is_finite() || limit <= 0.0 {
                bail!("--max-session-secs must be positive, got {limit}");
            }
        }
        self.bands().validate()?;
        if let Err(err) = self.aggregator_config().validate() {
            bail!("{err}");
        }
        Ok(())
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            window_duration_secs: self.window_secs,
            activity_threshold: self.activity_threshold,
            silence_floor: self.silence_floor,
            nominal_tick_secs: self.frame_ms as f64 / 1000.0,
            ..AggregatorConfig::default()
        }
    }

    pub fn bands(&self) -> Bands {
        Bands {
            quiet_below: self.quiet_below,
            loud_above: self.loud_above,
        }
    }
}
