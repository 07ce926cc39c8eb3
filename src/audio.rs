use color_eyre::eyre::{bail, eyre, Result, WrapErr};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use micmeter::{LevelFrame, LevelFramer};
use tracing::{info, warn};

// Roughly ten seconds of frames at the default cadence.
const FRAME_CHANNEL_CAPACITY: usize = 256;

pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .wrap_err("no input devices available")?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// A running microphone capture that reports one [`LevelFrame`] per frame.
///
/// Dropping it stops the stream.
pub struct MicSource {
    _stream: cpal::Stream,
    frames: Receiver<LevelFrame>,
    device_name: String,
}

impl MicSource {
    pub fn open(preferred_device: Option<&str>, frame_ms: u32) -> Result<Self> {
        let host = cpal::default_host();
        let device = match preferred_device {
            Some(name) => host
                .input_devices()
                .wrap_err("no input devices available")?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| eyre!("input device '{name}' not found"))?,
            None => host
                .default_input_device()
                .ok_or_else(|| eyre!("no default input device available"))?,
        };
        let device_name = device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string());

        let supported = device
            .default_input_config()
            .wrap_err("failed to query input config")?;
        let format = supported.sample_format();
        let config: StreamConfig = supported.into();
        let framer = LevelFramer::new(config.sample_rate.0, config.channels, frame_ms);
        let (tx, rx) = bounded(FRAME_CHANNEL_CAPACITY);

        let stream = match format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, framer, tx, |s| s)?,
            SampleFormat::I16 => {
                build_stream::<i16>(&device, &config, framer, tx, |s| s as f32 / 32_768.0)?
            }
            SampleFormat::U16 => build_stream::<u16>(&device, &config, framer, tx, |s| {
                (s as f32 - 32_768.0) / 32_768.0
            })?,
            other => bail!("unsupported sample format: {other:?}"),
        };
        stream.play().wrap_err("failed to start input stream")?;

        info!(
            device = %device_name,
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            frame_ms,
            "microphone capture started"
        );

        Ok(Self {
            _stream: stream,
            frames: rx,
            device_name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Frames captured since the last call, oldest first.
    pub fn drain(&self) -> impl Iterator<Item = LevelFrame> + '_ {
        self.frames.try_iter()
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut framer: LevelFramer,
    tx: Sender<LevelFrame>,
    convert: fn(T) -> f32,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + 'static,
{
    let mut scratch = Vec::new();
    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _| {
                scratch.clear();
                scratch.extend(data.iter().map(|&s| convert(s)));
                framer.push(&scratch, |frame| {
                    // The UI drains every tick; a full channel means it stalled.
                    if let Err(TrySendError::Full(_)) = tx.try_send(frame) {
                        warn!("level frame dropped, consumer is behind");
                    }
                });
            },
            |err| warn!("audio stream error: {err}"),
            None,
        )
        .wrap_err("failed to build input stream")?;
    Ok(stream)
}
