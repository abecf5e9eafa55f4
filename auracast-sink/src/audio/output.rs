//! Output scheduler and hardware output clock
//!
//! `OutputScheduler::on_period_tick` runs once per block period from the
//! audio device callback. It must stay within a small, bounded fraction of
//! the period: no blocking calls, no allocation, no radio interaction.
//! While streaming it hands out the next ring slot by reference; while idle
//! it signals hardware codec recovery on every tick.

use crate::audio::block::StreamParams;
use crate::audio::ring_buffer::BlockConsumer;
use crate::state::StreamingFlag;
use auracast_common::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use tracing::{debug, info, warn};

/// Recovery action the scheduler issues while not streaming.
///
/// Implemented by the hardware codec driver (soft reset); tests use a
/// counting mock.
pub trait CodecRecovery: Send {
    fn recover(&self);
}

/// Result of one period tick
pub enum Tick<'a> {
    /// Next block to play, by address; valid until the next tick
    Block(&'a [i16]),

    /// Not streaming: the recovery action was issued, play silence
    Recovered,
}

/// Periodic consumer driving the hardware output from the block ring
pub struct OutputScheduler<R: CodecRecovery> {
    consumer: BlockConsumer,
    streaming: StreamingFlag,
    recovery: R,
}

impl<R: CodecRecovery> OutputScheduler<R> {
    pub fn new(consumer: BlockConsumer, streaming: StreamingFlag, recovery: R) -> Self {
        Self {
            consumer,
            streaming,
            recovery,
        }
    }

    /// Stereo samples per block
    pub fn block_len(&self) -> usize {
        self.consumer.block_len()
    }

    /// Invoked once per hardware output period.
    ///
    /// The recovery action runs on every idle tick, not only on the first
    /// transition out of streaming.
    pub fn on_period_tick(&mut self) -> Tick<'_> {
        if self.streaming.is_active() {
            Tick::Block(self.consumer.pop_next())
        } else {
            self.recovery.recover();
            Tick::Recovered
        }
    }
}

/// Hardware output clock built on a cpal stream.
///
/// The device callback is the periodic hardware context: it carves the
/// device buffer into block-period chunks and ticks the scheduler once per
/// chunk. Keep the returned value alive for as long as output should run.
pub struct OutputClock {
    _stream: cpal::Stream,
}

impl OutputClock {
    /// Open the output device and start the periodic callback.
    ///
    /// Falls back to the default device when the requested one is missing.
    pub fn start<R: CodecRecovery + 'static>(
        scheduler: OutputScheduler<R>,
        device_name: Option<&str>,
        params: &StreamParams,
    ) -> Result<Self> {
        let device = find_device(device_name)?;
        let sample_format = pick_sample_format(&device)?;

        let config = StreamConfig {
            channels: 2,
            sample_rate: cpal::SampleRate(params.sample_rate_hz),
            buffer_size: cpal::BufferSize::Default,
        };

        debug!(
            "Starting output clock: {} Hz, {} sample block period, format {:?}",
            params.sample_rate_hz,
            params.stereo_samples_per_block(),
            sample_format
        );

        let err_fn = |e| warn!("Audio output stream error: {}", e);
        let block_len = scheduler.block_len();

        let stream = match sample_format {
            SampleFormat::I16 => {
                let mut scheduler = scheduler;
                device
                    .build_output_stream(
                        &config,
                        move |data: &mut [i16], _| {
                            for chunk in data.chunks_mut(block_len) {
                                match scheduler.on_period_tick() {
                                    Tick::Block(block) => {
                                        let n = chunk.len().min(block.len());
                                        chunk[..n].copy_from_slice(&block[..n]);
                                    }
                                    Tick::Recovered => chunk.fill(0),
                                }
                            }
                        },
                        err_fn,
                        None,
                    )
                    .map_err(|e| Error::AudioOutput(format!("Cannot build stream: {}", e)))?
            }
            SampleFormat::F32 => {
                let mut scheduler = scheduler;
                device
                    .build_output_stream(
                        &config,
                        move |data: &mut [f32], _| {
                            for chunk in data.chunks_mut(block_len) {
                                match scheduler.on_period_tick() {
                                    Tick::Block(block) => {
                                        for (out, sample) in chunk.iter_mut().zip(block) {
                                            *out = f32::from(*sample) / 32_768.0;
                                        }
                                    }
                                    Tick::Recovered => chunk.fill(0.0),
                                }
                            }
                        },
                        err_fn,
                        None,
                    )
                    .map_err(|e| Error::AudioOutput(format!("Cannot build stream: {}", e)))?
            }
            other => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported device sample format: {:?}",
                    other
                )))
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Cannot start stream: {}", e)))?;

        Ok(Self { _stream: stream })
    }
}

/// Find the requested output device, falling back to the default
fn find_device(device_name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = device_name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Cannot enumerate devices: {}", e)))?;

        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Using requested audio device: {}", name);
            return Ok(device);
        }

        warn!("Requested device '{}' not found, falling back to default", name);
    }

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;

    info!(
        "Using default audio device: {}",
        device.name().unwrap_or_else(|_| "unknown".to_string())
    );
    Ok(device)
}

/// Pick a supported sample format, preferring native i16
fn pick_sample_format(device: &Device) -> Result<SampleFormat> {
    let default = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Cannot query device config: {}", e)))?;

    match default.sample_format() {
        SampleFormat::I16 | SampleFormat::F32 => Ok(default.sample_format()),
        _ => Ok(SampleFormat::F32),
    }
}
