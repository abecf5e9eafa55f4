//! Audio block geometry and channel widening
//!
//! One audio block covers exactly one hardware output period. The decode
//! pipeline splits each decoded codec frame into `blocks_per_frame` blocks
//! and the output scheduler consumes one block per tick.
//!
//! Samples are signed 16-bit PCM, stereo interleaved once widened.

use auracast_common::{CodecParams, Error, Result, SinkConfig};

/// Negotiated stream geometry
///
/// Built once per session from the BASE codec parameters (or from the
/// config defaults for sizing the ring buffer at startup). All derived
/// sizes must be integral or negotiation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    /// Sampling frequency in Hz
    pub sample_rate_hz: u32,

    /// Codec frame duration in microseconds
    pub frame_duration_us: u32,

    /// Hardware output block period in microseconds
    pub block_period_us: u32,
}

impl StreamParams {
    pub fn new(sample_rate_hz: u32, frame_duration_us: u32, block_period_us: u32) -> Result<Self> {
        if sample_rate_hz == 0 || frame_duration_us == 0 || block_period_us == 0 {
            return Err(Error::Config("stream parameters must be non-zero".into()));
        }
        if frame_duration_us % block_period_us != 0 {
            return Err(Error::Config(format!(
                "frame duration {} us is not a whole number of {} us blocks",
                frame_duration_us, block_period_us
            )));
        }
        if (u64::from(sample_rate_hz) * u64::from(block_period_us)) % 1_000_000 != 0 {
            return Err(Error::Config(format!(
                "block period {} us is not a whole number of samples at {} Hz",
                block_period_us, sample_rate_hz
            )));
        }

        Ok(Self {
            sample_rate_hz,
            frame_duration_us,
            block_period_us,
        })
    }

    /// Geometry used to size the ring buffer before any session exists
    pub fn from_config(config: &SinkConfig) -> Result<Self> {
        Self::new(
            config.sample_rate_hz,
            config.frame_duration_us,
            config.block_period_us,
        )
    }

    /// Negotiate geometry from announced codec parameters.
    ///
    /// Frequency and frame duration must both resolve to valid values or
    /// negotiation fails and decoding stays disabled for the session.
    pub fn negotiate(params: &CodecParams, block_period_us: u32) -> Result<Self> {
        let sample_rate_hz = params
            .sample_rate_hz
            .ok_or_else(|| Error::Config("codec frequency not set, cannot start codec".into()))?;
        let frame_duration_us = params
            .frame_duration_us
            .ok_or_else(|| Error::Config("frame duration not set, cannot start codec".into()))?;

        Self::new(sample_rate_hz, frame_duration_us, block_period_us)
    }

    /// Mono samples in one block
    pub fn mono_samples_per_block(&self) -> usize {
        (u64::from(self.sample_rate_hz) * u64::from(self.block_period_us) / 1_000_000) as usize
    }

    /// Stereo interleaved samples in one block
    pub fn stereo_samples_per_block(&self) -> usize {
        self.mono_samples_per_block() * 2
    }

    /// Blocks produced per codec frame
    pub fn blocks_per_frame(&self) -> usize {
        (self.frame_duration_us / self.block_period_us) as usize
    }

    /// Mono samples in one decoded frame
    pub fn mono_samples_per_frame(&self) -> usize {
        self.mono_samples_per_block() * self.blocks_per_frame()
    }

    /// Stereo interleaved samples in one widened frame
    pub fn stereo_samples_per_frame(&self) -> usize {
        self.mono_samples_per_frame() * 2
    }
}

/// Widen a mono frame to the stereo output layout.
///
/// Decoded samples are interleaved with appended zero-valued channels:
/// `output[2i] = input[i]`, `output[2i + 1] = 0`. This is a placeholder
/// widening rule rather than true upmixing, and downstream consumers rely
/// on it exactly.
pub fn zero_pad_stereo(input: &[i16], output: &mut [i16]) {
    debug_assert_eq!(output.len(), input.len() * 2);

    for (pair, sample) in output.chunks_exact_mut(2).zip(input) {
        pair[0] = *sample;
        pair[1] = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry() {
        let params = StreamParams::new(16_000, 10_000, 1_000).unwrap();
        assert_eq!(params.mono_samples_per_block(), 16);
        assert_eq!(params.stereo_samples_per_block(), 32);
        assert_eq!(params.blocks_per_frame(), 10);
        assert_eq!(params.mono_samples_per_frame(), 160);
        assert_eq!(params.stereo_samples_per_frame(), 320);
    }

    #[test]
    fn rejects_non_integral_geometry() {
        // 3 ms blocks don't divide a 10 ms frame
        assert!(StreamParams::new(16_000, 10_000, 3_000).is_err());
        // 44.1 kHz yields 44.1 samples per 1 ms block
        assert!(StreamParams::new(44_100, 10_000, 1_000).is_err());
        assert!(StreamParams::new(0, 10_000, 1_000).is_err());
    }

    #[test]
    fn negotiate_requires_both_parameters() {
        let missing_rate = CodecParams {
            sample_rate_hz: None,
            frame_duration_us: Some(10_000),
        };
        assert!(StreamParams::negotiate(&missing_rate, 1_000).is_err());

        let missing_duration = CodecParams {
            sample_rate_hz: Some(16_000),
            frame_duration_us: None,
        };
        assert!(StreamParams::negotiate(&missing_duration, 1_000).is_err());

        let complete = CodecParams {
            sample_rate_hz: Some(16_000),
            frame_duration_us: Some(10_000),
        };
        assert!(StreamParams::negotiate(&complete, 1_000).is_ok());
    }

    #[test]
    fn zero_pad_widening_rule() {
        // Even output indices carry the decoded input in order, odd indices
        // are the inserted zero channel.
        let input: Vec<i16> = (1..=8).collect();
        let mut output = vec![0x7FFF; input.len() * 2];

        zero_pad_stereo(&input, &mut output);

        for (i, sample) in input.iter().enumerate() {
            assert_eq!(output[2 * i], *sample);
            assert_eq!(output[2 * i + 1], 0);
        }
    }
}
