//! Decode pipeline
//!
//! Converts one received transport payload into one PCM frame, widens it to
//! the stereo output layout, splits it into hardware-period blocks, and
//! pushes them into the block ring. Runs on the radio stack's delivery
//! path, so it never blocks for unbounded time.
//!
//! Failure handling per frame:
//! - invalid payload: the decoder is still invoked with no input so its
//!   packet-loss concealment keeps the output block cadence
//! - decode error: logged, block fill skipped (a sustained run of these
//!   surfaces as an underrun downstream, never a fault)
//! - configuration failure: logged once, decoding disabled for the session

use crate::audio::block::{zero_pad_stereo, StreamParams};
use crate::audio::ring_buffer::BlockProducer;
use crate::state::StreamingFlag;
use auracast_common::{CodecParams, Result, SinkConfig};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, trace, warn};

/// Log every Nth skipped payload while unconfigured
const SKIP_LOG_INTERVAL: u64 = 100;

/// Opaque frame decoder seam.
///
/// `payload` is `None` when the transport flagged the payload invalid; the
/// decoder must then run its concealment path and still fill `pcm_out`
/// with a best-effort substitute frame.
pub trait FrameDecoder: Send {
    fn decode(&mut self, payload: Option<&[u8]>, pcm_out: &mut [i16]) -> Result<()>;
}

/// Plain 16-bit little-endian PCM decoder with repeat-and-decay concealment
pub struct PcmDecoder {
    last_frame: Vec<i16>,
}

impl PcmDecoder {
    pub fn new() -> Self {
        Self {
            last_frame: Vec::new(),
        }
    }
}

impl Default for PcmDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder for PcmDecoder {
    fn decode(&mut self, payload: Option<&[u8]>, pcm_out: &mut [i16]) -> Result<()> {
        match payload {
            Some(bytes) => {
                if bytes.len() != pcm_out.len() * 2 {
                    return Err(auracast_common::Error::Decode(format!(
                        "payload is {} octets, expected {}",
                        bytes.len(),
                        pcm_out.len() * 2
                    )));
                }

                for (sample, pair) in pcm_out.iter_mut().zip(bytes.chunks_exact(2)) {
                    *sample = i16::from_le_bytes([pair[0], pair[1]]);
                }

                self.last_frame.clear();
                self.last_frame.extend_from_slice(pcm_out);
                Ok(())
            }
            None => {
                // Concealment: replay the previous frame, halving it each
                // consecutive loss so a burst decays to silence.
                if self.last_frame.len() == pcm_out.len() {
                    pcm_out.copy_from_slice(&self.last_frame);
                } else {
                    pcm_out.fill(0);
                }
                for sample in &mut self.last_frame {
                    *sample /= 2;
                }
                Ok(())
            }
        }
    }
}

/// Decode pipeline shared between the control context (configuration) and
/// the radio delivery context (payloads)
pub type SharedPipeline = Arc<Mutex<DecodePipeline>>;

pub struct DecodePipeline {
    decoder: Box<dyn FrameDecoder>,
    producer: BlockProducer,
    streaming: StreamingFlag,

    /// Hardware block period the output clock runs at
    block_period_us: u32,

    /// Negotiated geometry; `None` until configured or after a
    /// configuration failure
    params: Option<StreamParams>,

    /// A configuration error was already reported for this session
    config_failed: bool,

    /// Frames to buffer before arming the output path
    primer_frames: u32,
    primer_remaining: u32,

    /// Payloads dropped while unconfigured (rate-limited logging)
    skipped_payloads: u64,

    mono_buf: Vec<i16>,
    stereo_buf: Vec<i16>,
}

impl DecodePipeline {
    pub fn new(
        decoder: Box<dyn FrameDecoder>,
        producer: BlockProducer,
        streaming: StreamingFlag,
        config: &SinkConfig,
    ) -> Self {
        Self {
            decoder,
            producer,
            streaming,
            block_period_us: config.block_period_us,
            params: None,
            config_failed: false,
            primer_frames: config.startup_primer_frames,
            primer_remaining: config.startup_primer_frames,
            skipped_payloads: 0,
            mono_buf: Vec::new(),
            stereo_buf: Vec::new(),
        }
    }

    /// Negotiate the session geometry from the BASE codec parameters.
    ///
    /// Called once per session by the control context. Frequency and frame
    /// duration must both resolve and match the ring's block size or
    /// decoding stays disabled until the next session reset.
    pub fn configure(&mut self, params: &CodecParams) {
        let negotiated = match StreamParams::negotiate(params, self.block_period_us) {
            Ok(p) => p,
            Err(e) => {
                if !self.config_failed {
                    error!("Cannot configure decoder, disabling for this session: {}", e);
                    self.config_failed = true;
                }
                return;
            }
        };

        if negotiated.stereo_samples_per_block() != self.producer.block_len() {
            if !self.config_failed {
                error!(
                    "Negotiated block size {} does not match ring slot size {}, \
                     disabling decoding for this session",
                    negotiated.stereo_samples_per_block(),
                    self.producer.block_len()
                );
                self.config_failed = true;
            }
            return;
        }

        self.mono_buf = vec![0; negotiated.mono_samples_per_frame()];
        self.stereo_buf = vec![0; negotiated.stereo_samples_per_frame()];
        self.primer_remaining = self.primer_frames;
        self.params = Some(negotiated);

        debug!(
            "Decoder configured: {} Hz, {} us frames, {} blocks per frame",
            negotiated.sample_rate_hz,
            negotiated.frame_duration_us,
            negotiated.blocks_per_frame()
        );
    }

    /// Tear down per-session state; the next session re-attempts
    /// configuration from scratch.
    pub fn reset(&mut self) {
        self.params = None;
        self.config_failed = false;
        self.primer_remaining = self.primer_frames;
        self.streaming.disarm();
    }

    /// Handle one inbound transport payload.
    ///
    /// `valid` is false when the payload was lost or corrupted in transit.
    pub fn on_payload(&mut self, payload: &[u8], valid: bool) {
        let Some(params) = self.params else {
            self.skipped_payloads += 1;
            if self.skipped_payloads % SKIP_LOG_INTERVAL == 1 {
                trace!(
                    "Decoder not configured, dropping payload (total: {})",
                    self.skipped_payloads
                );
            }
            return;
        };

        let input = if valid { Some(payload) } else { None };
        if let Err(e) = self.decoder.decode(input, &mut self.mono_buf) {
            // Skip the block fill; sustained errors show up as underruns
            warn!("Frame decode failed: {}", e);
            return;
        }

        zero_pad_stereo(&self.mono_buf, &mut self.stereo_buf);

        let block_len = params.stereo_samples_per_block();
        for block in self.stereo_buf.chunks_exact(block_len) {
            self.producer.push(block);
        }

        if self.primer_remaining > 0 {
            self.primer_remaining -= 1;
            if self.primer_remaining == 0 {
                debug!(
                    "Buffered {} primer frames, arming output",
                    self.primer_frames
                );
                self.streaming.arm();
            }
        }
    }
}
