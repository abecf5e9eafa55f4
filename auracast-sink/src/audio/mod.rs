//! Audio datapath: block geometry, ring buffer, decode pipeline, output

pub mod block;
pub mod decode;
pub mod output;
pub mod ring_buffer;

pub use block::{zero_pad_stereo, StreamParams};
pub use decode::{DecodePipeline, FrameDecoder, PcmDecoder, SharedPipeline};
pub use output::{CodecRecovery, OutputClock, OutputScheduler, Tick};
pub use ring_buffer::{BlockConsumer, BlockProducer, BlockRing, RingStats};
