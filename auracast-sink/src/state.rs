//! Shared playback state
//!
//! The streaming flag is the only state shared between the control context
//! and the periodic output context. It is the AND of two conditions:
//! the handshake reached Streaming (set by the sync state machine) and the
//! first output buffers were armed (set by the decode pipeline once the
//! startup primer frames have been buffered).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide streaming flag, cheap to clone into every context
#[derive(Debug, Clone)]
pub struct StreamingFlag {
    inner: Arc<Flags>,
}

#[derive(Debug, Default)]
struct Flags {
    /// All joined streams reported started
    streaming: AtomicBool,

    /// The decode pipeline has buffered the startup primer frames
    armed: AtomicBool,
}

impl StreamingFlag {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Flags::default()),
        }
    }

    /// Set by the sync state machine when all joined streams have started,
    /// cleared on stream stop, sync loss, and session reset.
    pub fn set_streaming(&self, on: bool) {
        self.inner.streaming.store(on, Ordering::Release);
    }

    /// Set by the decode pipeline once the primer frames are buffered
    pub fn arm(&self) {
        self.inner.armed.store(true, Ordering::Release);
    }

    /// Cleared by the decode pipeline on session reset
    pub fn disarm(&self) {
        self.inner.armed.store(false, Ordering::Release);
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.streaming.load(Ordering::Acquire)
    }

    /// Read by the output scheduler on every tick to decide between
    /// driving audio and signalling codec recovery
    pub fn is_active(&self) -> bool {
        self.inner.streaming.load(Ordering::Acquire) && self.inner.armed.load(Ordering::Acquire)
    }
}

impl Default for StreamingFlag {
    fn default() -> Self {
        Self::new()
    }
}
