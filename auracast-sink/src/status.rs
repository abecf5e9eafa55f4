//! Status indication
//!
//! On target hardware these states drive LEDs; the default indicator just
//! logs transitions.

use tracing::info;

/// Sink status as surfaced to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    Scanning,
    Synced,
    Streaming,
    /// The controller reported a degraded ISO channel map
    ChannelMapDegraded,
}

pub trait StatusIndicator: Send + Sync {
    fn status_changed(&self, status: Status);
}

/// Default indicator: log the transition
#[derive(Debug, Default)]
pub struct LogIndicator;

impl StatusIndicator for LogIndicator {
    fn status_changed(&self, status: Status) {
        info!("Status: {:?}", status);
    }
}
