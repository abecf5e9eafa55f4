//! Radio stack events
//!
//! The radio stack delivers its callbacks on arbitrary internal threads.
//! They are converted into `RadioEvent` messages on a single-consumer queue
//! drained by the control context, so sync state transitions stay
//! effectively single-threaded. Per-stream audio payloads do NOT travel on
//! this queue; they go straight to the decode pipeline on the radio's own
//! dispatch path.

use crate::base::BaseDescriptor;

/// Opaque handle to a discovered broadcast sink session.
///
/// Owned exclusively by the active sync session; cleared on reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkHandle(pub u64);

/// Size of the ISO channel map report delivered from the network core
pub const CHANNEL_MAP_SIZE: usize = 5;

/// Events delivered from the radio stack to the control context
#[derive(Debug, Clone)]
pub enum RadioEvent {
    /// A broadcast source was found during scanning
    Discovered {
        /// Broadcast ID from the advertisement
        broadcast_id: u32,
    },

    /// Periodic advertising sync established for a sink
    PaSynced {
        /// Handle of the synced sink session
        sink: SinkHandle,
    },

    /// BASE descriptor received over the periodic advertisement
    BaseReceived(BaseDescriptor),

    /// The broadcast's ISO data is about to begin and can be joined
    Syncable {
        /// True when the source encrypts its streams (not supported)
        encrypted: bool,
    },

    /// One joined stream started delivering data
    StreamStarted {
        /// BIS index of the stream
        index: u8,
    },

    /// One joined stream stopped
    StreamStopped {
        /// BIS index of the stream
        index: u8,
    },

    /// Periodic advertising sync was lost
    SyncLost,

    /// ISO channel map report from the radio controller
    ChannelMap([u8; CHANNEL_MAP_SIZE]),
}
