//! Radio stack seam
//!
//! The broadcast radio is an external collaborator: commands go through the
//! `BroadcastRadio` trait, events come back as `RadioEvent` messages on the
//! control queue, and per-stream payloads are delivered straight to the
//! decode pipeline on the radio's own dispatch path.

pub mod sim;

use auracast_common::{Result, SinkHandle};

/// Commands the sink issues to the broadcast radio stack
pub trait BroadcastRadio: Send {
    /// Begin scanning for broadcast sources
    fn start_scan(&self) -> Result<()>;

    /// Stop an in-progress scan
    fn stop_scan(&self) -> Result<()>;

    /// Tear down a sink session. Idempotent: safe to call for a session
    /// that is already gone.
    fn delete_sink(&self, sink: SinkHandle) -> Result<()>;

    /// Join the sub-streams selected by `bis_mask`
    fn sync_bis(&self, sink: SinkHandle, bis_mask: u32) -> Result<()>;
}
