//! # Auracast Sink Library
//!
//! Broadcast audio sink: discovers a broadcast source, synchronizes to its
//! periodic advertising, joins the announced isochronous sub-streams, and
//! plays the decoded audio on a fixed hardware output clock.
//!
//! **Architecture:** a control context (sync state machine draining the
//! radio event queue), a radio-delivery context (decode pipeline feeding
//! the block ring), and a periodic hardware context (output scheduler in
//! the device callback), coupled only through the lock-free ring and the
//! streaming flag.

pub mod audio;
pub mod codec;
pub mod radio;
pub mod shell;
pub mod state;
pub mod status;
pub mod sync;

pub use auracast_common::{Error, Result};
pub use state::StreamingFlag;
pub use sync::{SyncState, SyncStateMachine};
