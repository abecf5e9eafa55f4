//! # Auracast Common Library
//!
//! Shared code for the broadcast audio sink:
//! - Error type used across crates
//! - Configuration loading
//! - Radio event types
//! - BASE descriptor data model

pub mod base;
pub mod config;
pub mod error;
pub mod events;

pub use base::{BaseDescriptor, CodecParams};
pub use config::SinkConfig;
pub use error::{Error, Result};
pub use events::{RadioEvent, SinkHandle};
