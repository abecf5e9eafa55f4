//! Volume control shell
//!
//! Minimal line-oriented command interface on stdin, mapped onto the
//! hardware codec's volume operations.

use crate::codec::{HwCodec, RegisterBus};
use auracast_common::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "commands: volume up | volume down | volume set <0-128> | mute | unmute | help";

/// Read commands from stdin until it closes
pub async fn run<B: RegisterBus>(codec: Arc<HwCodec<B>>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        match handle_command(&codec, line.trim()) {
            Ok(Some(reply)) => println!("{}", reply),
            Ok(None) => {}
            Err(e) => println!("error: {}", e),
        }
    }

    Ok(())
}

/// Parse and execute one command line
fn handle_command<B: RegisterBus>(codec: &HwCodec<B>, line: &str) -> Result<Option<String>> {
    let mut words = line.split_whitespace();

    match (words.next(), words.next(), words.next()) {
        (None, ..) => Ok(None),
        (Some("help"), ..) => Ok(Some(HELP.to_string())),
        (Some("volume"), Some("up"), None) => {
            codec.volume_increase()?;
            Ok(None)
        }
        (Some("volume"), Some("down"), None) => {
            codec.volume_decrease()?;
            Ok(None)
        }
        (Some("volume"), Some("set"), Some(value)) => {
            let value: u8 = value
                .parse()
                .map_err(|_| auracast_common::Error::InvalidState(format!(
                    "not a volume value: {}",
                    value
                )))?;
            codec.volume_set(value)?;
            Ok(None)
        }
        (Some("mute"), None, ..) => {
            codec.volume_mute()?;
            Ok(None)
        }
        (Some("unmute"), None, ..) => {
            codec.volume_unmute()?;
            Ok(None)
        }
        _ => Ok(Some(HELP.to_string())),
    }
}
