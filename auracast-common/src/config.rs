//! Configuration loading
//!
//! Resolution priority:
//! 1. Command-line `--config <path>` (highest)
//! 2. `AURACAST_CONFIG` environment variable
//! 3. Platform config file (`~/.config/auracast/config.toml`, then
//!    `/etc/auracast/config.toml` on Linux)
//! 4. Compiled defaults (fallback)
//!
//! All fields are optional in the TOML file; missing fields take the
//! compiled defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "AURACAST_CONFIG";

/// Sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Per-stage handshake timeout in seconds (discovery, PA sync, BASE,
    /// syncable). The streaming-state wait is deliberately unbounded.
    pub stage_timeout_secs: u64,

    /// Ring buffer capacity in audio blocks
    pub ring_capacity_blocks: usize,

    /// Expected sampling frequency in Hz
    pub sample_rate_hz: u32,

    /// Expected codec frame duration in microseconds
    pub frame_duration_us: u32,

    /// Hardware output block period in microseconds
    pub block_period_us: u32,

    /// Maximum concurrent sub-streams the sink joins
    pub max_streams: u8,

    /// Frames buffered before the output path is armed after (re)sync
    pub startup_primer_frames: u32,

    /// Output device name (None = default device)
    pub output_device: Option<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            stage_timeout_secs: 10,
            ring_capacity_blocks: 80,
            sample_rate_hz: 16_000,
            frame_duration_us: 10_000,
            block_period_us: 1_000,
            max_streams: 4,
            startup_primer_frames: 10,
            output_device: None,
        }
    }
}

impl SinkConfig {
    /// Load configuration following the documented priority order.
    ///
    /// An explicitly named file (argument or environment) that fails to load
    /// is an error; an absent platform default file is not.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_path {
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::from_file(Path::new(&path));
        }

        if let Some(path) = default_config_file() {
            return Self::from_file(&path);
        }

        Ok(Self::default())
    }

    /// Parse configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Cannot parse {}: {}", path.display(), e)))
    }

    /// Per-stage timeout as a `Duration`
    pub fn stage_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.stage_timeout_secs)
    }
}

/// Locate the platform default config file, if one exists
fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("auracast").join("config.toml"));

    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/auracast/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}
