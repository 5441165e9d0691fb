use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PlayerError, Result};
use crate::segment::DEFAULT_SEGMENT_SECONDS;

/// Tunables for the buffers, the scheduler's stall guard, and the bridge worker.
///
/// Loaded from TOML; every key is optional.
///
/// # Example
/// ```
/// use seam_engine::PlayerConfig;
///
/// let config = PlayerConfig::from_toml_str("start_timeout_ms = 500").expect("valid config");
/// assert_eq!(config.start_timeout_ms, 500);
/// assert_eq!(config.seek_epsilon_seconds, 0.5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlayerConfig {
    /// Seeks closer than this to the current position are skipped.
    pub seek_epsilon_seconds: f64,
    /// Length of segments created by append.
    pub default_segment_seconds: f64,
    /// Time a requested start may take before the stall guard intervenes.
    pub start_timeout_ms: u64,
    /// Start retries before a sequence is aborted as stalled.
    pub max_start_retries: u32,
    /// Retry stalled starts with the buffer muted.
    pub mute_on_start_retry: bool,
    /// Cadence of stall-guard ticks issued by the bridge worker.
    pub tick_interval_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            seek_epsilon_seconds: 0.5,
            default_segment_seconds: DEFAULT_SEGMENT_SECONDS,
            start_timeout_ms: 2_000,
            max_start_retries: 1,
            mute_on_start_retry: true,
            tick_interval_ms: 100,
        }
    }
}

impl PlayerConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| PlayerError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&source)?;
        debug!(path = %path.display(), ?config, "player config loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.seek_epsilon_seconds.is_finite() || self.seek_epsilon_seconds < 0.0 {
            return Err(invalid("seek_epsilon_seconds must be finite and non-negative"));
        }
        if !self.default_segment_seconds.is_finite() || self.default_segment_seconds <= 0.0 {
            return Err(invalid("default_segment_seconds must be finite and positive"));
        }
        if self.start_timeout_ms == 0 {
            return Err(invalid("start_timeout_ms must be positive"));
        }
        if self.tick_interval_ms == 0 {
            return Err(invalid("tick_interval_ms must be positive"));
        }
        Ok(())
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

fn invalid(reason: &str) -> PlayerError {
    PlayerError::InvalidConfig {
        reason: reason.to_string(),
    }
}
