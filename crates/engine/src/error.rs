use std::path::PathBuf;

use thiserror::Error;

use crate::buffer::BufferSlot;

/// Result type used by the engine crate.
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Errors produced by segment edits, playback commands, and configuration.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("segment index {index} is out of range for {len} segments")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("invalid segment list: {reason}")]
    InvalidSegmentList { reason: String },
    #[error("segment list serialization failed: {0}")]
    SegmentSerialization(#[source] serde_json::Error),
    #[error("playback rejected on buffer {slot}: {reason}")]
    PlaybackRejected { slot: BufferSlot, reason: String },
    #[error(
        "playback stalled on buffer {slot} at segment {segment_index} after {attempts} start attempts"
    )]
    PlaybackStalled {
        slot: BufferSlot,
        segment_index: usize,
        attempts: u32,
    },
    #[error("media unavailable on buffer {slot}: {reason}")]
    MediaUnavailable { slot: BufferSlot, reason: String },
    #[error("cannot seek buffer {slot} to {time}")]
    InvalidSeekTarget { slot: BufferSlot, time: f64 },
    #[error("storage error: {reason}")]
    Storage { reason: String },
    #[error("failed to read config file {}: {source}", path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },
    #[error("player bridge is closed")]
    BridgeClosed,
}

/// Failure reported by a [`crate::buffer::MediaDecoder`].
///
/// Decoders do not know which pool slot they occupy; the buffer wrapper
/// attaches it when converting into [`PlayerError`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecoderError {
    /// The platform refused to start playback (autoplay policy and similar).
    #[error("playback rejected: {0}")]
    Rejected(String),
    /// The underlying media resource is gone.
    #[error("media unavailable: {0}")]
    Unavailable(String),
    /// The seek target is not a finite position.
    #[error("invalid seek target {0}")]
    InvalidSeek(f64),
}

impl DecoderError {
    pub(crate) fn into_player_error(self, slot: BufferSlot) -> PlayerError {
        match self {
            Self::Rejected(reason) => PlayerError::PlaybackRejected { slot, reason },
            Self::Unavailable(reason) => PlayerError::MediaUnavailable { slot, reason },
            Self::InvalidSeek(time) => PlayerError::InvalidSeekTarget { slot, time },
        }
    }
}

impl From<media_sim::SimError> for DecoderError {
    fn from(value: media_sim::SimError) -> Self {
        match value {
            media_sim::SimError::AutoplayBlocked { .. } => Self::Rejected(value.to_string()),
            media_sim::SimError::MediaRevoked { .. } => Self::Unavailable(value.to_string()),
            media_sim::SimError::InvalidSeek(time) => Self::InvalidSeek(time),
        }
    }
}
