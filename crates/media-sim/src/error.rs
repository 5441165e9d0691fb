use thiserror::Error;

use crate::decoder::AutoplayPolicy;

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, SimError>;

/// Error type for simulated decoder operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("media source revoked: {name}")]
    MediaRevoked { name: String },
    #[error("playback blocked by autoplay policy {policy:?} (muted: {muted})")]
    AutoplayBlocked { policy: AutoplayPolicy, muted: bool },
    #[error("invalid seek target: {0}")]
    InvalidSeek(f64),
}
