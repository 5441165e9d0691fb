//! Deterministic, clock-driven media decoder used for headless playback runs.

mod decoder;
mod error;

pub use decoder::{AutoplayPolicy, ListenerId, SimDecoder, SimOp};
pub use error::{Result, SimError};
