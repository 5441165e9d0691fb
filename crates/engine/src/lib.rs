//! Gapless segment playback over two pooled media decoders.

pub mod api;
pub mod bridge;
pub mod buffer;
pub mod config;
pub mod error;
pub mod persistence;
pub mod preview;
pub mod scheduler;
pub mod segment;
pub mod time;

#[cfg(test)]
mod test_support;

pub use api::{Command, Event, Player, PlayerErrorEvent, PlayerErrorKind};
pub use bridge::{PlayerEventReceiver, PlayerHandle, spawn_player_bridge};
pub use buffer::{
    BoundaryWatch, BufferPool, BufferSlot, MediaDecoder, PlayStart, PlaybackBuffer, Subscription,
    TimeListener, WatchOwner, WatchToken,
};
pub use config::PlayerConfig;
pub use error::{DecoderError, PlayerError, Result};
pub use preview::{PREVIEW_SLOT, PreviewController};
pub use scheduler::{Scheduler, SchedulerPhase};
pub use segment::{DEFAULT_SEGMENT_SECONDS, Edge, Segment, SegmentList, SegmentStore};
