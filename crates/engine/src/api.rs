use std::time::Instant;

use tracing::{debug, warn};

use crate::buffer::{BoundaryWatch, BufferPool, BufferSlot, MediaDecoder, WatchOwner};
use crate::config::PlayerConfig;
use crate::error::{PlayerError, Result};
use crate::preview::{PREVIEW_SLOT, PreviewController};
use crate::scheduler::{Scheduler, SchedulerPhase};
use crate::segment::{Segment, SegmentList};

/// Commands accepted by the player.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Plays a snapshot of `segments` from the first playable entry.
    ///
    /// # Example
    /// ```
    /// use media_sim::SimDecoder;
    /// use seam_engine::{Command, Player, SegmentList};
    ///
    /// let mut player = Player::new(SimDecoder::new("a", 60.0), SimDecoder::new("b", 60.0));
    /// let segments = SegmentList::from_json("[[0,5],[5,12.5]]").expect("valid list");
    /// let events = player
    ///     .handle_command(Command::Play { segments })
    ///     .expect("play should start");
    /// assert_eq!(events.len(), 1);
    /// ```
    Play {
        segments: SegmentList,
    },
    Stop,
    Preview {
        range: Segment,
    },
    /// A buffer's decoder reported a new position.
    TimeAdvanced {
        slot: BufferSlot,
        time: f64,
    },
    /// The platform rejected a start after `play` had returned.
    PlaybackRejected {
        slot: BufferSlot,
        reason: String,
    },
    /// Runs the stall guard.
    Tick,
}

/// Events emitted by the player.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// `index` addresses the list passed to the `Play` command.
    SegmentStarted {
        index: usize,
        slot: BufferSlot,
        start: f64,
        end: f64,
    },
    SequenceFinished {
        segments_played: usize,
    },
    Stopped,
    PreviewStarted {
        start: f64,
        end: f64,
    },
    PreviewFinished,
    /// A start was refused; playback continues to be attempted.
    PlaybackRejected {
        slot: BufferSlot,
        reason: String,
    },
    StartRetried {
        slot: BufferSlot,
        attempt: u32,
    },
    Error(PlayerErrorEvent),
}

/// Classification of errors surfaced as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerErrorKind {
    IndexOutOfRange,
    InvalidSegmentList,
    PlaybackRejected,
    PlaybackStalled,
    MediaUnavailable,
    Other,
}

impl From<&PlayerError> for PlayerErrorKind {
    fn from(value: &PlayerError) -> Self {
        match value {
            PlayerError::IndexOutOfRange { .. } => Self::IndexOutOfRange,
            PlayerError::InvalidSegmentList { .. } => Self::InvalidSegmentList,
            PlayerError::PlaybackRejected { .. } => Self::PlaybackRejected,
            PlayerError::PlaybackStalled { .. } => Self::PlaybackStalled,
            PlayerError::MediaUnavailable { .. } => Self::MediaUnavailable,
            _ => Self::Other,
        }
    }
}

/// User-facing error payload emitted as an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerErrorEvent {
    pub kind: PlayerErrorKind,
    pub message: String,
}

impl PlayerErrorEvent {
    pub fn from_error(error: &PlayerError) -> Self {
        Self {
            kind: PlayerErrorKind::from(error),
            message: error.to_string(),
        }
    }
}

/// Owns the two playback buffers and arbitrates between sequence playback
/// and preview.
///
/// Every method runs to completion before the next one starts; hosts that
/// receive decoder notifications on other threads should go through
/// [`crate::bridge::spawn_player_bridge`].
#[derive(Debug)]
pub struct Player<D> {
    pool: BufferPool<D>,
    scheduler: Scheduler,
    preview: PreviewController,
}

impl<D> Player<D>
where
    D: MediaDecoder,
{
    /// Creates a player over two decoders of the same source with default config.
    pub fn new(a: D, b: D) -> Self {
        Self::with_config(a, b, &PlayerConfig::default())
    }

    pub fn with_config(a: D, b: D, config: &PlayerConfig) -> Self {
        Self {
            pool: BufferPool::new(a, b, config.seek_epsilon_seconds),
            scheduler: Scheduler::new(config),
            preview: PreviewController::new(),
        }
    }

    /// Applies one command and returns emitted events.
    pub fn handle_command(&mut self, command: Command) -> Result<Vec<Event>> {
        self.handle_command_at(command, Instant::now())
    }

    /// Applies one command as if received at `now`.
    pub fn handle_command_at(&mut self, command: Command, now: Instant) -> Result<Vec<Event>> {
        match command {
            Command::Play { segments } => self.play_at(&segments, now),
            Command::Stop => Ok(self.stop()),
            Command::Preview { range } => self.preview_segment(range),
            Command::TimeAdvanced { slot, time } => self.time_advanced_at(slot, time, now),
            Command::PlaybackRejected { slot, reason } => Ok(self.playback_rejected(slot, reason)),
            Command::Tick => self.tick_at(now),
        }
    }

    pub fn play(&mut self, segments: &SegmentList) -> Result<Vec<Event>> {
        self.play_at(segments, Instant::now())
    }

    pub fn play_at(&mut self, segments: &SegmentList, now: Instant) -> Result<Vec<Event>> {
        self.preview.reconcile(&self.pool);
        let mut events = Vec::new();
        if self.preview.is_active() {
            debug!("play supersedes preview");
            events.push(Event::PreviewFinished);
        }
        events.extend(self.scheduler.play(&mut self.pool, segments, now)?);
        self.preview.reconcile(&self.pool);
        Ok(events)
    }

    /// Stops sequence and preview playback. Safe to call in any state.
    pub fn stop(&mut self) -> Vec<Event> {
        self.scheduler.reconcile(&self.pool);
        self.preview.reconcile(&self.pool);
        let preview_active = self.preview.is_active();
        let mut events = self.scheduler.stop(&mut self.pool);
        self.preview.reconcile(&self.pool);
        if preview_active {
            events.push(Event::PreviewFinished);
        }
        events
    }

    pub fn preview_segment(&mut self, range: Segment) -> Result<Vec<Event>> {
        let events = self.preview.preview_segment(&mut self.pool, range);
        self.scheduler.reconcile(&self.pool);
        events
    }

    pub fn time_advanced(&mut self, slot: BufferSlot, time: f64) -> Result<Vec<Event>> {
        self.time_advanced_at(slot, time, Instant::now())
    }

    /// Routes a time advance to whichever driver owns the reached watch.
    ///
    /// A decoder that stopped at the end of its media counts as having
    /// reached the watch on that buffer.
    pub fn time_advanced_at(
        &mut self,
        slot: BufferSlot,
        time: f64,
        now: Instant,
    ) -> Result<Vec<Event>> {
        self.scheduler.reconcile(&self.pool);
        self.scheduler.on_time_advance(slot, time, now);
        let reached = self
            .pool
            .observe_time(slot, time)
            .or_else(|| self.pool.end_of_media(slot));
        match reached {
            Some(watch) => self.route_watch(watch, now),
            None => Ok(Vec::new()),
        }
    }

    fn route_watch(&mut self, watch: BoundaryWatch, now: Instant) -> Result<Vec<Event>> {
        match watch.owner {
            WatchOwner::Sequence => self.scheduler.on_boundary(&mut self.pool, watch, now),
            WatchOwner::Preview => Ok(self.preview.on_boundary(&mut self.pool, watch)),
        }
    }

    pub fn playback_rejected(&mut self, slot: BufferSlot, reason: String) -> Vec<Event> {
        self.scheduler.reconcile(&self.pool);
        if !self.scheduler.is_playing() {
            warn!(%slot, %reason, "playback start rejected outside a sequence");
            return vec![Event::PlaybackRejected { slot, reason }];
        }
        self.scheduler.on_play_rejected(slot, reason)
    }

    pub fn tick(&mut self) -> Result<Vec<Event>> {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> Result<Vec<Event>> {
        self.scheduler.reconcile(&self.pool);
        let mut events = self.scheduler.tick(&mut self.pool, now)?;
        self.preview.reconcile(&self.pool);
        if self.preview.is_active() {
            if let Some(watch) = self.pool.end_of_media(PREVIEW_SLOT) {
                events.extend(self.route_watch(watch, now)?);
            }
        }
        Ok(events)
    }

    pub fn phase(&mut self) -> SchedulerPhase {
        self.scheduler.reconcile(&self.pool);
        self.scheduler.phase()
    }

    pub fn is_previewing(&mut self) -> bool {
        self.preview.reconcile(&self.pool);
        self.preview.is_active()
    }

    pub fn buffers(&self) -> &BufferPool<D> {
        &self.pool
    }

    /// Hands the pool to the bridge worker for subscriptions.
    pub(crate) fn buffers_mut(&mut self) -> &mut BufferPool<D> {
        &mut self.pool
    }

    pub fn into_decoders(self) -> (D, D) {
        self.pool.into_decoders()
    }
}
