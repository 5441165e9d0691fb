use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::api::Event;
use crate::buffer::{BoundaryWatch, BufferPool, BufferSlot, MediaDecoder, WatchOwner, WatchToken};
use crate::config::PlayerConfig;
use crate::error::{PlayerError, Result};
use crate::segment::{Segment, SegmentList};

/// Observable state of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    /// `index` addresses the snapshot taken by the last `play`.
    PlayingSegment { index: usize, active: BufferSlot },
    Finished,
}

/// Dual-buffer segment sequencer.
///
/// The scheduler owns no buffers; every operation borrows the pool. While a
/// sequence runs, exactly one boundary watch (the scheduler's) is attached to
/// the active buffer and the idle buffer is already positioned at the start
/// of the following segment, so a swap never waits on a seek.
#[derive(Debug)]
pub struct Scheduler {
    state: Option<SequenceState>,
    finished: bool,
    start_timeout: Duration,
    max_start_retries: u32,
    mute_on_start_retry: bool,
}

#[derive(Debug, Clone)]
struct SequenceState {
    segments: SegmentList,
    /// Indices of playable segments, in list order.
    order: Vec<usize>,
    position: usize,
    active: BufferSlot,
    watch: WatchToken,
    guard: StartGuard,
}

impl SequenceState {
    fn segment_at(&self, position: usize) -> Option<Segment> {
        self.order
            .get(position)
            .and_then(|&index| self.segments.get(index))
    }

    fn current_index(&self) -> usize {
        self.order[self.position]
    }
}

/// Tracks whether the active buffer's playhead is still moving.
#[derive(Debug, Clone, Copy)]
struct StartGuard {
    requested_at: Instant,
    last_advance_at: Instant,
    last_time: f64,
    attempts: u32,
    progressed: bool,
    rejected: bool,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(&PlayerConfig::default())
    }
}

impl Scheduler {
    pub fn new(config: &PlayerConfig) -> Self {
        Self {
            state: None,
            finished: false,
            start_timeout: config.start_timeout(),
            max_start_retries: config.max_start_retries,
            mute_on_start_retry: config.mute_on_start_retry,
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        match &self.state {
            Some(state) => SchedulerPhase::PlayingSegment {
                index: state.current_index(),
                active: state.active,
            },
            None if self.finished => SchedulerPhase::Finished,
            None => SchedulerPhase::Idle,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_some()
    }

    /// Starts playing `segments` from the first playable entry.
    ///
    /// Any sequence in flight is cancelled first. The list is copied, so later
    /// edits to the caller's list do not affect this run.
    pub fn play<D>(
        &mut self,
        pool: &mut BufferPool<D>,
        segments: &SegmentList,
        now: Instant,
    ) -> Result<Vec<Event>>
    where
        D: MediaDecoder,
    {
        pool.stop_all();
        self.state = None;
        self.finished = false;

        let order: Vec<usize> = segments
            .iter()
            .enumerate()
            .filter(|(_, segment)| segment.is_playable())
            .map(|(index, _)| index)
            .collect();
        let skipped = segments.len() - order.len();
        if skipped > 0 {
            warn!(skipped, "skipping zero-length or inverted segments");
        }

        let Some(&first_index) = order.first() else {
            info!(segment_count = segments.len(), "nothing to play");
            self.finished = true;
            return Ok(vec![Event::SequenceFinished { segments_played: 0 }]);
        };

        let mut state = SequenceState {
            segments: segments.clone(),
            order,
            position: 0,
            active: BufferSlot::A,
            watch: WatchToken::default(),
            guard: StartGuard::new(now, 0.0),
        };
        let first = state.segment_at(0).unwrap_or_default();

        if let Err(error) = pool.buffer_mut(BufferSlot::A).seek(first.start) {
            return Err(self.abort(pool, error));
        }
        if let Some(second) = state.segment_at(1) {
            if let Err(error) = pool.buffer_mut(BufferSlot::B).seek(second.start) {
                return Err(self.abort(pool, error));
            }
        }

        info!(
            segment_count = state.order.len(),
            first_index,
            start = first.start,
            end = first.end,
            "sequence started"
        );
        let mut events = vec![Event::SegmentStarted {
            index: first_index,
            slot: BufferSlot::A,
            start: first.start,
            end: first.end,
        }];
        match start_segment(pool, BufferSlot::A, first, now, &mut events) {
            Ok((watch, guard)) => {
                state.watch = watch;
                state.guard = guard;
            }
            Err(error) => return Err(self.abort(pool, error)),
        }

        self.state = Some(state);
        Ok(events)
    }

    /// Stops playback and detaches the pending watch. Safe in every phase.
    pub fn stop<D>(&mut self, pool: &mut BufferPool<D>) -> Vec<Event>
    where
        D: MediaDecoder,
    {
        pool.stop_all();
        match self.state.take() {
            Some(state) => {
                info!(index = state.current_index(), "sequence stopped");
                vec![Event::Stopped]
            }
            None => Vec::new(),
        }
    }

    /// Handles a boundary watch reached on the active buffer.
    ///
    /// Watches from an earlier run or from a preview are ignored.
    pub fn on_boundary<D>(
        &mut self,
        pool: &mut BufferPool<D>,
        watch: BoundaryWatch,
        now: Instant,
    ) -> Result<Vec<Event>>
    where
        D: MediaDecoder,
    {
        let current = self.state.as_ref().map(|state| state.watch);
        if watch.owner != WatchOwner::Sequence || current != Some(watch.token) {
            warn!(slot = %watch.slot, end = watch.end, "ignoring stale boundary watch");
            return Ok(Vec::new());
        }
        self.advance(pool, now)
    }

    /// Records a time advance for progress tracking.
    pub fn on_time_advance(&mut self, slot: BufferSlot, time: f64, now: Instant) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        let guard = &mut state.guard;
        if state.active != slot || time <= guard.last_time {
            return;
        }
        if !guard.progressed {
            trace!(%slot, time, "start confirmed");
            guard.progressed = true;
            guard.rejected = false;
        }
        guard.last_time = time;
        guard.last_advance_at = now;
    }

    /// Records an asynchronous start rejection reported by the platform.
    pub fn on_play_rejected(&mut self, slot: BufferSlot, reason: String) -> Vec<Event> {
        warn!(%slot, %reason, "playback start rejected");
        if let Some(state) = self.state.as_mut() {
            if state.active == slot {
                state.guard.rejected = true;
                state.guard.progressed = false;
            }
        }
        vec![Event::PlaybackRejected { slot, reason }]
    }

    /// Runs the stall guard.
    ///
    /// A start that was rejected, or that showed no progress within the start
    /// timeout, is retried up to the configured count; after that the sequence
    /// is aborted with [`PlayerError::PlaybackStalled`]. An active buffer that
    /// went quiet for the start timeout is checked for lost media (abort with
    /// [`PlayerError::MediaUnavailable`]) and for end of media (treated as its
    /// boundary).
    pub fn tick<D>(&mut self, pool: &mut BufferPool<D>, now: Instant) -> Result<Vec<Event>>
    where
        D: MediaDecoder,
    {
        let Some((slot, guard)) = self.state.as_ref().map(|state| (state.active, state.guard)) else {
            return Ok(Vec::new());
        };
        let quiet_since = if guard.progressed {
            guard.last_advance_at
        } else {
            guard.requested_at
        };
        let overdue = now.saturating_duration_since(quiet_since) >= self.start_timeout;
        if overdue {
            if !pool.buffer(slot).is_available() {
                let reason = "playhead stopped and the media resource is gone".to_string();
                return Err(self.abort(pool, PlayerError::MediaUnavailable { slot, reason }));
            }
            if let Some(watch) = pool.end_of_media(slot) {
                return self.on_boundary(pool, watch, now);
            }
        }
        if guard.progressed || !(guard.rejected || overdue) {
            return Ok(Vec::new());
        }

        let Some(mut state) = self.state.take() else {
            return Ok(Vec::new());
        };
        let segment_index = state.current_index();
        if guard.attempts > self.max_start_retries {
            return Err(self.abort(
                pool,
                PlayerError::PlaybackStalled {
                    slot,
                    segment_index,
                    attempts: guard.attempts,
                },
            ));
        }

        let attempt = guard.attempts + 1;
        warn!(%slot, segment_index, attempt, rejected = guard.rejected, "retrying stalled start");
        let segment = state.segment_at(state.position).unwrap_or_default();
        let buffer = pool.buffer_mut(slot);
        if self.mute_on_start_retry {
            buffer.mute_for_autoplay();
        }

        let mut events = vec![Event::StartRetried { slot, attempt }];
        let rejected = match buffer.play_from(segment.start) {
            Ok(_) => false,
            Err(PlayerError::PlaybackRejected { slot, reason }) => {
                warn!(%slot, %reason, attempt, "retry rejected");
                events.push(Event::PlaybackRejected { slot, reason });
                true
            }
            Err(error) => return Err(self.abort(pool, error)),
        };
        state.guard = StartGuard {
            attempts: attempt,
            rejected,
            ..StartGuard::new(now, pool.buffer(slot).current_time())
        };
        self.state = Some(state);
        Ok(events)
    }

    /// Drops the sequence when its watch was removed by another driver.
    ///
    /// A preview or an external `stop_all` takes the buffers over without
    /// telling the scheduler; the missing watch is the signal.
    pub fn reconcile<D>(&mut self, pool: &BufferPool<D>)
    where
        D: MediaDecoder,
    {
        let preempted = self
            .state
            .as_ref()
            .is_some_and(|state| !pool.holds_watch(state.watch));
        if preempted {
            debug!("sequence preempted by another buffer driver");
            self.state = None;
        }
    }

    fn advance<D>(&mut self, pool: &mut BufferPool<D>, now: Instant) -> Result<Vec<Event>>
    where
        D: MediaDecoder,
    {
        let Some(mut state) = self.state.take() else {
            return Ok(Vec::new());
        };

        let outgoing = state.active;
        pool.buffer_mut(outgoing).pause();
        pool.buffer_mut(outgoing).clear_watch();

        let next = state.position + 1;
        let Some(segment) = state.segment_at(next) else {
            let segments_played = state.order.len();
            pool.stop_all();
            self.finished = true;
            info!(segments_played, "sequence finished");
            return Ok(vec![Event::SequenceFinished { segments_played }]);
        };

        let incoming = outgoing.other();
        let index = state.order[next];
        debug!(from = %outgoing, to = %incoming, index, "swap");
        let mut events = vec![Event::SegmentStarted {
            index,
            slot: incoming,
            start: segment.start,
            end: segment.end,
        }];
        let (watch, guard) = match start_segment(pool, incoming, segment, now, &mut events) {
            Ok(started) => started,
            Err(error) => return Err(self.abort(pool, error)),
        };

        if let Some(following) = state.segment_at(next + 1) {
            if let Err(error) = pool.buffer_mut(outgoing).seek(following.start) {
                return Err(self.abort(pool, error));
            }
        }

        state.position = next;
        state.active = incoming;
        state.watch = watch;
        state.guard = guard;
        self.state = Some(state);
        Ok(events)
    }

    fn abort<D>(&mut self, pool: &mut BufferPool<D>, error: PlayerError) -> PlayerError
    where
        D: MediaDecoder,
    {
        warn!(%error, "sequence aborted");
        pool.stop_all();
        self.state = None;
        self.finished = true;
        error
    }
}

impl StartGuard {
    fn new(requested_at: Instant, last_time: f64) -> Self {
        Self {
            requested_at,
            last_advance_at: requested_at,
            last_time,
            attempts: 1,
            progressed: false,
            rejected: false,
        }
    }
}

/// Starts `segment` on `slot` and attaches its boundary watch.
///
/// A rejected start is not fatal: the watch is attached anyway and the stall
/// guard takes over.
fn start_segment<D>(
    pool: &mut BufferPool<D>,
    slot: BufferSlot,
    segment: Segment,
    now: Instant,
    events: &mut Vec<Event>,
) -> Result<(WatchToken, StartGuard)>
where
    D: MediaDecoder,
{
    let mut rejected = false;
    match pool.buffer_mut(slot).play_from(segment.start) {
        Ok(_) => {}
        Err(PlayerError::PlaybackRejected { slot, reason }) => {
            warn!(%slot, %reason, "playback start rejected");
            events.push(Event::PlaybackRejected { slot, reason });
            rejected = true;
        }
        Err(error) => return Err(error),
    }

    let watch = pool.attach_watch(slot, segment.end, WatchOwner::Sequence);
    let guard = StartGuard {
        rejected,
        ..StartGuard::new(now, pool.buffer(slot).current_time())
    };
    Ok((watch, guard))
}
