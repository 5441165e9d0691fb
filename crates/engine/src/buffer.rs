use std::fmt::{Debug, Display, Formatter};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{DecoderError, PlayerError, Result};
use crate::time::{clamp_non_negative, within_seek_epsilon};

/// One of the two pooled playback buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferSlot {
    A,
    B,
}

impl BufferSlot {
    pub const ALL: [Self; 2] = [Self::A, Self::B];

    pub const fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }

    /// Returns the slot that is idle while `self` is active.
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

impl Display for BufferSlot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => f.write_str("A"),
            Self::B => f.write_str("B"),
        }
    }
}

/// Outcome of a play request the platform did not reject outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayStart {
    /// Playback is running.
    Started,
    /// Playback was requested; a later rejection may still arrive.
    Pending,
}

/// Callback receiving the decoder's position after each time advance.
pub type TimeListener = Box<dyn FnMut(f64) + Send>;

/// Handle for a time-advance subscription.
///
/// The listener is detached by [`Subscription::unsubscribe`] or on drop.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Decoder operations required by a playback buffer.
pub trait MediaDecoder {
    /// Current playhead position in source seconds.
    fn current_time(&self) -> f64;

    /// Moves the playhead. Seeking may be slow; callers avoid redundant seeks.
    fn seek(&mut self, seconds: f64) -> std::result::Result<(), DecoderError>;

    /// Requests playback from the current position.
    fn play(&mut self) -> std::result::Result<PlayStart, DecoderError>;

    /// Stops playback. Must be idempotent.
    fn pause(&mut self);

    fn set_muted(&mut self, muted: bool);

    /// Subscribes to time-advance notifications.
    fn on_time_advance(&mut self, listener: TimeListener) -> Subscription;

    /// False once the underlying media resource is gone.
    fn is_available(&self) -> bool {
        true
    }

    /// True when the playhead sits at the end of the media.
    fn has_ended(&self) -> bool {
        false
    }
}

impl MediaDecoder for media_sim::SimDecoder {
    fn current_time(&self) -> f64 {
        self.position()
    }

    fn seek(&mut self, seconds: f64) -> std::result::Result<(), DecoderError> {
        media_sim::SimDecoder::seek(self, seconds).map_err(DecoderError::from)
    }

    fn play(&mut self) -> std::result::Result<PlayStart, DecoderError> {
        media_sim::SimDecoder::play(self)?;
        Ok(PlayStart::Started)
    }

    fn pause(&mut self) {
        media_sim::SimDecoder::pause(self);
    }

    fn set_muted(&mut self, muted: bool) {
        media_sim::SimDecoder::set_muted(self, muted);
    }

    fn on_time_advance(&mut self, listener: TimeListener) -> Subscription {
        let id = self.subscribe(listener);
        let decoder = self.clone();
        Subscription::new(move || decoder.unsubscribe(id))
    }

    fn is_available(&self) -> bool {
        !self.is_revoked()
    }

    fn has_ended(&self) -> bool {
        self.position() >= self.duration()
    }
}

/// Who attached a boundary watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOwner {
    Sequence,
    Preview,
}

/// Identity of one attached boundary watch. Never reused within a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchToken(u64);

/// A boundary watch: fires the first time observed time reaches `end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryWatch {
    pub slot: BufferSlot,
    pub end: f64,
    pub owner: WatchOwner,
    pub token: WatchToken,
}

/// Thin wrapper around one decoder instance.
#[derive(Debug)]
pub struct PlaybackBuffer<D> {
    slot: BufferSlot,
    decoder: D,
    current_time: f64,
    playing: bool,
    muted_for_autoplay: bool,
    watch: Option<BoundaryWatch>,
    seek_epsilon: f64,
}

impl<D> PlaybackBuffer<D>
where
    D: MediaDecoder,
{
    fn new(slot: BufferSlot, decoder: D, seek_epsilon: f64) -> Self {
        let current_time = decoder.current_time();
        Self {
            slot,
            decoder,
            current_time,
            playing: false,
            muted_for_autoplay: false,
            watch: None,
            seek_epsilon,
        }
    }

    pub fn slot(&self) -> BufferSlot {
        self.slot
    }

    /// Last position seen through a seek or a time advance.
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// True once playback was requested and not paused since.
    ///
    /// A pending or silently failed start still reads as playing.
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_muted_for_autoplay(&self) -> bool {
        self.muted_for_autoplay
    }

    pub fn watch(&self) -> Option<BoundaryWatch> {
        self.watch
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// Moves to `time` (clamped to `>= 0`), skipping seeks within the epsilon.
    pub fn seek(&mut self, time: f64) -> Result<()> {
        let target = clamp_non_negative(time);
        if !target.is_finite() {
            return Err(PlayerError::InvalidSeekTarget {
                slot: self.slot,
                time,
            });
        }
        let current = self.decoder.current_time();
        if within_seek_epsilon(current, target, self.seek_epsilon) {
            trace!(slot = %self.slot, current, target, "seek skipped within epsilon");
            self.current_time = current;
            return Ok(());
        }

        self.decoder
            .seek(target)
            .map_err(|error| error.into_player_error(self.slot))?;
        debug!(slot = %self.slot, from = current, to = target, "seek");
        self.current_time = target;
        Ok(())
    }

    /// Seeks to `time`, then requests playback.
    ///
    /// A rejected start is returned as [`crate::PlayerError::PlaybackRejected`];
    /// a successful return does not guarantee time will advance.
    pub fn play_from(&mut self, time: f64) -> Result<PlayStart> {
        self.seek(time)?;
        match self.decoder.play() {
            Ok(start) => {
                self.playing = true;
                Ok(start)
            }
            Err(error) => {
                self.playing = false;
                Err(error.into_player_error(self.slot))
            }
        }
    }

    pub fn pause(&mut self) {
        self.decoder.pause();
        self.playing = false;
    }

    /// Mutes the decoder so platform autoplay policies allow a retry.
    pub fn mute_for_autoplay(&mut self) {
        if !self.muted_for_autoplay {
            self.decoder.set_muted(true);
            self.muted_for_autoplay = true;
        }
    }

    /// Undoes [`Self::mute_for_autoplay`].
    pub fn restore_audio(&mut self) {
        if self.muted_for_autoplay {
            self.decoder.set_muted(false);
            self.muted_for_autoplay = false;
        }
    }

    pub fn is_available(&self) -> bool {
        self.decoder.is_available()
    }

    pub fn has_ended(&self) -> bool {
        self.decoder.has_ended()
    }

    pub fn on_time_advance(&mut self, listener: TimeListener) -> Subscription {
        self.decoder.on_time_advance(listener)
    }

    /// Replaces any previously registered watch on this buffer.
    pub(crate) fn watch_boundary(&mut self, watch: BoundaryWatch) {
        self.watch = Some(watch);
    }

    pub(crate) fn clear_watch(&mut self) -> Option<BoundaryWatch> {
        self.watch.take()
    }

    fn observe_time(&mut self, time: f64) -> Option<BoundaryWatch> {
        self.current_time = time;
        let watch = self.watch?;
        if time >= watch.end {
            self.watch = None;
            return Some(watch);
        }
        None
    }
}

/// The two playback buffers shared by the scheduler and the preview controller.
///
/// At most one boundary watch exists across the pool at any time.
#[derive(Debug)]
pub struct BufferPool<D> {
    buffers: [PlaybackBuffer<D>; 2],
    next_token: u64,
}

impl<D> BufferPool<D>
where
    D: MediaDecoder,
{
    pub fn new(a: D, b: D, seek_epsilon: f64) -> Self {
        Self {
            buffers: [
                PlaybackBuffer::new(BufferSlot::A, a, seek_epsilon),
                PlaybackBuffer::new(BufferSlot::B, b, seek_epsilon),
            ],
            next_token: 1,
        }
    }

    pub fn buffer(&self, slot: BufferSlot) -> &PlaybackBuffer<D> {
        &self.buffers[slot.index()]
    }

    pub fn buffer_mut(&mut self, slot: BufferSlot) -> &mut PlaybackBuffer<D> {
        &mut self.buffers[slot.index()]
    }

    /// Pauses both buffers, clears both watches, and lifts autoplay muting.
    pub fn stop_all(&mut self) {
        for buffer in &mut self.buffers {
            buffer.pause();
            buffer.clear_watch();
            buffer.restore_audio();
        }
        debug!("all buffers stopped");
    }

    /// Attaches a watch on `slot` after removing every other watch in the pool.
    pub fn attach_watch(&mut self, slot: BufferSlot, end: f64, owner: WatchOwner) -> WatchToken {
        for buffer in &mut self.buffers {
            if let Some(stale) = buffer.clear_watch() {
                trace!(slot = %stale.slot, token = stale.token.0, "watch replaced");
            }
        }

        let token = WatchToken(self.next_token);
        self.next_token += 1;
        self.buffer_mut(slot).watch_boundary(BoundaryWatch {
            slot,
            end,
            owner,
            token,
        });
        debug!(%slot, end, ?owner, token = token.0, "boundary watch attached");
        token
    }

    /// Returns true while the watch identified by `token` is still attached.
    pub fn holds_watch(&self, token: WatchToken) -> bool {
        self.buffers
            .iter()
            .any(|buffer| buffer.watch.is_some_and(|watch| watch.token == token))
    }

    pub fn watch_count(&self) -> usize {
        self.buffers
            .iter()
            .filter(|buffer| buffer.watch.is_some())
            .count()
    }

    /// Records a time advance on `slot` and returns the watch it reached, if any.
    ///
    /// A reached watch is detached before it is returned, so it fires once.
    pub fn observe_time(&mut self, slot: BufferSlot, time: f64) -> Option<BoundaryWatch> {
        self.buffer_mut(slot).observe_time(time)
    }

    /// Detaches and returns the watch on `slot` when its decoder hit the end
    /// of the media before reaching the watched time.
    pub fn end_of_media(&mut self, slot: BufferSlot) -> Option<BoundaryWatch> {
        let buffer = self.buffer_mut(slot);
        if buffer.watch.is_none() || !buffer.has_ended() {
            return None;
        }
        let watch = buffer.clear_watch();
        debug!(%slot, time = buffer.current_time, "end of media before boundary");
        watch
    }

    pub fn into_decoders(self) -> (D, D) {
        let [a, b] = self.buffers;
        (a.decoder, b.decoder)
    }
}

#[cfg(test)]
mod tests {
    use super::{BufferPool, BufferSlot, WatchOwner};
    use crate::error::PlayerError;
    use crate::test_support::{Op, mock_pair};

    #[test]
    fn infinite_seek_target_is_rejected_before_the_decoder() {
        let (a, b, log) = mock_pair();
        let mut pool = BufferPool::new(a, b, 0.5);

        let result = pool.buffer_mut(BufferSlot::A).seek(f64::INFINITY);

        assert!(matches!(
            result,
            Err(PlayerError::InvalidSeekTarget {
                slot: BufferSlot::A,
                ..
            })
        ));
        assert!(log.ops().is_empty());
    }

    #[test]
    fn stop_all_lifts_autoplay_muting() {
        let (a, b, log) = mock_pair();
        let mut pool = BufferPool::new(a, b, 0.5);
        pool.buffer_mut(BufferSlot::B).mute_for_autoplay();
        log.clear();

        pool.stop_all();

        assert!(!pool.buffer(BufferSlot::B).is_muted_for_autoplay());
        assert_eq!(
            log.ops(),
            vec![("a", Op::Pause), ("b", Op::Pause), ("b", Op::SetMuted(false))]
        );
    }

    #[test]
    fn end_of_media_releases_the_watch_only_once_the_decoder_ended() {
        let (a, b, _log) = mock_pair();
        let mut pool = BufferPool::new(a.clone(), b, 0.5);
        let token = pool.attach_watch(BufferSlot::A, 12.0, WatchOwner::Sequence);

        assert_eq!(pool.end_of_media(BufferSlot::A), None);
        a.finish_media();
        let watch = pool
            .end_of_media(BufferSlot::A)
            .expect("ended decoder releases its watch");

        assert_eq!(watch.token, token);
        assert_eq!(pool.watch_count(), 0);
        assert_eq!(pool.end_of_media(BufferSlot::A), None);
    }

    #[test]
    fn seek_within_epsilon_skips_decoder_seek() {
        let (a, b, log) = mock_pair();
        let mut pool = BufferPool::new(a, b, 0.5);

        pool.buffer_mut(BufferSlot::A)
            .seek(0.3)
            .expect("seek should succeed");
        pool.buffer_mut(BufferSlot::A)
            .seek(2.0)
            .expect("seek should succeed");

        assert_eq!(log.ops(), vec![("a", Op::Seek(2.0))]);
        assert_eq!(pool.buffer(BufferSlot::A).current_time(), 2.0);
    }

    #[test]
    fn negative_seek_targets_clamp_to_zero() {
        let (a, b, log) = mock_pair();
        a.set_time(4.0);
        let mut pool = BufferPool::new(a, b, 0.5);

        pool.buffer_mut(BufferSlot::A)
            .seek(-3.0)
            .expect("seek should succeed");

        assert_eq!(log.ops(), vec![("a", Op::Seek(0.0))]);
    }

    #[test]
    fn rejected_play_is_reported_with_slot_and_leaves_buffer_paused() {
        let (a, b, _log) = mock_pair();
        b.reject_next_plays(1);
        let mut pool = BufferPool::new(a, b, 0.5);

        let result = pool.buffer_mut(BufferSlot::B).play_from(3.0);

        assert!(matches!(
            result,
            Err(PlayerError::PlaybackRejected {
                slot: BufferSlot::B,
                ..
            })
        ));
        assert!(!pool.buffer(BufferSlot::B).is_playing());
    }

    #[test]
    fn attaching_a_watch_replaces_watches_on_both_buffers() {
        let (a, b, _log) = mock_pair();
        let mut pool = BufferPool::new(a, b, 0.5);

        let first = pool.attach_watch(BufferSlot::A, 5.0, WatchOwner::Sequence);
        let second = pool.attach_watch(BufferSlot::B, 10.0, WatchOwner::Sequence);

        assert_eq!(pool.watch_count(), 1);
        assert!(!pool.holds_watch(first));
        assert!(pool.holds_watch(second));
    }

    #[test]
    fn watch_fires_once_when_time_passes_the_boundary() {
        let (a, b, _log) = mock_pair();
        let mut pool = BufferPool::new(a, b, 0.5);
        let token = pool.attach_watch(BufferSlot::A, 5.0, WatchOwner::Sequence);

        assert_eq!(pool.observe_time(BufferSlot::A, 4.96), None);
        assert_eq!(pool.observe_time(BufferSlot::B, 5.2), None);
        let fired = pool
            .observe_time(BufferSlot::A, 5.03)
            .expect("watch should fire past the boundary");
        assert_eq!(fired.token, token);
        assert_eq!(pool.observe_time(BufferSlot::A, 5.1), None);
        assert_eq!(pool.watch_count(), 0);
    }

    #[test]
    fn stop_all_pauses_both_buffers_and_clears_watches() {
        let (a, b, log) = mock_pair();
        let mut pool = BufferPool::new(a, b, 0.5);
        pool.buffer_mut(BufferSlot::A)
            .play_from(0.0)
            .expect("play should succeed");
        pool.attach_watch(BufferSlot::A, 5.0, WatchOwner::Sequence);
        log.clear();

        pool.stop_all();
        pool.stop_all();

        assert_eq!(pool.watch_count(), 0);
        assert!(!pool.buffer(BufferSlot::A).is_playing());
        assert!(!pool.buffer(BufferSlot::B).is_playing());
        assert_eq!(
            log.ops(),
            vec![
                ("a", Op::Pause),
                ("b", Op::Pause),
                ("a", Op::Pause),
                ("b", Op::Pause),
            ]
        );
    }

    #[test]
    fn mute_for_autoplay_is_applied_once() {
        let (a, b, log) = mock_pair();
        let mut pool = BufferPool::new(a, b, 0.5);

        pool.buffer_mut(BufferSlot::A).mute_for_autoplay();
        pool.buffer_mut(BufferSlot::A).mute_for_autoplay();

        assert!(pool.buffer(BufferSlot::A).is_muted_for_autoplay());
        assert_eq!(log.ops(), vec![("a", Op::SetMuted(true))]);
    }
}
