use tracing::{debug, info, warn};

use crate::api::Event;
use crate::buffer::{BoundaryWatch, BufferPool, BufferSlot, MediaDecoder, WatchOwner, WatchToken};
use crate::error::{PlayerError, Result};
use crate::segment::Segment;

/// Slot used for previews regardless of scheduler state.
pub const PREVIEW_SLOT: BufferSlot = BufferSlot::A;

/// Plays one range on [`PREVIEW_SLOT`] without sequencing.
///
/// Taking over the buffers always starts with `stop_all`, which detaches any
/// sequence watch; the scheduler notices the missing watch on its own.
#[derive(Debug, Default)]
pub struct PreviewController {
    active: Option<ActivePreview>,
}

#[derive(Debug, Clone, Copy)]
struct ActivePreview {
    range: Segment,
    watch: WatchToken,
}

impl PreviewController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Starts playing `range` and pauses when its end is reached.
    ///
    /// # Example
    /// ```
    /// use media_sim::SimDecoder;
    /// use seam_engine::{BufferPool, Event, PreviewController, Segment};
    ///
    /// let mut pool = BufferPool::new(
    ///     SimDecoder::new("a", 60.0),
    ///     SimDecoder::new("b", 60.0),
    ///     0.5,
    /// );
    /// let mut preview = PreviewController::new();
    /// let events = preview
    ///     .preview_segment(&mut pool, Segment::new(3.0, 4.5))
    ///     .expect("preview should start");
    /// assert_eq!(events, vec![Event::PreviewStarted { start: 3.0, end: 4.5 }]);
    /// ```
    pub fn preview_segment<D>(
        &mut self,
        pool: &mut BufferPool<D>,
        range: Segment,
    ) -> Result<Vec<Event>>
    where
        D: MediaDecoder,
    {
        pool.stop_all();
        self.active = None;

        if !range.is_playable() {
            debug!(start = range.start, end = range.end, "preview range is empty");
            return Ok(vec![Event::PreviewFinished]);
        }

        let mut events = vec![Event::PreviewStarted {
            start: range.start,
            end: range.end,
        }];
        match pool.buffer_mut(PREVIEW_SLOT).play_from(range.start) {
            Ok(_) => {}
            Err(PlayerError::PlaybackRejected { slot, reason }) => {
                warn!(%slot, %reason, "preview start rejected");
                events.push(Event::PlaybackRejected { slot, reason });
            }
            Err(error) => {
                pool.stop_all();
                return Err(error);
            }
        }

        let watch = pool.attach_watch(PREVIEW_SLOT, range.end, WatchOwner::Preview);
        info!(start = range.start, end = range.end, "preview started");
        self.active = Some(ActivePreview { range, watch });
        Ok(events)
    }

    /// Pauses the preview buffer once its range end is reached.
    pub fn on_boundary<D>(&mut self, pool: &mut BufferPool<D>, watch: BoundaryWatch) -> Vec<Event>
    where
        D: MediaDecoder,
    {
        let Some(active) = self.active.filter(|active| active.watch == watch.token) else {
            warn!(slot = %watch.slot, end = watch.end, "ignoring stale preview watch");
            return Vec::new();
        };

        let buffer = pool.buffer_mut(watch.slot);
        buffer.pause();
        buffer.clear_watch();
        self.active = None;
        debug!(
            start = active.range.start,
            end = active.range.end,
            "preview finished"
        );
        vec![Event::PreviewFinished]
    }

    /// Forgets the preview when its watch is gone.
    pub fn reconcile<D>(&mut self, pool: &BufferPool<D>)
    where
        D: MediaDecoder,
    {
        if self
            .active
            .is_some_and(|active| !pool.holds_watch(active.watch))
        {
            self.active = None;
        }
    }
}
