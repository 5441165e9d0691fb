use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::error::{Result, SimError};

/// Playback start policy applied by [`SimDecoder::play`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AutoplayPolicy {
    /// Every play request starts playback.
    #[default]
    Allow,
    /// Play requests are rejected unless the decoder is muted.
    RejectUnmuted,
    /// Every play request is rejected.
    RejectAll,
}

/// One operation applied to a simulated decoder, in call order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimOp {
    Seek(f64),
    Play,
    Pause,
    SetMuted(bool),
}

/// Identifier returned by [`SimDecoder::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(f64) + Send>;

#[derive(Debug)]
struct SimState {
    duration: f64,
    position: f64,
    playing: bool,
    muted: bool,
    revoked: bool,
    policy: AutoplayPolicy,
    ops: Vec<SimOp>,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Listener)>,
}

/// Simulated media decoder driven by an explicit clock.
///
/// Clones share the same underlying decoder, so a test or host can keep a
/// handle for driving the clock after handing another clone to a player.
///
/// # Example
/// ```
/// use media_sim::SimDecoder;
///
/// let decoder = SimDecoder::new("demo.mp4", 30.0);
/// decoder.seek(4.0).expect("seek");
/// decoder.play().expect("play");
/// assert_eq!(decoder.advance(0.25), Some(4.25));
/// ```
#[derive(Clone)]
pub struct SimDecoder {
    name: Arc<str>,
    state: Arc<Mutex<SimState>>,
    listeners: Arc<Mutex<Listeners>>,
}

impl Debug for SimDecoder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("SimDecoder")
            .field("name", &self.name)
            .field("position", &state.position)
            .field("playing", &state.playing)
            .field("muted", &state.muted)
            .field("revoked", &state.revoked)
            .finish()
    }
}

impl SimDecoder {
    /// Creates a paused decoder positioned at `0.0` over media of `duration` seconds.
    pub fn new(name: impl Into<Arc<str>>, duration: f64) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(SimState {
                duration: duration.max(0.0),
                position: 0.0,
                playing: false,
                muted: false,
                revoked: false,
                policy: AutoplayPolicy::Allow,
                ops: Vec::new(),
            })),
            listeners: Arc::new(Mutex::new(Listeners::default())),
        }
    }

    /// Returns the decoder with `policy` applied.
    pub fn with_policy(self, policy: AutoplayPolicy) -> Self {
        self.set_policy(policy);
        self
    }

    pub fn set_policy(&self, policy: AutoplayPolicy) {
        self.state().policy = policy;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration(&self) -> f64 {
        self.state().duration
    }

    pub fn position(&self) -> f64 {
        self.state().position
    }

    pub fn is_playing(&self) -> bool {
        self.state().playing
    }

    pub fn is_muted(&self) -> bool {
        self.state().muted
    }

    /// Returns every operation applied so far.
    pub fn ops(&self) -> Vec<SimOp> {
        self.state().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state().ops.clear();
    }

    /// Moves the playhead to `seconds`, clamped to the media duration.
    pub fn seek(&self, seconds: f64) -> Result<()> {
        if !seconds.is_finite() {
            return Err(SimError::InvalidSeek(seconds));
        }
        let mut state = self.state();
        if state.revoked {
            return Err(self.revoked_error());
        }
        state.position = seconds.clamp(0.0, state.duration);
        state.ops.push(SimOp::Seek(seconds));
        debug!(decoder = %self.name, position = state.position, "seek");
        Ok(())
    }

    /// Requests playback, applying the configured autoplay policy.
    pub fn play(&self) -> Result<()> {
        let mut state = self.state();
        if state.revoked {
            return Err(self.revoked_error());
        }
        state.ops.push(SimOp::Play);
        let blocked = match state.policy {
            AutoplayPolicy::Allow => false,
            AutoplayPolicy::RejectUnmuted => !state.muted,
            AutoplayPolicy::RejectAll => true,
        };
        if blocked {
            debug!(decoder = %self.name, policy = ?state.policy, "play blocked");
            return Err(SimError::AutoplayBlocked {
                policy: state.policy,
                muted: state.muted,
            });
        }
        state.playing = true;
        Ok(())
    }

    pub fn pause(&self) {
        let mut state = self.state();
        state.playing = false;
        state.ops.push(SimOp::Pause);
    }

    pub fn set_muted(&self, muted: bool) {
        let mut state = self.state();
        state.muted = muted;
        state.ops.push(SimOp::SetMuted(muted));
    }

    pub fn is_revoked(&self) -> bool {
        self.state().revoked
    }

    /// Marks the underlying media as gone; later seeks and plays fail.
    pub fn revoke(&self) {
        let mut state = self.state();
        state.revoked = true;
        state.playing = false;
    }

    /// Registers a listener notified with the new position after each advance.
    pub fn subscribe(&self, listener: impl FnMut(f64) + Send + 'static) -> ListenerId {
        let mut listeners = self.listeners();
        let id = ListenerId(listeners.next_id);
        listeners.next_id += 1;
        listeners.entries.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners().entries.retain(|(entry_id, _)| *entry_id != id);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners().entries.len()
    }

    /// Advances the clock by `dt` seconds.
    ///
    /// Returns the new position when the decoder was playing. Reaching the end
    /// of the media stops playback.
    pub fn advance(&self, dt: f64) -> Option<f64> {
        let position = {
            let mut state = self.state();
            if !state.playing || state.revoked || dt <= 0.0 {
                return None;
            }
            state.position = (state.position + dt).min(state.duration);
            if state.position >= state.duration {
                state.playing = false;
                debug!(decoder = %self.name, "reached end of media");
            }
            state.position
        };

        trace!(decoder = %self.name, position, "time advanced");
        for (_, listener) in self.listeners().entries.iter_mut() {
            listener(position);
        }
        Some(position)
    }

    fn revoked_error(&self) -> SimError {
        SimError::MediaRevoked {
            name: self.name.to_string(),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::{AutoplayPolicy, SimDecoder, SimOp};
    use crate::SimError;

    #[test]
    fn advance_is_ignored_while_paused() {
        let decoder = SimDecoder::new("demo.mp4", 10.0);

        assert_eq!(decoder.advance(1.0), None);
        assert_eq!(decoder.position(), 0.0);
    }

    #[test]
    fn advance_stops_at_end_of_media() {
        let decoder = SimDecoder::new("demo.mp4", 2.0);
        decoder.seek(1.5).expect("seek");
        decoder.play().expect("play");

        assert_eq!(decoder.advance(1.0), Some(2.0));
        assert!(!decoder.is_playing());
        assert_eq!(decoder.advance(1.0), None);
    }

    #[test]
    fn reject_unmuted_policy_allows_muted_playback() {
        let decoder = SimDecoder::new("demo.mp4", 10.0).with_policy(AutoplayPolicy::RejectUnmuted);

        assert!(matches!(
            decoder.play(),
            Err(SimError::AutoplayBlocked { muted: false, .. })
        ));
        decoder.set_muted(true);
        decoder.play().expect("muted play should start");
        assert!(decoder.is_playing());
    }

    #[test]
    fn revoked_decoder_rejects_seek_and_play() {
        let decoder = SimDecoder::new("demo.mp4", 10.0);
        decoder.revoke();

        assert!(matches!(decoder.seek(1.0), Err(SimError::MediaRevoked { .. })));
        assert!(matches!(decoder.play(), Err(SimError::MediaRevoked { .. })));
    }

    #[test]
    fn listeners_receive_positions_until_unsubscribed() {
        let decoder = SimDecoder::new("demo.mp4", 10.0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = decoder.subscribe(move |time| sink.lock().expect("lock seen").push(time));
        decoder.play().expect("play");

        decoder.advance(0.5);
        decoder.unsubscribe(id);
        decoder.advance(0.5);

        assert_eq!(*seen.lock().expect("lock seen"), vec![0.5]);
    }

    #[test]
    fn ops_record_call_order_and_seek_clamps_to_duration() {
        let decoder = SimDecoder::new("demo.mp4", 3.0);
        decoder.seek(5.0).expect("seek");
        decoder.play().expect("play");
        decoder.pause();

        assert_eq!(decoder.position(), 3.0);
        assert_eq!(decoder.ops(), vec![SimOp::Seek(5.0), SimOp::Play, SimOp::Pause]);
    }
}
