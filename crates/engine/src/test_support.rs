//! Recording decoder shared by the unit tests.

use std::sync::{Arc, Mutex};

use crate::buffer::{MediaDecoder, PlayStart, Subscription, TimeListener};
use crate::error::DecoderError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Op {
    Seek(f64),
    Play,
    Pause,
    SetMuted(bool),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<(&'static str, Op)>>>);

impl CallLog {
    pub(crate) fn ops(&self) -> Vec<(&'static str, Op)> {
        self.0.lock().expect("lock call log").clone()
    }

    pub(crate) fn clear(&self) {
        self.0.lock().expect("lock call log").clear();
    }

    fn push(&self, name: &'static str, op: Op) {
        self.0.lock().expect("lock call log").push((name, op));
    }
}

#[derive(Debug, Default)]
struct MockState {
    time: f64,
    rejections_left: u32,
    unavailable: bool,
    ended: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct MockDecoder {
    name: &'static str,
    state: Arc<Mutex<MockState>>,
    log: CallLog,
}

impl MockDecoder {
    pub(crate) fn new(name: &'static str, log: CallLog) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(MockState::default())),
            log,
        }
    }

    pub(crate) fn set_time(&self, time: f64) {
        self.state.lock().expect("lock mock state").time = time;
    }

    pub(crate) fn reject_next_plays(&self, count: u32) {
        self.state.lock().expect("lock mock state").rejections_left = count;
    }

    pub(crate) fn make_unavailable(&self) {
        self.state.lock().expect("lock mock state").unavailable = true;
    }

    /// Puts the playhead at the end of the media.
    pub(crate) fn finish_media(&self) {
        self.state.lock().expect("lock mock state").ended = true;
    }
}

impl MediaDecoder for MockDecoder {
    fn current_time(&self) -> f64 {
        self.state.lock().expect("lock mock state").time
    }

    fn seek(&mut self, seconds: f64) -> Result<(), DecoderError> {
        let mut state = self.state.lock().expect("lock mock state");
        if state.unavailable {
            return Err(DecoderError::Unavailable(format!("{} revoked", self.name)));
        }
        state.time = seconds;
        state.ended = false;
        self.log.push(self.name, Op::Seek(seconds));
        Ok(())
    }

    fn play(&mut self) -> Result<PlayStart, DecoderError> {
        let mut state = self.state.lock().expect("lock mock state");
        if state.unavailable {
            return Err(DecoderError::Unavailable(format!("{} revoked", self.name)));
        }
        self.log.push(self.name, Op::Play);
        if state.rejections_left > 0 {
            state.rejections_left -= 1;
            return Err(DecoderError::Rejected("autoplay blocked".to_string()));
        }
        Ok(PlayStart::Started)
    }

    fn pause(&mut self) {
        self.log.push(self.name, Op::Pause);
    }

    fn set_muted(&mut self, muted: bool) {
        self.log.push(self.name, Op::SetMuted(muted));
    }

    fn on_time_advance(&mut self, _listener: TimeListener) -> Subscription {
        Subscription::new(|| {})
    }

    fn is_available(&self) -> bool {
        !self.state.lock().expect("lock mock state").unavailable
    }

    fn has_ended(&self) -> bool {
        self.state.lock().expect("lock mock state").ended
    }
}

/// Two decoders named `"a"` and `"b"` writing into one shared call log.
pub(crate) fn mock_pair() -> (MockDecoder, MockDecoder, CallLog) {
    let log = CallLog::default();
    (
        MockDecoder::new("a", log.clone()),
        MockDecoder::new("b", log.clone()),
        log,
    )
}
