use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender, TrySendError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::api::{Command, Event, Player, PlayerErrorEvent};
use crate::buffer::{BufferSlot, MediaDecoder, Subscription};
use crate::config::PlayerConfig;
use crate::error::{PlayerError, Result};

const COMMAND_CHANNEL_CAPACITY: usize = 64;
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Receiver used by the host to read events emitted by the player thread.
pub type PlayerEventReceiver = mpsc::Receiver<Event>;

enum BridgeInput {
    Command(Command),
    Shutdown,
}

/// Sender used by the host to dispatch commands to the player thread.
///
/// Dropping the handle stops the worker and releases its decoder subscriptions.
#[derive(Debug)]
pub struct PlayerHandle {
    input_tx: SyncSender<BridgeInput>,
    closed: Arc<AtomicBool>,
}

impl PlayerHandle {
    /// Queues `command`, blocking while the command channel is full.
    pub fn send(&self, command: Command) -> Result<()> {
        self.input_tx
            .send(BridgeInput::Command(command))
            .map_err(|_| PlayerError::BridgeClosed)
    }
}

impl Drop for PlayerHandle {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
        // Wakes the worker early; a full channel is drained on the next loop.
        let _ = self.input_tx.try_send(BridgeInput::Shutdown);
    }
}

/// Moves `player` onto a worker thread and wires decoder time advances into it.
pub fn spawn_player_bridge<D>(
    player: Player<D>,
    config: &PlayerConfig,
) -> (PlayerHandle, PlayerEventReceiver)
where
    D: MediaDecoder + Send + 'static,
{
    let (input_tx, input_rx) = mpsc::sync_channel::<BridgeInput>(COMMAND_CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::sync_channel::<Event>(EVENT_CHANNEL_CAPACITY);
    let closed = Arc::new(AtomicBool::new(false));
    let tick_interval = config.tick_interval();

    let worker = Worker {
        player,
        input_rx,
        event_tx,
        closed: Arc::clone(&closed),
        tick_interval,
    };
    let listener_tx = input_tx.clone();
    thread::spawn(move || worker.run(listener_tx));

    (PlayerHandle { input_tx, closed }, event_rx)
}

struct Worker<D> {
    player: Player<D>,
    input_rx: mpsc::Receiver<BridgeInput>,
    event_tx: SyncSender<Event>,
    closed: Arc<AtomicBool>,
    tick_interval: Duration,
}

impl<D> Worker<D>
where
    D: MediaDecoder,
{
    fn run(mut self, listener_tx: SyncSender<BridgeInput>) {
        let subscriptions = self.subscribe_time_advances(&listener_tx);
        drop(listener_tx);
        info!("player bridge started");

        let mut next_tick = Instant::now() + self.tick_interval;
        loop {
            if self.closed.load(Ordering::Acquire) {
                break;
            }

            let wait = next_tick.saturating_duration_since(Instant::now());
            let command = match self.input_rx.recv_timeout(wait) {
                Ok(BridgeInput::Command(command)) => Some(command),
                Ok(BridgeInput::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => None,
            };
            if let Some(command) = command {
                if !self.dispatch(command) {
                    break;
                }
            }

            let now = Instant::now();
            if now >= next_tick {
                next_tick = now + self.tick_interval;
                if !self.dispatch(Command::Tick) {
                    break;
                }
            }
        }

        drop(subscriptions);
        info!("player bridge stopped");
    }

    fn subscribe_time_advances(&mut self, listener_tx: &SyncSender<BridgeInput>) -> Vec<Subscription> {
        BufferSlot::ALL
            .into_iter()
            .map(|slot| {
                let tx = listener_tx.clone();
                self.player
                    .buffers_mut()
                    .buffer_mut(slot)
                    .on_time_advance(Box::new(move |time| {
                        let command = Command::TimeAdvanced { slot, time };
                        if let Err(TrySendError::Full(_)) = tx.try_send(BridgeInput::Command(command)) {
                            trace!(%slot, time, "time sample dropped on full channel");
                        }
                    }))
            })
            .collect()
    }

    /// Returns false once the event receiver is gone.
    fn dispatch(&mut self, command: Command) -> bool {
        let events = match self.player.handle_command(command) {
            Ok(events) => events,
            Err(error) => {
                debug!(%error, "command failed");
                vec![Event::Error(PlayerErrorEvent::from_error(&error))]
            }
        };
        events.into_iter().all(|event| self.event_tx.send(event).is_ok())
    }
}
