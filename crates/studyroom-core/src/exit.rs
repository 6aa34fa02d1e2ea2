use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::errors::StudyRoomError;
use crate::events::{EventEmitter, QueryKey, StudyRoomEvent};
use crate::session::{ClientState, RoomId};
use crate::signals::RoomSignal;

/// The live media session of the current room, as seen by the exit coordinator.
///
/// The LiveKit adapter implements this over a connected room; tests use doubles.
pub trait MediaSession: Send + Sync + 'static {
    /// Stop and unpublish local camera/microphone tracks so the devices are released.
    fn release_local_media(&self) -> impl Future<Output = Result<(), StudyRoomError>> + Send;

    /// Leave the media session.
    fn disconnect(&self) -> impl Future<Output = Result<(), StudyRoomError>> + Send;
}

const LISTENING: u8 = 0;
const TEARING_DOWN: u8 = 1;
const CLOSED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPhase {
    Listening,
    TearingDown,
    Closed,
}

impl ExitPhase {
    fn from_raw(raw: u8) -> Self {
        match raw {
            LISTENING => ExitPhase::Listening,
            TEARING_DOWN => ExitPhase::TearingDown,
            _ => ExitPhase::Closed,
        }
    }
}

/// What happened to one inbound data packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Not an owner-exit signal for this room.
    Ignored,
    /// The owner ended the session and local teardown ran to completion.
    TornDown,
    /// A teardown is already running; the packet was dropped.
    Busy,
    /// The coordinator no longer listens.
    Closed,
}

/// Reacts to the room owner ending the session.
///
/// On a matching `OWNER_EXIT` signal it runs the local teardown in a fixed order:
/// release local media, invalidate cached room/profile queries, mark the exit
/// as intentional, disconnect (clearing the roster and the room token), then
/// notify the UI. Only one teardown ever runs per coordinator.
pub struct ExitCoordinator<M: MediaSession> {
    room_id: RoomId,
    media: Arc<M>,
    state: Arc<ClientState>,
    emitter: EventEmitter,
    phase: Arc<AtomicU8>,
}

impl<M: MediaSession> ExitCoordinator<M> {
    pub fn new(room_id: RoomId, media: Arc<M>, state: Arc<ClientState>, emitter: EventEmitter) -> Self {
        Self {
            room_id,
            media,
            state,
            emitter,
            phase: Arc::new(AtomicU8::new(LISTENING)),
        }
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn phase(&self) -> ExitPhase {
        ExitPhase::from_raw(self.phase.load(Ordering::Acquire))
    }

    /// Handle one raw data-channel payload.
    pub async fn handle_packet(&self, payload: &[u8]) -> ExitOutcome {
        match RoomSignal::decode(payload) {
            Some(RoomSignal::OwnerExit { room_id }) if room_id == self.room_id => {}
            Some(RoomSignal::OwnerExit { room_id }) => {
                tracing::debug!("ignoring OWNER_EXIT for room {room_id} (current room {})", self.room_id);
                return ExitOutcome::Ignored;
            }
            None => return ExitOutcome::Ignored,
        }

        if let Err(current) = self.phase.compare_exchange(
            LISTENING,
            TEARING_DOWN,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return match ExitPhase::from_raw(current) {
                ExitPhase::TearingDown => {
                    tracing::debug!("OWNER_EXIT for room {} while tearing down, dropped", self.room_id);
                    ExitOutcome::Busy
                }
                _ => ExitOutcome::Closed,
            };
        }

        self.teardown().await;
        self.phase.store(CLOSED, Ordering::Release);
        ExitOutcome::TornDown
    }

    async fn teardown(&self) {
        let room_id = self.room_id;
        tracing::info!("room {room_id}: owner ended the session, tearing down");

        if let Err(e) = self.media.release_local_media().await {
            tracing::warn!("room {room_id}: releasing local media failed: {e}");
        }

        for key in [QueryKey::RoomList, QueryKey::Profile, QueryKey::RoomDetail(room_id)] {
            self.emitter.emit(StudyRoomEvent::QueryInvalidated(key));
        }

        self.state.exit_intents.mark(room_id);

        if let Err(e) = self.media.disconnect().await {
            tracing::warn!("room {room_id}: disconnect failed: {e}");
        }
        self.state.roster.reset();
        self.state.tokens.clear_token(room_id);

        self.emitter.emit(StudyRoomEvent::OwnerEndedSession { room_id });
        tracing::info!("room {room_id}: teardown complete");
    }

    /// Drain data packets from `packets` until the owner exits or the handle is dropped.
    pub fn listen(self: Arc<Self>, mut packets: mpsc::UnboundedReceiver<Vec<u8>>) -> ExitListener {
        let phase = self.phase.clone();
        let task = tokio::spawn(async move {
            while let Some(packet) = packets.recv().await {
                match self.handle_packet(&packet).await {
                    ExitOutcome::TornDown | ExitOutcome::Closed => break,
                    ExitOutcome::Ignored | ExitOutcome::Busy => {}
                }
            }
            tracing::debug!("room {}: exit listener stopped", self.room_id);
        });
        ExitListener { phase, task: Some(task) }
    }
}

/// Registration of an exit coordinator on a packet stream.
///
/// Dropping the handle stops listening. A teardown that already started is
/// left to run to completion.
pub struct ExitListener {
    phase: Arc<AtomicU8>,
    task: Option<JoinHandle<()>>,
}

impl ExitListener {
    pub fn close(self) {}

    /// Wait for the listener task to finish on its own (teardown or closed channel).
    pub async fn finished(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ExitListener {
    fn drop(&mut self) {
        let Some(task) = self.task.take() else { return };
        let stopped = self
            .phase
            .compare_exchange(LISTENING, CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if stopped {
            task.abort();
        }
    }
}
