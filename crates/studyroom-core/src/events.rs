use std::sync::{Arc, RwLock, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::participants::Participant;
use crate::session::RoomId;
use crate::settings::MediaSettings;

/// Events emitted by the core to UI listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum StudyRoomEvent {
    ConnectionStateChanged(ConnectionState),
    ParticipantJoined(Participant),
    ParticipantLeft(String), // participant identity
    ParticipantUpdated(Participant),
    RosterReset,
    /// A cached query result is stale and should be refetched.
    QueryInvalidated(QueryKey),
    OwnerEndedSession { room_id: RoomId },
    MediaSettingsChanged(MediaSettings),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Cached backend views that go stale when a room session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    RoomList,
    Profile,
    RoomDetail(RoomId),
}

/// Trait for receiving events from the core.
/// Implementations must be Send + Sync (called from tokio tasks).
pub trait StudyRoomEventListener: Send + Sync {
    fn on_event(&self, event: StudyRoomEvent);
}

type ListenerList = RwLock<Vec<(u64, Arc<dyn StudyRoomEventListener>)>>;

/// Dispatches events to registered listeners.
///
/// Listeners are snapshotted before dispatch, so a listener may subscribe or
/// unsubscribe from inside `on_event` without deadlocking.
#[derive(Clone)]
pub struct EventEmitter {
    listeners: Arc<ListenerList>,
    next_id: Arc<AtomicU64>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register a listener for the lifetime of the emitter.
    pub fn add_listener(&self, listener: Arc<dyn StudyRoomEventListener>) {
        self.register(listener);
    }

    /// Register a listener that stays registered until the returned handle is dropped.
    #[must_use = "dropping the subscription immediately unregisters the listener"]
    pub fn subscribe(&self, listener: Arc<dyn StudyRoomEventListener>) -> Subscription {
        let id = self.register(listener);
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn emit(&self, event: StudyRoomEvent) {
        let snapshot: Vec<Arc<dyn StudyRoomEventListener>> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in snapshot {
            listener.on_event(event.clone());
        }
    }

    fn register(&self, listener: Arc<dyn StudyRoomEventListener>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, listener));
        id
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped listener registration. Unregisters on drop.
pub struct Subscription {
    id: u64,
    listeners: Weak<ListenerList>,
}

impl Subscription {
    /// Unregister now instead of waiting for the drop.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|(id, _)| *id != self.id);
        }
    }
}
