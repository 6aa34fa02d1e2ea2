use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::events::EventEmitter;
use crate::participants::RosterStore;

/// Backend identifier of a study room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for RoomId {
    fn from(id: u64) -> Self {
        RoomId(id)
    }
}

/// Media-session access tokens issued by the backend, one per room.
///
/// Held in memory for the session only. A missing token means the user must
/// go through the pre-join flow before connecting.
#[derive(Debug, Default)]
pub struct TokenStore {
    tokens: Mutex<HashMap<RoomId, String>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_token(&self, room_id: RoomId, token: impl Into<String>) {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(room_id, token.into());
    }

    /// The stored token, or `None` if this room has none.
    pub fn token(&self, room_id: RoomId) -> Option<String> {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&room_id)
            .cloned()
    }

    pub fn has_token(&self, room_id: RoomId) -> bool {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&room_id)
    }

    pub fn clear_token(&self, room_id: RoomId) {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&room_id);
    }

    pub fn clear_all_tokens(&self) {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Rooms whose disconnect was requested by the user (or the owner ending
/// the session) rather than caused by the network.
#[derive(Debug, Default)]
pub struct ExitIntents {
    rooms: Mutex<HashSet<RoomId>>,
}

impl ExitIntents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, room_id: RoomId) {
        self.rooms.lock().unwrap_or_else(|e| e.into_inner()).insert(room_id);
    }

    pub fn is_intentional(&self, room_id: RoomId) -> bool {
        self.rooms.lock().unwrap_or_else(|e| e.into_inner()).contains(&room_id)
    }

    pub fn clear(&self, room_id: RoomId) {
        self.rooms.lock().unwrap_or_else(|e| e.into_inner()).remove(&room_id);
    }

    pub fn clear_all(&self) {
        self.rooms.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Client-side session state, owned by the client and shared as `Arc<ClientState>`.
pub struct ClientState {
    pub roster: RosterStore,
    pub tokens: TokenStore,
    pub exit_intents: ExitIntents,
}

impl ClientState {
    pub fn new(emitter: EventEmitter) -> Self {
        Self {
            roster: RosterStore::new(emitter),
            tokens: TokenStore::new(),
            exit_intents: ExitIntents::new(),
        }
    }

    /// Drop everything, e.g. on logout.
    pub fn reset(&self) {
        self.roster.reset();
        self.tokens.clear_all_tokens();
        self.exit_intents.clear_all();
    }
}
