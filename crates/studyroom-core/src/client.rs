use std::sync::Arc;

use crate::api::StudyRoomApi;
use crate::config::ClientConfig;
use crate::errors::StudyRoomError;
use crate::events::{EventEmitter, StudyRoomEventListener, Subscription};
use crate::exit::{ExitCoordinator, MediaSession};
use crate::focus::FocusTimer;
use crate::rejoin::RoomSessionGlue;
use crate::session::{ClientState, RoomId};
use crate::settings::MediaSettingsStore;

/// Entry point for UI shells: owns the state container, the event emitter,
/// the REST client and the persisted media settings.
pub struct StudyRoomClient {
    config: ClientConfig,
    emitter: EventEmitter,
    state: Arc<ClientState>,
    api: StudyRoomApi,
    settings: MediaSettingsStore,
}

impl StudyRoomClient {
    pub fn new(config: ClientConfig) -> Result<Self, StudyRoomError> {
        let emitter = EventEmitter::new();
        let state = Arc::new(ClientState::new(emitter.clone()));
        let api = StudyRoomApi::new(&config)?;
        let settings = MediaSettingsStore::new(&config.data_dir, emitter.clone());
        tracing::info!("study room client ready, backend {}", config.api_base_url);
        Ok(Self {
            config,
            emitter,
            state,
            api,
            settings,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn emitter(&self) -> EventEmitter {
        self.emitter.clone()
    }

    pub fn state(&self) -> Arc<ClientState> {
        self.state.clone()
    }

    pub fn api(&self) -> &StudyRoomApi {
        &self.api
    }

    pub fn settings(&self) -> &MediaSettingsStore {
        &self.settings
    }

    /// Register a listener for the lifetime of the client.
    pub fn add_listener(&self, listener: Arc<dyn StudyRoomEventListener>) {
        self.emitter.add_listener(listener);
    }

    /// Register a listener until the returned handle is dropped.
    pub fn subscribe(&self, listener: Arc<dyn StudyRoomEventListener>) -> Subscription {
        self.emitter.subscribe(listener)
    }

    pub fn room_session(&self) -> RoomSessionGlue {
        RoomSessionGlue::new(self.api.clone(), self.state.clone())
    }

    pub fn focus_timer(&self, user_id: u64, room_id: Option<RoomId>) -> FocusTimer {
        FocusTimer::new(self.api.clone(), user_id, room_id)
    }

    /// Coordinator for the owner ending `room_id` while connected through `media`.
    pub fn exit_coordinator<M: MediaSession>(&self, room_id: RoomId, media: Arc<M>) -> Arc<ExitCoordinator<M>> {
        Arc::new(ExitCoordinator::new(room_id, media, self.state.clone(), self.emitter.clone()))
    }
}
