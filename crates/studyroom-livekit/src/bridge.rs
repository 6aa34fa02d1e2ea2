use std::collections::HashMap;
use std::sync::Arc;

use livekit::prelude::{RemoteParticipant, Room, RoomEvent, RoomOptions};
use livekit::track::TrackSource as LkTrackSource;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use studyroom_core::{
    ClientState, ConnectionState, EventEmitter, ExitListener, MediaSession, Participant,
    ParticipantPatch, ParticipantRole, RoomId, StudyRoomClient, StudyRoomError, StudyRoomEvent,
};

use crate::session::LiveKitSession;

/// Participant attribute holding the room role.
const ROLE_ATTRIBUTE: &str = "role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Device {
    Microphone,
    Camera,
}

fn device_for(source: LkTrackSource) -> Option<Device> {
    match source {
        LkTrackSource::Microphone => Some(Device::Microphone),
        LkTrackSource::Camera => Some(Device::Camera),
        _ => None,
    }
}

fn role_from_attributes(attributes: &HashMap<String, String>) -> ParticipantRole {
    attributes
        .get(ROLE_ATTRIBUTE)
        .map(|r| ParticipantRole::from_attribute(r))
        .unwrap_or_default()
}

fn display_name(name: &str, identity: &str) -> String {
    if name.trim().is_empty() { identity.to_string() } else { name.to_string() }
}

/// `(microphone, camera)` on-state from `(source, muted)` publication pairs.
/// A device is on when any of its publications is unmuted.
fn devices_enabled(publications: impl IntoIterator<Item = (LkTrackSource, bool)>) -> (bool, bool) {
    let mut mic = false;
    let mut cam = false;
    for (source, muted) in publications {
        match device_for(source) {
            Some(Device::Microphone) => mic |= !muted,
            Some(Device::Camera) => cam |= !muted,
            None => {}
        }
    }
    (mic, cam)
}

fn remote_to_participant(p: &RemoteParticipant) -> Participant {
    let (mic, cam) = devices_enabled(
        p.track_publications()
            .values()
            .map(|publication| (publication.source(), publication.is_muted())),
    );
    Participant {
        identity: p.sid().to_string(),
        display_name: display_name(&p.name(), &p.identity().to_string()),
        microphone_enabled: mic,
        camera_enabled: cam,
        role: role_from_attributes(&p.attributes()),
        is_local_user: false,
    }
}

fn local_to_participant(room: &Room) -> Participant {
    let local = room.local_participant();
    let (mic, cam) = devices_enabled(
        local
            .track_publications()
            .values()
            .map(|publication| (publication.source(), publication.is_muted())),
    );
    Participant {
        identity: local.sid().to_string(),
        display_name: display_name(&local.name(), &local.identity().to_string()),
        microphone_enabled: mic,
        camera_enabled: cam,
        role: role_from_attributes(&local.attributes()),
        is_local_user: true,
    }
}

/// Applies a device toggle to the roster. Sources other than mic/camera are ignored.
fn apply_device(state: &ClientState, identity: &str, source: LkTrackSource, enabled: bool) {
    match device_for(source) {
        Some(Device::Microphone) => {
            state.roster.set_mic_on(identity, enabled);
        }
        Some(Device::Camera) => {
            state.roster.set_camera_on(identity, enabled);
        }
        None => {}
    }
}

/// Binds one LiveKit room connection to the client core.
///
/// Keeps the roster in sync with room presence and routes data-channel
/// packets to the owner-exit coordinator. Dropping the bridge stops both.
pub struct RoomBridge {
    room_id: RoomId,
    session: Arc<LiveKitSession>,
    state: Arc<ClientState>,
    emitter: EventEmitter,
    exit_listener: Option<ExitListener>,
    event_task: JoinHandle<()>,
}

impl RoomBridge {
    /// Connect using the token stored for `room_id`.
    ///
    /// Fails with [`StudyRoomError::Auth`] when no token is stored; the caller
    /// should send the user through the pre-join flow instead.
    pub async fn connect(
        client: &StudyRoomClient,
        server_url: &str,
        room_id: RoomId,
    ) -> Result<Self, StudyRoomError> {
        let token = client.room_session().ensure_token(room_id)?;
        Self::connect_with_token(client, server_url, &token, room_id).await
    }

    pub async fn connect_with_token(
        client: &StudyRoomClient,
        server_url: &str,
        token: &str,
        room_id: RoomId,
    ) -> Result<Self, StudyRoomError> {
        let emitter = client.emitter();
        let state = client.state();
        emitter.emit(StudyRoomEvent::ConnectionStateChanged(ConnectionState::Connecting));

        let mut options = RoomOptions::default();
        options.auto_subscribe = true;

        let (room, events) = match Room::connect(server_url, token, options).await {
            Ok(connected) => connected,
            Err(e) => {
                emitter.emit(StudyRoomEvent::ConnectionStateChanged(ConnectionState::Disconnected));
                return Err(StudyRoomError::Connection(e.to_string()));
            }
        };
        let room = Arc::new(room);
        tracing::info!("connected to room {room_id}");

        // Fresh roster for this session: local user first, then whoever is already here.
        let mut seed = vec![local_to_participant(&room)];
        seed.extend(room.remote_participants().values().map(remote_to_participant));
        state.roster.set(seed);
        state.exit_intents.clear(room_id);

        let session = Arc::new(LiveKitSession::new(room));
        let (packets_tx, packets_rx) = mpsc::unbounded_channel();
        let exit_listener = client
            .exit_coordinator(room_id, session.clone())
            .listen(packets_rx);

        let event_task = tokio::spawn(Self::event_loop(events, state.clone(), emitter.clone(), packets_tx));

        emitter.emit(StudyRoomEvent::ConnectionStateChanged(ConnectionState::Connected));

        Ok(Self {
            room_id,
            session,
            state,
            emitter,
            exit_listener: Some(exit_listener),
            event_task,
        })
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn session(&self) -> Arc<LiveKitSession> {
        self.session.clone()
    }

    /// Leave the media session on purpose (the REST side is `RoomSessionGlue::leave`).
    pub async fn disconnect(mut self) {
        if let Some(listener) = self.exit_listener.take() {
            listener.close();
        }
        self.state.exit_intents.mark(self.room_id);
        if let Err(e) = self.session.release_local_media().await {
            tracing::warn!("releasing local media: {e}");
        }
        if let Err(e) = self.session.disconnect().await {
            tracing::warn!("error closing room: {e}");
        }
        self.state.roster.reset();
        self.emitter
            .emit(StudyRoomEvent::ConnectionStateChanged(ConnectionState::Disconnected));
    }

    async fn event_loop(
        mut events: mpsc::UnboundedReceiver<RoomEvent>,
        state: Arc<ClientState>,
        emitter: EventEmitter,
        packets: mpsc::UnboundedSender<Vec<u8>>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                RoomEvent::Reconnecting => {
                    emitter.emit(StudyRoomEvent::ConnectionStateChanged(ConnectionState::Reconnecting));
                }

                RoomEvent::Reconnected => {
                    emitter.emit(StudyRoomEvent::ConnectionStateChanged(ConnectionState::Connected));
                }

                RoomEvent::Disconnected { reason } => {
                    tracing::info!("room disconnected: {reason:?}");
                    state.roster.reset();
                    emitter.emit(StudyRoomEvent::ConnectionStateChanged(ConnectionState::Disconnected));
                    break;
                }

                RoomEvent::ParticipantConnected(participant) => {
                    state.roster.add(remote_to_participant(&participant));
                }

                RoomEvent::ParticipantDisconnected(participant) => {
                    state.roster.remove(&participant.sid().to_string());
                }

                RoomEvent::TrackPublished { publication, participant } => {
                    if !publication.is_muted() {
                        apply_device(&state, &participant.sid().to_string(), publication.source(), true);
                    }
                }

                RoomEvent::TrackUnpublished { publication, participant } => {
                    apply_device(&state, &participant.sid().to_string(), publication.source(), false);
                }

                RoomEvent::LocalTrackPublished { publication, participant, .. } => {
                    apply_device(&state, &participant.sid().to_string(), publication.source(), true);
                }

                RoomEvent::LocalTrackUnpublished { publication, participant } => {
                    apply_device(&state, &participant.sid().to_string(), publication.source(), false);
                }

                RoomEvent::TrackMuted { participant, publication } => {
                    apply_device(&state, &participant.sid().to_string(), publication.source(), false);
                }

                RoomEvent::TrackUnmuted { participant, publication } => {
                    apply_device(&state, &participant.sid().to_string(), publication.source(), true);
                }

                RoomEvent::ParticipantNameChanged { participant, name, .. } => {
                    let identity = participant.sid().to_string();
                    state.roster.set_nickname(&identity, display_name(&name, &participant.identity().to_string()));
                }

                RoomEvent::ParticipantAttributesChanged { participant, changed_attributes } => {
                    if changed_attributes.contains_key(ROLE_ATTRIBUTE) {
                        state.roster.update(&participant.sid().to_string(), ParticipantPatch {
                            role: Some(role_from_attributes(&changed_attributes)),
                            ..Default::default()
                        });
                    }
                }

                RoomEvent::DataReceived { payload, .. } => {
                    // The exit listener owns the receiver; once it stops, packets are moot.
                    let _ = packets.send(payload.to_vec());
                }

                _ => {
                    tracing::trace!("unhandled room event: {event:?}");
                }
            }
        }

        tracing::info!("room event loop ended");
    }
}

impl Drop for RoomBridge {
    fn drop(&mut self) {
        self.event_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_mic_and_camera_are_tracked() {
        assert_eq!(device_for(LkTrackSource::Microphone), Some(Device::Microphone));
        assert_eq!(device_for(LkTrackSource::Camera), Some(Device::Camera));
        assert_eq!(device_for(LkTrackSource::Screenshare), None);
        assert_eq!(device_for(LkTrackSource::Unknown), None);
    }

    #[test]
    fn unmuted_publications_turn_devices_on() {
        assert_eq!(devices_enabled([(LkTrackSource::Microphone, false)]), (true, false));
        assert_eq!(devices_enabled([(LkTrackSource::Camera, false)]), (false, true));
        assert_eq!(
            devices_enabled([(LkTrackSource::Microphone, false), (LkTrackSource::Camera, false)]),
            (true, true)
        );
    }

    #[test]
    fn muted_and_unrelated_publications_leave_devices_off() {
        assert_eq!(devices_enabled([(LkTrackSource::Camera, true)]), (false, false));
        assert_eq!(devices_enabled([(LkTrackSource::Screenshare, false)]), (false, false));
        assert_eq!(devices_enabled([(LkTrackSource::ScreenshareAudio, false)]), (false, false));
        assert_eq!(devices_enabled(Vec::new()), (false, false));
    }

    #[test]
    fn one_unmuted_publication_is_enough() {
        let publications = [
            (LkTrackSource::Microphone, true),
            (LkTrackSource::Microphone, false),
            (LkTrackSource::Camera, true),
            (LkTrackSource::Camera, true),
        ];
        assert_eq!(devices_enabled(publications), (true, false));
    }

    #[test]
    fn role_comes_from_role_attribute() {
        let attrs = HashMap::from([(ROLE_ATTRIBUTE.to_string(), "owner".to_string())]);
        assert_eq!(role_from_attributes(&attrs), ParticipantRole::Owner);

        let attrs = HashMap::from([("handRaisedAt".to_string(), "2026-01-01".to_string())]);
        assert_eq!(role_from_attributes(&attrs), ParticipantRole::Guest);
        assert_eq!(role_from_attributes(&HashMap::new()), ParticipantRole::Guest);
    }

    #[test]
    fn empty_name_falls_back_to_identity() {
        assert_eq!(display_name("", "user-17"), "user-17");
        assert_eq!(display_name("   ", "user-17"), "user-17");
        assert_eq!(display_name("Alice", "user-17"), "Alice");
    }

    #[test]
    fn device_toggles_update_the_roster() {
        let state = ClientState::new(EventEmitter::new());
        state.roster.add(Participant::new("PA_1", "Alice"));

        apply_device(&state, "PA_1", LkTrackSource::Microphone, true);
        apply_device(&state, "PA_1", LkTrackSource::Screenshare, true);
        let p = state.roster.participant("PA_1").unwrap();
        assert!(p.microphone_enabled);
        assert!(!p.camera_enabled);

        apply_device(&state, "PA_1", LkTrackSource::Microphone, false);
        apply_device(&state, "PA_1", LkTrackSource::Camera, true);
        let p = state.roster.participant("PA_1").unwrap();
        assert!(!p.microphone_enabled);
        assert!(p.camera_enabled);
    }

    #[test]
    fn device_toggle_for_unknown_participant_is_noop() {
        let state = ClientState::new(EventEmitter::new());
        apply_device(&state, "ghost", LkTrackSource::Camera, true);
        assert!(state.roster.is_empty());
    }
}
