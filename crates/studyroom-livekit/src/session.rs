use std::sync::Arc;

use livekit::DataPacket;
use livekit::prelude::Room;
use studyroom_core::{MediaSession, RoomId, RoomSignal, StudyRoomError};

/// A connected LiveKit room seen through the core's [`MediaSession`] seam.
pub struct LiveKitSession {
    room: Arc<Room>,
}

impl LiveKitSession {
    pub fn new(room: Arc<Room>) -> Self {
        Self { room }
    }

    pub fn room(&self) -> &Arc<Room> {
        &self.room
    }

    /// Tell every other participant that the owner is ending the session.
    pub async fn broadcast_owner_exit(&self, room_id: RoomId) -> Result<(), StudyRoomError> {
        let packet = DataPacket {
            payload: RoomSignal::OwnerExit { room_id }.encode(),
            reliable: true,
            ..Default::default()
        };
        self.room
            .local_participant()
            .publish_data(packet)
            .await
            .map_err(|e| StudyRoomError::Room(format!("publish owner exit: {e}")))?;
        tracing::info!("owner exit broadcast for room {room_id}");
        Ok(())
    }
}

impl MediaSession for LiveKitSession {
    async fn release_local_media(&self) -> Result<(), StudyRoomError> {
        let local = self.room.local_participant();
        let mut first_error = None;
        for (sid, publication) in local.track_publications() {
            publication.mute();
            if let Err(e) = local.unpublish_track(&sid).await {
                tracing::warn!("unpublish {sid}: {e}");
                first_error.get_or_insert(StudyRoomError::Room(format!("unpublish {sid}: {e}")));
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                tracing::info!("local media released");
                Ok(())
            }
        }
    }

    async fn disconnect(&self) -> Result<(), StudyRoomError> {
        self.room
            .close()
            .await
            .map_err(|e| StudyRoomError::Connection(e.to_string()))
    }
}
