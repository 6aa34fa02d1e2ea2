use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::{RoomAccess, StudyRoomApi};
use crate::errors::StudyRoomError;
use crate::session::{ClientState, RoomId};

/// REST calls that change which room the user is in, plus the local
/// bookkeeping that goes with them.
#[derive(Clone)]
pub struct RoomSessionGlue {
    api: StudyRoomApi,
    state: Arc<ClientState>,
}

impl RoomSessionGlue {
    pub fn new(api: StudyRoomApi, state: Arc<ClientState>) -> Self {
        Self { api, state }
    }

    /// Re-acquire a media token for a room the user already belongs to.
    pub async fn rejoin(
        &self,
        room_id: RoomId,
        cancel: Option<&CancellationToken>,
    ) -> Result<RoomAccess, StudyRoomError> {
        let access = self.api.rejoin_room(room_id, cancel).await?;
        self.state.tokens.set_token(room_id, access.token.clone());
        self.state.exit_intents.clear(room_id);
        tracing::info!("rejoined room {room_id}");
        Ok(access)
    }

    /// Leave a room on purpose.
    ///
    /// The exit is flagged as intentional before the request goes out, so a
    /// disconnect racing the response is not mistaken for a network drop. If the
    /// backend refuses, the flag is withdrawn and the local state is kept.
    pub async fn leave(
        &self,
        room_id: RoomId,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), StudyRoomError> {
        self.state.exit_intents.mark(room_id);
        if let Err(e) = self.api.leave_room(room_id, cancel).await {
            self.state.exit_intents.clear(room_id);
            return Err(e);
        }
        self.state.tokens.clear_token(room_id);
        self.state.roster.reset();
        tracing::info!("left room {room_id}");
        Ok(())
    }

    /// Delete a room the user owns. Other participants learn about it via
    /// the owner-exit signal, which the caller broadcasts first.
    pub async fn delete(
        &self,
        room_id: RoomId,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), StudyRoomError> {
        self.state.exit_intents.mark(room_id);
        if let Err(e) = self.api.delete_room(room_id, cancel).await {
            self.state.exit_intents.clear(room_id);
            return Err(e);
        }
        self.state.tokens.clear_token(room_id);
        self.state.roster.reset();
        Ok(())
    }

    /// The token to connect with, or an error telling the caller to run the
    /// pre-join flow first.
    pub fn ensure_token(&self, room_id: RoomId) -> Result<String, StudyRoomError> {
        self.state
            .tokens
            .token(room_id)
            .ok_or_else(|| StudyRoomError::Auth(format!("no media token for room {room_id}, pre-join required")))
    }
}
