use serde::{Deserialize, Serialize};

use crate::session::RoomId;

/// Application-level messages carried on the media session's data channel.
///
/// Wire format: `{"type":"OWNER_EXIT","roomId":42}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomSignal {
    OwnerExit {
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },
}

impl RoomSignal {
    /// Decode a data-channel payload. Anything that is not a well-formed
    /// signal yields `None`.
    pub fn decode(payload: &[u8]) -> Option<Self> {
        match serde_json::from_slice(payload) {
            Ok(signal) => Some(signal),
            Err(e) => {
                tracing::debug!("ignoring undecodable data packet ({} bytes): {e}", payload.len());
                None
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        // Only string keys and integers: serialization cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn room_id(&self) -> RoomId {
        match self {
            RoomSignal::OwnerExit { room_id } => *room_id,
        }
    }
}
