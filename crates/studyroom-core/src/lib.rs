//! Study room client core.
//!
//! Session state and coordination for a study-room client: the participant
//! roster, per-room media tokens, the owner-exit teardown, REST glue for
//! rejoining rooms and focus time, and persisted device preferences.
//! Transport-agnostic; the LiveKit binding lives in `studyroom-livekit`.

pub mod api;
pub mod client;
pub mod config;
pub mod errors;
pub mod events;
pub mod exit;
pub mod focus;
pub mod participants;
pub mod rejoin;
pub mod session;
pub mod settings;
pub mod signals;

pub use api::StudyRoomApi;
pub use client::StudyRoomClient;
pub use config::ClientConfig;
pub use errors::StudyRoomError;
pub use events::{ConnectionState, EventEmitter, QueryKey, StudyRoomEvent, StudyRoomEventListener, Subscription};
pub use exit::{ExitCoordinator, ExitListener, ExitOutcome, ExitPhase, MediaSession};
pub use participants::{Participant, ParticipantPatch, ParticipantRole, ParticipantRoster, RosterStore};
pub use session::{ClientState, ExitIntents, RoomId, TokenStore};
pub use settings::{MediaSettings, MediaSettingsStore};
pub use signals::RoomSignal;
pub use tokio_util::sync::CancellationToken;

/// Initialize tracing/logging. Call once from the host before using the client.
pub fn init_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("studyroom_core=debug,studyroom_livekit=debug"));
        // Another subscriber may already be installed by the host.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .try_init();
    });
}
