//! LiveKit binding for studyroom-core.
//!
//! Translates room events into roster updates and hands data-channel
//! packets to the owner-exit coordinator.

pub mod bridge;
pub mod session;

pub use bridge::RoomBridge;
pub use session::LiveKitSession;
