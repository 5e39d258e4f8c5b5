mod participant;
mod presence;
mod room;
mod signaling;

pub use participant::{ParticipantId, is_polite};
pub use presence::PresenceRecord;
pub use room::RoomId;
pub use signaling::{
    IceCandidate, IceServerConfig, SIGNAL_EVENT, SdpKind, SessionDescription, SignalKind,
    SignalMessage, SignalPayload,
};
