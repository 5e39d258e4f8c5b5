use meshcall_core::ParticipantId;
use thiserror::Error;

/// Failures of the pub/sub signaling channel.
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("signaling channel unavailable for '{topic}': {reason}")]
    ChannelUnavailable { topic: String, reason: String },

    #[error("signaling transport error: {0}")]
    Transport(String),

    #[error("failed to encode signal: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("signaling channel already left")]
    Closed,
}

/// Failures of a single peer link operation.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("webrtc error: {0}")]
    WebRtc(#[from] webrtc::Error),

    #[error("invalid signaling state: {0}")]
    InvalidState(String),

    #[error("peer link closed")]
    Closed,

    #[error("failed to encode candidate: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A failed negotiation step, on either side of the peer manager.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Signaling(#[from] SignalingError),
}

/// Session-scoped errors, the only ones surfaced to the caller.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection error: {0}")]
    ChannelUnavailable(#[from] SignalingError),

    #[error("signaling channel for '{topic}' was closed by the transport")]
    ChannelLost { topic: String },

    #[error("not joined to a room")]
    NotJoined,

    #[error("room session task stopped")]
    Stopped,
}

/// Peer-scoped faults. Reported to the observer, never returned: a fault with
/// one participant does not affect any other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerFault {
    /// A remote candidate could not be added for an offer that was not ignored.
    IceAddFailure {
        participant: ParticipantId,
        reason: String,
    },
    /// The link reached the terminal failed state and was torn down.
    ConnectionFailed { participant: ParticipantId },
    /// ICE failed without the connection failing; an ICE restart was started.
    IceTransientFailure { participant: ParticipantId },
}
