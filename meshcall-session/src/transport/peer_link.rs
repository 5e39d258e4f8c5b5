use crate::error::LinkError;
use crate::media::LocalTrack;
use crate::transport::LinkEvents;
use async_trait::async_trait;
use meshcall_core::{IceCandidate, ParticipantId, SessionDescription};
use serde::Serialize;
use std::sync::Arc;

/// Mirror of the connection's own signaling sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IceState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

/// What `attach_track` did with a local track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackAttachment {
    /// A sender of the same kind existed; its track was swapped in place.
    Replaced,
    /// A new sender was created. The link will ask for renegotiation.
    Added,
}

/// One direct media connection to a remote participant.
#[async_trait]
pub trait PeerLink: Send + Sync {
    fn signaling_state(&self) -> SignalingState;

    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription, LinkError>;

    async fn create_answer(&self) -> Result<SessionDescription, LinkError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), LinkError>;

    /// Applying an offer while a local offer is pending rolls the local one back first.
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), LinkError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), LinkError>;

    /// Replace the sender's track of the same kind, else add a new sender.
    async fn attach_track(&self, track: &LocalTrack) -> Result<TrackAttachment, LinkError>;

    async fn close(&self) -> Result<(), LinkError>;
}

/// Creates links. Swapped for an in-memory factory in tests.
#[async_trait]
pub trait LinkFactory: Send + Sync + 'static {
    async fn connect(
        &self,
        local: &ParticipantId,
        remote: &ParticipantId,
        events: LinkEvents,
    ) -> Result<Arc<dyn PeerLink>, LinkError>;
}
