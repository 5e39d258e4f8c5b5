use crate::error::{PeerFault, SessionError};
use crate::media::RemoteStream;
use crate::transport::ConnectionState;
use async_trait::async_trait;
use meshcall_core::ParticipantId;
use std::sync::Arc;

/// Callbacks to the UI layer. Invoked from the room task; implementations
/// should return quickly.
#[async_trait]
pub trait SessionObserver: Send + Sync + 'static {
    /// First media from a peer, or a new stream object replacing the old one.
    async fn on_remote_stream(&self, participant: &ParticipantId, stream: Arc<RemoteStream>);

    /// Fired once per peer teardown.
    async fn on_peer_disconnect(&self, participant: &ParticipantId);

    async fn on_connection_state(&self, _participant: &ParticipantId, _state: ConnectionState) {}

    async fn on_peer_fault(&self, _fault: PeerFault) {}

    async fn on_error(&self, _error: &SessionError) {}
}
