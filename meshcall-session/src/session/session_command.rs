use crate::media::{LocalStream, RemoteStream};
use crate::peer::PeerInfo;
use meshcall_core::ParticipantId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Requests from the session handle to its room task.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    UpdateLocalStream {
        stream: LocalStream,
        done: oneshot::Sender<()>,
    },
    PeerCount {
        reply: oneshot::Sender<usize>,
    },
    RemoteStreams {
        reply: oneshot::Sender<HashMap<ParticipantId, Arc<RemoteStream>>>,
    },
    Peers {
        reply: oneshot::Sender<Vec<PeerInfo>>,
    },
    /// Tear everything down and stop the task.
    Leave { done: oneshot::Sender<()> },
}
