use crate::media::RemoteTrack;
use crate::transport::{ConnectionState, IceState};
use meshcall_core::{IceCandidate, ParticipantId};
use tokio::sync::mpsc;
use tracing::trace;

/// Events a link reports about itself.
#[derive(Debug)]
pub enum LinkEvent {
    NegotiationNeeded,
    LocalCandidate(IceCandidate),
    RemoteTrack(RemoteTrack),
    ConnectionState(ConnectionState),
    IceConnectionState(IceState),
}

/// Everything that reaches the room task from links and negotiation tasks.
#[derive(Debug)]
pub enum PeerEvent {
    Link {
        remote: ParticipantId,
        generation: u64,
        event: LinkEvent,
    },
    /// An offer task finished, successfully or not.
    OfferSettled {
        remote: ParticipantId,
        generation: u64,
        attempt: u64,
        /// The local offer was applied to the link.
        applied: bool,
    },
}

/// Sink handed to a link at creation. Every event is stamped with the entry
/// generation the link belongs to.
#[derive(Debug, Clone)]
pub struct LinkEvents {
    remote: ParticipantId,
    generation: u64,
    tx: mpsc::UnboundedSender<PeerEvent>,
}

impl LinkEvents {
    pub(crate) fn new(
        remote: ParticipantId,
        generation: u64,
        tx: mpsc::UnboundedSender<PeerEvent>,
    ) -> Self {
        Self {
            remote,
            generation,
            tx,
        }
    }

    pub fn remote(&self) -> &ParticipantId {
        &self.remote
    }

    pub fn emit(&self, event: LinkEvent) {
        let sent = self.tx.send(PeerEvent::Link {
            remote: self.remote.clone(),
            generation: self.generation,
            event,
        });
        if sent.is_err() {
            trace!("Room task gone, dropping link event for {:?}", self.remote);
        }
    }
}
