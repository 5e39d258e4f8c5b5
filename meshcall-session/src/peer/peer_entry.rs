use crate::media::{LocalStream, RemoteStream, TrackKind};
use crate::peer::{Negotiation, NegotiationState};
use crate::transport::{PeerLink, SignalingState, TrackAttachment};
use meshcall_core::ParticipantId;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerRole {
    Polite,
    Impolite,
}

impl PeerRole {
    pub fn from_polite(polite: bool) -> Self {
        if polite {
            PeerRole::Polite
        } else {
            PeerRole::Impolite
        }
    }
}

/// Snapshot of one peer for callers.
#[derive(Debug, Clone, Serialize)]
pub struct PeerInfo {
    pub participant: ParticipantId,
    pub role: PeerRole,
    pub signaling_state: SignalingState,
    pub negotiation: NegotiationState,
    pub remote_tracks: usize,
}

/// Everything the manager knows about one remote participant.
pub(crate) struct PeerEntry {
    pub remote: ParticipantId,
    pub link: Arc<dyn PeerLink>,
    pub role: PeerRole,
    pub negotiation: Negotiation,
    /// Distinguishes this entry from earlier ones for the same participant.
    pub generation: u64,
    pub remote_stream: Option<Arc<RemoteStream>>,
    /// Local track id currently sent per kind.
    pub attached: HashMap<TrackKind, String>,
    /// Raised to make a running offer task give up.
    pub offer_abort: Option<Arc<AtomicBool>>,
}

impl PeerEntry {
    pub fn new(
        remote: ParticipantId,
        link: Arc<dyn PeerLink>,
        polite: bool,
        generation: u64,
    ) -> Self {
        Self {
            remote,
            link,
            role: PeerRole::from_polite(polite),
            negotiation: Negotiation::new(polite),
            generation,
            remote_stream: None,
            attached: HashMap::new(),
            offer_abort: None,
        }
    }

    pub fn abort_offer(&mut self) {
        if let Some(flag) = self.offer_abort.take() {
            flag.store(true, Ordering::Release);
        }
    }

    /// Mirror the local stream onto the link: replace by kind, add new kinds.
    pub async fn attach_stream(&mut self, stream: &LocalStream) -> usize {
        let mut added = 0;
        for track in stream.tracks() {
            if self.attached.get(&track.kind()).map(String::as_str) == Some(track.id()) {
                continue;
            }

            match self.link.attach_track(track).await {
                Ok(attachment) => {
                    self.attached.insert(track.kind(), track.id().to_owned());
                    if attachment == TrackAttachment::Added {
                        added += 1;
                    }
                }
                Err(e) => warn!(
                    "Failed to attach {} track to {:?}: {}",
                    track.kind(),
                    self.remote,
                    e
                ),
            }
        }
        added
    }

    pub fn info(&self) -> PeerInfo {
        PeerInfo {
            participant: self.remote.clone(),
            role: self.role,
            signaling_state: self.link.signaling_state(),
            negotiation: self.negotiation.state(),
            remote_tracks: self
                .remote_stream
                .as_ref()
                .map(|s| s.track_count())
                .unwrap_or(0),
        }
    }
}
