use crate::media::TrackKind;
use dashmap::DashMap;
use std::sync::Arc;
use webrtc::track::track_remote::TrackRemote;

/// An inbound track reported by a peer link.
#[derive(Clone)]
pub struct RemoteTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
    /// The RTP source when the track comes from a live webrtc connection.
    pub inbound: Option<Arc<TrackRemote>>,
}

impl RemoteTrack {
    pub fn new(id: impl Into<String>, stream_id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            stream_id: stream_id.into(),
            kind,
            inbound: None,
        }
    }
}

impl std::fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Live view of a peer's inbound media. Tracks that arrive later for the same
/// stream id show up here without a new `on_remote_stream` notification.
#[derive(Debug)]
pub struct RemoteStream {
    id: String,
    tracks: DashMap<String, RemoteTrack>,
}

impl RemoteStream {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tracks: DashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> Vec<RemoteTrack> {
        self.tracks.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn has_kind(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|entry| entry.value().kind == kind)
    }

    /// Returns `false` when the track was already known.
    pub(crate) fn insert(&self, track: RemoteTrack) -> bool {
        self.tracks.insert(track.id.clone(), track).is_none()
    }
}
