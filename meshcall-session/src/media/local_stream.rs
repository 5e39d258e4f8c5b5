use crate::error::LinkError;
use crate::media::TrackKind;
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

struct LocalTrackInner {
    id: String,
    stream_id: String,
    kind: TrackKind,
    sample_track: Arc<TrackLocalStaticSample>,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

/// A captured track. The capture engine writes encoded samples into it; every
/// peer link that carries the track forwards them.
///
/// Cloning shares the same track: toggling `enabled` on one clone is seen by
/// every peer without renegotiation.
#[derive(Clone)]
pub struct LocalTrack {
    inner: Arc<LocalTrackInner>,
}

impl LocalTrack {
    pub fn new(kind: TrackKind, stream_id: &str) -> Self {
        let codec = match kind {
            TrackKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            TrackKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
        };
        Self::with_codec(kind, codec, stream_id)
    }

    pub fn with_codec(kind: TrackKind, codec: RTCRtpCodecCapability, stream_id: &str) -> Self {
        let id = format!("{}-{}", kind, Uuid::new_v4());
        let sample_track = Arc::new(TrackLocalStaticSample::new(
            codec,
            id.clone(),
            stream_id.to_owned(),
        ));

        Self {
            inner: Arc::new(LocalTrackInner {
                id,
                stream_id: stream_id.to_owned(),
                kind,
                sample_track,
                enabled: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn stream_id(&self) -> &str {
        &self.inner.stream_id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Mute/unmute in place. Senders keep the track, so no renegotiation happens.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Release);
    }

    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    pub fn sample_track(&self) -> Arc<TrackLocalStaticSample> {
        Arc::clone(&self.inner.sample_track)
    }

    /// Forward one encoded frame. Frames are dropped while the track is
    /// disabled or stopped.
    pub async fn write_frame(&self, data: Bytes, duration: Duration) -> Result<bool, LinkError> {
        if !self.is_enabled() || self.is_stopped() {
            return Ok(false);
        }

        let sample = Sample {
            data,
            duration,
            ..Default::default()
        };
        self.inner.sample_track.write_sample(&sample).await?;
        Ok(true)
    }
}

impl std::fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// The local camera/microphone stream shared by every peer link.
#[derive(Debug, Clone)]
pub struct LocalStream {
    id: String,
    tracks: Vec<LocalTrack>,
}

impl LocalStream {
    /// One fresh track per requested kind, all under a new stream id.
    pub fn capture(kinds: &[TrackKind]) -> Self {
        let id = format!("stream-{}", Uuid::new_v4());
        let tracks = kinds.iter().map(|kind| LocalTrack::new(*kind, &id)).collect();
        debug!("Created local stream {} with {:?}", id, kinds);
        Self { id, tracks }
    }

    pub fn from_tracks(id: impl Into<String>, tracks: Vec<LocalTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    /// Receive-only participation.
    pub fn empty() -> Self {
        Self::capture(&[])
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    pub fn audio_tracks(&self) -> Vec<LocalTrack> {
        self.tracks_of(TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> Vec<LocalTrack> {
        self.tracks_of(TrackKind::Video)
    }

    fn tracks_of(&self, kind: TrackKind) -> Vec<LocalTrack> {
        self.tracks
            .iter()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect()
    }
}
