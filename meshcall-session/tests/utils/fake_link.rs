use async_trait::async_trait;
use meshcall_core::{IceCandidate, ParticipantId, SdpKind, SessionDescription};
use meshcall_session::{
    ConnectionState, IceState, LinkError, LinkEvent, LinkEvents, LinkFactory, LocalTrack,
    PeerLink, RemoteTrack, SignalingState, TrackAttachment, TrackKind,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Builds the fake SDP understood by [`FakeLink`]: one line per sent track.
pub fn fake_sdp(stream_id: &str, tracks: &[(TrackKind, &str)]) -> String {
    let mut sdp = String::from("v=0\r\n");
    for (kind, id) in tracks {
        sdp.push_str(&format!("a=track:{}:{}:{}\r\n", kind, stream_id, id));
    }
    sdp
}

fn parse_tracks(sdp: &str) -> Vec<RemoteTrack> {
    sdp.lines()
        .filter_map(|line| line.strip_prefix("a=track:"))
        .filter_map(|rest| {
            let mut parts = rest.splitn(3, ':');
            let kind = match parts.next()? {
                "audio" => TrackKind::Audio,
                "video" => TrackKind::Video,
                _ => return None,
            };
            let stream_id = parts.next()?;
            let id = parts.next()?;
            Some(RemoteTrack::new(id, stream_id, kind))
        })
        .collect()
}

/// Counters for assertions.
#[derive(Debug, Default)]
pub struct LinkStats {
    pub offers_created: AtomicUsize,
    pub answers_created: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub ice_restarts: AtomicUsize,
    pub candidates_added: AtomicUsize,
    pub candidate_failures: AtomicUsize,
    pub replacements: AtomicUsize,
    pub closes: AtomicUsize,
}

impl LinkStats {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Sender slot: the ids announced in SDP stay fixed when the track is replaced.
#[derive(Debug, Clone)]
struct Sender {
    kind: TrackKind,
    announced_id: String,
    announced_stream: String,
    current_id: String,
}

#[derive(Debug)]
struct FakeLinkState {
    signaling: SignalingState,
    has_remote_description: bool,
    senders: Vec<Sender>,
    needs_negotiation: bool,
    seen_remote: HashSet<String>,
}

/// In-memory signaling state machine standing in for a peer connection.
pub struct FakeLink {
    pub local: ParticipantId,
    pub remote: ParticipantId,
    pub stats: LinkStats,
    events: LinkEvents,
    state: Mutex<FakeLinkState>,
}

impl FakeLink {
    fn new(local: ParticipantId, remote: ParticipantId, events: LinkEvents) -> Self {
        Self {
            local,
            remote,
            stats: LinkStats::default(),
            events,
            state: Mutex::new(FakeLinkState {
                signaling: SignalingState::Stable,
                has_remote_description: false,
                senders: Vec::new(),
                needs_negotiation: false,
                seen_remote: HashSet::new(),
            }),
        }
    }

    pub fn sender_count(&self) -> usize {
        self.state.lock().unwrap().senders.len()
    }

    pub fn sent_track(&self, kind: TrackKind) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .senders
            .iter()
            .find(|s| s.kind == kind)
            .map(|s| s.current_id.clone())
    }

    pub fn fail_connection(&self) {
        self.events
            .emit(LinkEvent::ConnectionState(ConnectionState::Failed));
    }

    pub fn disconnect(&self) {
        self.events
            .emit(LinkEvent::ConnectionState(ConnectionState::Disconnected));
    }

    pub fn fail_ice(&self) {
        self.events
            .emit(LinkEvent::IceConnectionState(IceState::Failed));
    }

    pub fn emit_candidate(&self, candidate: &str) {
        self.events
            .emit(LinkEvent::LocalCandidate(IceCandidate::new(candidate)));
    }

    fn describe(state: &FakeLinkState) -> String {
        let mut sdp = String::from("v=0\r\n");
        for sender in &state.senders {
            sdp.push_str(&format!(
                "a=track:{}:{}:{}\r\n",
                sender.kind, sender.announced_stream, sender.announced_id
            ));
        }
        sdp
    }

    fn reached_stable(&self, state: &mut FakeLinkState) {
        if state.needs_negotiation {
            self.events.emit(LinkEvent::NegotiationNeeded);
        }
    }

    fn invalid(state: &FakeLinkState, op: &str) -> LinkError {
        LinkError::InvalidState(format!("{} in {:?}", op, state.signaling))
    }
}

#[async_trait]
impl PeerLink for FakeLink {
    fn signaling_state(&self) -> SignalingState {
        self.state.lock().unwrap().signaling
    }

    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription, LinkError> {
        let state = self.state.lock().unwrap();
        if state.signaling == SignalingState::Closed {
            return Err(LinkError::Closed);
        }
        self.stats.offers_created.fetch_add(1, Ordering::SeqCst);
        let mut sdp = Self::describe(&state);
        if ice_restart {
            self.stats.ice_restarts.fetch_add(1, Ordering::SeqCst);
            sdp.push_str("a=ice-restart\r\n");
        }
        Ok(SessionDescription::offer(sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, LinkError> {
        let state = self.state.lock().unwrap();
        if state.signaling != SignalingState::HaveRemoteOffer {
            return Err(Self::invalid(&state, "create_answer"));
        }
        self.stats.answers_created.fetch_add(1, Ordering::SeqCst);
        Ok(SessionDescription::answer(Self::describe(&state)))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), LinkError> {
        let mut state = self.state.lock().unwrap();
        match (desc.kind, state.signaling) {
            (SdpKind::Offer, SignalingState::Stable) => {
                state.signaling = SignalingState::HaveLocalOffer;
                state.needs_negotiation = false;
            }
            (SdpKind::Answer, SignalingState::HaveRemoteOffer) => {
                state.signaling = SignalingState::Stable;
                state.needs_negotiation = false;
                self.reached_stable(&mut state);
            }
            _ => return Err(Self::invalid(&state, "set_local_description")),
        }
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), LinkError> {
        let mut state = self.state.lock().unwrap();
        match (desc.kind, state.signaling) {
            (SdpKind::Offer, SignalingState::HaveLocalOffer) => {
                self.stats.rollbacks.fetch_add(1, Ordering::SeqCst);
                state.signaling = SignalingState::HaveRemoteOffer;
            }
            (SdpKind::Offer, SignalingState::Stable) => {
                state.signaling = SignalingState::HaveRemoteOffer;
            }
            (SdpKind::Answer, SignalingState::HaveLocalOffer) => {
                state.signaling = SignalingState::Stable;
                self.reached_stable(&mut state);
            }
            _ => return Err(Self::invalid(&state, "set_remote_description")),
        }
        state.has_remote_description = true;

        for track in parse_tracks(&desc.sdp) {
            if state.seen_remote.insert(track.id.clone()) {
                self.events.emit(LinkEvent::RemoteTrack(track));
            }
        }
        Ok(())
    }

    async fn add_ice_candidate(&self, _candidate: IceCandidate) -> Result<(), LinkError> {
        let state = self.state.lock().unwrap();
        if !state.has_remote_description {
            self.stats.candidate_failures.fetch_add(1, Ordering::SeqCst);
            return Err(LinkError::InvalidState(
                "remote description not set".to_owned(),
            ));
        }
        self.stats.candidates_added.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn attach_track(&self, track: &LocalTrack) -> Result<TrackAttachment, LinkError> {
        let mut state = self.state.lock().unwrap();
        if let Some(sender) = state.senders.iter_mut().find(|s| s.kind == track.kind()) {
            sender.current_id = track.id().to_owned();
            self.stats.replacements.fetch_add(1, Ordering::SeqCst);
            return Ok(TrackAttachment::Replaced);
        }

        state.senders.push(Sender {
            kind: track.kind(),
            announced_id: track.id().to_owned(),
            announced_stream: track.stream_id().to_owned(),
            current_id: track.id().to_owned(),
        });

        let was_needed = std::mem::replace(&mut state.needs_negotiation, true);
        if !was_needed && state.signaling == SignalingState::Stable {
            self.events.emit(LinkEvent::NegotiationNeeded);
        }
        Ok(TrackAttachment::Added)
    }

    async fn close(&self) -> Result<(), LinkError> {
        self.state.lock().unwrap().signaling = SignalingState::Closed;
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Link factory shared by every participant of a test. Keeps every link it
/// created, keyed by `(local, remote)`.
#[derive(Clone, Default)]
pub struct FakeNetwork {
    links: Arc<Mutex<HashMap<(ParticipantId, ParticipantId), Vec<Arc<FakeLink>>>>>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest link `local` opened towards `remote`.
    pub fn link(&self, local: &str, remote: &str) -> Option<Arc<FakeLink>> {
        self.links
            .lock()
            .unwrap()
            .get(&(local.into(), remote.into()))
            .and_then(|links| links.last().cloned())
    }

    pub fn total_offers(&self) -> usize {
        self.links
            .lock()
            .unwrap()
            .values()
            .flatten()
            .map(|link| LinkStats::get(&link.stats.offers_created))
            .sum()
    }

    pub fn links_created(&self, local: &str, remote: &str) -> usize {
        self.links
            .lock()
            .unwrap()
            .get(&(local.into(), remote.into()))
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl LinkFactory for FakeNetwork {
    async fn connect(
        &self,
        local: &ParticipantId,
        remote: &ParticipantId,
        events: LinkEvents,
    ) -> Result<Arc<dyn PeerLink>, LinkError> {
        let link = Arc::new(FakeLink::new(local.clone(), remote.clone(), events));
        self.links
            .lock()
            .unwrap()
            .entry((local.clone(), remote.clone()))
            .or_default()
            .push(Arc::clone(&link));
        Ok(link)
    }
}
