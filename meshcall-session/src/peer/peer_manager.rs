use crate::error::{NegotiationError, PeerFault};
use crate::media::{LocalStream, RemoteStream, RemoteTrack};
use crate::peer::{OfferDecision, OfferIntent, PeerEntry, PeerInfo};
use crate::session::SessionObserver;
use crate::signaling::SignalSender;
use crate::transport::{
    ConnectionState, IceState, LinkEvent, LinkEvents, LinkFactory, PeerEvent, PeerLink,
    SignalingState,
};
use meshcall_core::{ParticipantId, SessionDescription, SignalMessage, SignalPayload, is_polite};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Reports the end of an offer task when dropped, whatever path it took.
struct OfferGuard {
    tx: mpsc::UnboundedSender<PeerEvent>,
    remote: ParticipantId,
    generation: u64,
    attempt: u64,
    applied: bool,
}

impl Drop for OfferGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(PeerEvent::OfferSettled {
            remote: self.remote.clone(),
            generation: self.generation,
            attempt: self.attempt,
            applied: self.applied,
        });
    }
}

/// Owns every peer entry of a room. Only the room task calls into it.
pub(crate) struct PeerManager {
    local_id: ParticipantId,
    links: Arc<dyn LinkFactory>,
    signals: SignalSender,
    observer: Arc<dyn SessionObserver>,
    events_tx: mpsc::UnboundedSender<PeerEvent>,
    peers: HashMap<ParticipantId, PeerEntry>,
    local_stream: LocalStream,
    next_generation: u64,
}

impl PeerManager {
    pub fn new(
        local_id: ParticipantId,
        links: Arc<dyn LinkFactory>,
        signals: SignalSender,
        observer: Arc<dyn SessionObserver>,
        events_tx: mpsc::UnboundedSender<PeerEvent>,
        local_stream: LocalStream,
    ) -> Self {
        Self {
            local_id,
            links,
            signals,
            observer,
            events_tx,
            peers: HashMap::new(),
            local_stream,
            next_generation: 1,
        }
    }

    pub fn local_id(&self) -> &ParticipantId {
        &self.local_id
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn remote_streams(&self) -> HashMap<ParticipantId, Arc<RemoteStream>> {
        self.peers
            .iter()
            .filter_map(|(id, entry)| entry.remote_stream.clone().map(|s| (id.clone(), s)))
            .collect()
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        let mut peers: Vec<PeerInfo> = self.peers.values().map(PeerEntry::info).collect();
        peers.sort_by(|a, b| a.participant.cmp(&b.participant));
        peers
    }

    /// Creates the entry for `remote` unless one exists. Returns whether a new
    /// entry was created.
    pub async fn ensure_peer(&mut self, remote: &ParticipantId) -> bool {
        if remote == &self.local_id || self.peers.contains_key(remote) {
            return false;
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        let polite = is_polite(&self.local_id, remote);
        let events = LinkEvents::new(remote.clone(), generation, self.events_tx.clone());

        let link = match self.links.connect(&self.local_id, remote, events).await {
            Ok(link) => link,
            Err(e) => {
                error!("Failed to create peer link for {:?}: {}", remote, e);
                return false;
            }
        };

        let mut entry = PeerEntry::new(remote.clone(), link, polite, generation);
        entry.attach_stream(&self.local_stream).await;
        info!(
            "Peer {:?} added as {:?} (generation {})",
            remote, entry.role, generation
        );
        self.peers.insert(remote.clone(), entry);
        true
    }

    pub async fn handle_signal(&mut self, message: SignalMessage) {
        if !message.is_for(&self.local_id) || message.from == self.local_id {
            trace!("Skipping {:?} addressed to {:?}", message.kind(), message.to);
            return;
        }

        let from = message.from;
        if self.ensure_peer(&from).await {
            debug!("Created peer {:?} from an incoming signal", from);
        }

        match message.data {
            SignalPayload::Offer { sdp } => self.handle_offer(&from, sdp).await,
            SignalPayload::Answer { sdp } => self.handle_answer(&from, sdp).await,
            SignalPayload::Candidate { candidate } => {
                let Some(entry) = self.peers.get(&from) else {
                    return;
                };
                if let Err(e) = entry.link.add_ice_candidate(candidate).await {
                    if entry.negotiation.candidate_failure_expected() {
                        debug!("Candidate from {:?} for an ignored offer: {}", from, e);
                    } else {
                        warn!("Failed to add candidate from {:?}: {}", from, e);
                        self.observer
                            .on_peer_fault(PeerFault::IceAddFailure {
                                participant: from.clone(),
                                reason: e.to_string(),
                            })
                            .await;
                    }
                }
            }
        }
    }

    async fn handle_offer(&mut self, from: &ParticipantId, sdp: SessionDescription) {
        let Some(entry) = self.peers.get_mut(from) else {
            return;
        };

        let signaling = entry.link.signaling_state();
        match entry.negotiation.on_remote_offer(signaling) {
            OfferDecision::Ignore => {
                debug!("Ignoring colliding offer from {:?} ({:?})", from, signaling);
                return;
            }
            OfferDecision::Accept { superseded_own } => {
                if superseded_own {
                    debug!("Yielding own offer to {:?}", from);
                    entry.abort_offer();
                }
            }
        }

        let link = Arc::clone(&entry.link);
        if let Err(e) = self.answer(&link, from, sdp).await {
            warn!("Failed to answer offer from {:?}: {}", from, e);
        }

        let next = match self.peers.get_mut(from) {
            Some(entry) => entry.negotiation.finish_answer(),
            None => None,
        };
        if let Some(intent) = next {
            self.start_offer(from, intent);
        }
    }

    async fn answer(
        &self,
        link: &Arc<dyn PeerLink>,
        from: &ParticipantId,
        offer: SessionDescription,
    ) -> Result<(), NegotiationError> {
        link.set_remote_description(offer).await?;
        let answer = link.create_answer().await?;
        link.set_local_description(answer.clone()).await?;
        self.signals
            .send(from, SignalPayload::Answer { sdp: answer })
            .await?;
        debug!("Answered offer from {:?}", from);
        Ok(())
    }

    async fn handle_answer(&mut self, from: &ParticipantId, sdp: SessionDescription) {
        let Some(entry) = self.peers.get_mut(from) else {
            return;
        };

        let applied = match entry.link.set_remote_description(sdp).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to apply answer from {:?}: {}", from, e);
                false
            }
        };

        if let Some(intent) = entry.negotiation.on_remote_answer(applied) {
            self.start_offer(from, intent);
        }
    }

    pub async fn handle_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Link {
                remote,
                generation,
                event,
            } => {
                if !self.is_current(&remote, generation) {
                    trace!("Dropping stale link event for {:?}: {:?}", remote, event);
                    return;
                }
                self.handle_link_event(&remote, event).await;
            }
            PeerEvent::OfferSettled {
                remote,
                generation,
                attempt,
                applied,
            } => {
                if !self.is_current(&remote, generation) {
                    return;
                }
                let next = self
                    .peers
                    .get_mut(&remote)
                    .and_then(|entry| entry.negotiation.finish_offer(attempt, applied));
                if let Some(intent) = next {
                    self.start_offer(&remote, intent);
                }
            }
        }
    }

    async fn handle_link_event(&mut self, remote: &ParticipantId, event: LinkEvent) {
        match event {
            LinkEvent::NegotiationNeeded => self.start_offer(remote, OfferIntent::Renegotiate),
            LinkEvent::LocalCandidate(candidate) => {
                if let Err(e) = self
                    .signals
                    .send(remote, SignalPayload::Candidate { candidate })
                    .await
                {
                    warn!("Failed to send candidate to {:?}: {}", remote, e);
                }
            }
            LinkEvent::RemoteTrack(track) => self.add_remote_track(remote, track).await,
            LinkEvent::ConnectionState(state) => {
                self.observer.on_connection_state(remote, state).await;
                if state == ConnectionState::Failed {
                    warn!("Connection to {:?} failed, tearing down", remote);
                    self.observer
                        .on_peer_fault(PeerFault::ConnectionFailed {
                            participant: remote.clone(),
                        })
                        .await;
                    self.remove_peer(remote).await;
                }
            }
            LinkEvent::IceConnectionState(IceState::Failed) => {
                warn!("ICE failed for {:?}, restarting", remote);
                self.observer
                    .on_peer_fault(PeerFault::IceTransientFailure {
                        participant: remote.clone(),
                    })
                    .await;
                self.start_offer(remote, OfferIntent::IceRestart);
            }
            LinkEvent::IceConnectionState(state) => {
                trace!("ICE state for {:?}: {:?}", remote, state);
            }
        }
    }

    async fn add_remote_track(&mut self, remote: &ParticipantId, track: RemoteTrack) {
        let Some(entry) = self.peers.get_mut(remote) else {
            return;
        };

        let (stream, is_new) = match &entry.remote_stream {
            Some(stream) if stream.id() == track.stream_id => (Arc::clone(stream), false),
            _ => (Arc::new(RemoteStream::new(track.stream_id.clone())), true),
        };
        stream.insert(track);

        if is_new {
            info!("Remote stream {} from {:?}", stream.id(), remote);
            entry.remote_stream = Some(Arc::clone(&stream));
            self.observer.on_remote_stream(remote, stream).await;
        }
    }

    fn is_current(&self, remote: &ParticipantId, generation: u64) -> bool {
        self.peers
            .get(remote)
            .is_some_and(|entry| entry.generation == generation)
    }

    /// Spawns the offer task if negotiation allows it.
    fn start_offer(&mut self, remote: &ParticipantId, intent: OfferIntent) {
        let Some(entry) = self.peers.get_mut(remote) else {
            return;
        };

        if !entry
            .negotiation
            .begin_offer(intent, entry.link.signaling_state())
        {
            debug!(
                "Not starting {:?} for {:?} now ({:?}, restart pending: {})",
                intent,
                remote,
                entry.negotiation.state(),
                entry.negotiation.restart_pending()
            );
            return;
        }

        let abort = Arc::new(AtomicBool::new(false));
        entry.offer_abort = Some(Arc::clone(&abort));

        let guard = OfferGuard {
            tx: self.events_tx.clone(),
            remote: remote.clone(),
            generation: entry.generation,
            attempt: entry.negotiation.attempt(),
            applied: false,
        };
        tokio::spawn(run_offer(
            Arc::clone(&entry.link),
            self.signals.clone(),
            intent,
            abort,
            guard,
        ));
    }

    /// Tears down one peer. Returns `false` if it was already gone.
    pub async fn remove_peer(&mut self, remote: &ParticipantId) -> bool {
        let Some(mut entry) = self.peers.remove(remote) else {
            return false;
        };

        entry.abort_offer();
        if let Err(e) = entry.link.close().await {
            warn!("Failed to close link to {:?}: {}", remote, e);
        }
        info!("Peer {:?} removed", remote);
        self.observer.on_peer_disconnect(remote).await;
        true
    }

    /// Replaces the local stream and mirrors it onto every link.
    pub async fn update_local_stream(&mut self, stream: LocalStream) {
        for entry in self.peers.values_mut() {
            let added = entry.attach_stream(&stream).await;
            debug!(
                "Local stream {} applied to {:?} ({} new senders)",
                stream.id(),
                entry.remote,
                added
            );
        }
        self.local_stream = stream;
    }

    pub async fn close_all(&mut self) {
        let mut remotes: Vec<ParticipantId> = self.peers.keys().cloned().collect();
        remotes.sort();
        for remote in remotes {
            self.remove_peer(&remote).await;
        }
    }
}

async fn run_offer(
    link: Arc<dyn PeerLink>,
    signals: SignalSender,
    intent: OfferIntent,
    abort: Arc<AtomicBool>,
    mut guard: OfferGuard,
) {
    let remote = guard.remote.clone();

    let offer = match link.create_offer(intent.ice_restart()).await {
        Ok(offer) => offer,
        Err(e) => {
            warn!("Failed to create offer for {:?}: {}", remote, e);
            return;
        }
    };

    if abort.load(Ordering::Acquire) || link.signaling_state() != SignalingState::Stable {
        debug!("Abandoning offer for {:?}", remote);
        return;
    }

    if let Err(e) = link.set_local_description(offer.clone()).await {
        warn!("Failed to apply local offer for {:?}: {}", remote, e);
        return;
    }
    guard.applied = true;

    if let Err(e) = signals
        .send(&remote, SignalPayload::Offer { sdp: offer })
        .await
    {
        warn!("Failed to send offer to {:?}: {}", remote, e);
        return;
    }
    debug!(
        "Sent {} to {:?}",
        if intent.ice_restart() {
            "ICE restart offer"
        } else {
            "offer"
        },
        remote
    );
}
