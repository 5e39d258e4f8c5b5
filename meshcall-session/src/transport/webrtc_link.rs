use crate::config::TransportConfig;
use crate::error::LinkError;
use crate::media::{LocalTrack, RemoteTrack, TrackKind};
use crate::transport::{
    ConnectionState, IceState, LinkEvent, LinkEvents, LinkFactory, PeerLink, SignalingState,
    TrackAttachment,
};
use async_trait::async_trait;
use meshcall_core::{IceCandidate, ParticipantId, SdpKind, SessionDescription};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Builds webrtc-rs peer connections sharing one API instance.
pub struct WebRtcLinkFactory {
    api: Arc<API>,
    config: TransportConfig,
}

impl WebRtcLinkFactory {
    pub fn new(config: TransportConfig) -> Result<Self, LinkError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self {
            api: Arc::new(api),
            config,
        })
    }

    fn rtc_configuration(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: self
                .config
                .ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                })
                .collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl LinkFactory for WebRtcLinkFactory {
    async fn connect(
        &self,
        local: &ParticipantId,
        remote: &ParticipantId,
        events: LinkEvents,
    ) -> Result<Arc<dyn PeerLink>, LinkError> {
        let configuration = self.rtc_configuration();
        let peer_connection = Arc::new(
            self.api
                .new_peer_connection(configuration.clone())
                .await?,
        );
        debug!("Created peer connection {:?} -> {:?}", local, remote);

        wire_callbacks(&peer_connection, events.clone());

        Ok(Arc::new(WebRtcLink {
            remote: remote.clone(),
            api: Arc::clone(&self.api),
            configuration,
            events,
            peer_connection: RwLock::new(peer_connection),
            tracks: Mutex::new(HashMap::new()),
        }))
    }
}

fn wire_callbacks(peer_connection: &Arc<RTCPeerConnection>, events: LinkEvents) {
    let state_events = events.clone();
    peer_connection.on_peer_connection_state_change(Box::new(
        move |s: RTCPeerConnectionState| {
            let events = state_events.clone();
            Box::pin(async move {
                info!(
                    "Peer connection state changed for {:?}: {:?}",
                    events.remote(),
                    s
                );
                if let Some(state) = connection_state(s) {
                    events.emit(LinkEvent::ConnectionState(state));
                }
            })
        },
    ));

    let ice_state_events = events.clone();
    peer_connection.on_ice_connection_state_change(Box::new(
        move |s: RTCIceConnectionState| {
            let events = ice_state_events.clone();
            Box::pin(async move {
                debug!("ICE state changed for {:?}: {:?}", events.remote(), s);
                if let Some(state) = ice_state(s) {
                    events.emit(LinkEvent::IceConnectionState(state));
                }
            })
        },
    ));

    let ice_events = events.clone();
    peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
        let events = ice_events.clone();
        Box::pin(async move {
            let Some(candidate) = c else { return };
            let Ok(init) = candidate.to_json() else {
                warn!("Failed to serialize local candidate for {:?}", events.remote());
                return;
            };
            events.emit(LinkEvent::LocalCandidate(IceCandidate {
                candidate: init.candidate,
                sdp_mid: init.sdp_mid,
                sdp_m_line_index: init.sdp_mline_index,
                username_fragment: init.username_fragment,
            }));
        })
    }));

    let negotiation_events = events.clone();
    peer_connection.on_negotiation_needed(Box::new(move || {
        let events = negotiation_events.clone();
        Box::pin(async move {
            events.emit(LinkEvent::NegotiationNeeded);
        })
    }));

    peer_connection.on_track(Box::new(
        move |track: Arc<TrackRemote>,
              _receiver: Arc<RTCRtpReceiver>,
              _transceiver: Arc<RTCRtpTransceiver>| {
            let events = events.clone();
            Box::pin(async move {
                let Some(kind) = TrackKind::from_codec_type(track.kind()) else {
                    return;
                };
                debug!(
                    "Remote {} track {} arrived from {:?}",
                    kind,
                    track.id(),
                    events.remote()
                );
                events.emit(LinkEvent::RemoteTrack(RemoteTrack {
                    id: track.id(),
                    stream_id: track.stream_id(),
                    kind,
                    inbound: Some(track),
                }));
            })
        },
    ));
}

/// Silences a connection that is being replaced, so its shutdown does not
/// reach the room as events of the live link.
fn unwire_callbacks(peer_connection: &RTCPeerConnection) {
    peer_connection.on_peer_connection_state_change(Box::new(|_: RTCPeerConnectionState| {
        Box::pin(async {})
    }));
    peer_connection.on_ice_connection_state_change(Box::new(|_: RTCIceConnectionState| {
        Box::pin(async {})
    }));
    peer_connection.on_ice_candidate(Box::new(|_: Option<RTCIceCandidate>| Box::pin(async {})));
    peer_connection.on_negotiation_needed(Box::new(|| Box::pin(async {})));
    peer_connection.on_track(Box::new(
        |_: Arc<TrackRemote>, _: Arc<RTCRtpReceiver>, _: Arc<RTCRtpTransceiver>| {
            Box::pin(async {})
        },
    ));
}

async fn add_sender(
    peer_connection: &RTCPeerConnection,
    track: Arc<dyn TrackLocal + Send + Sync>,
) -> Result<(), LinkError> {
    let sender = peer_connection.add_track(track).await?;
    // RTCP has to be read for interceptors (NACK, reports) to run.
    tokio::spawn(async move {
        let mut rtcp_buf = vec![0u8; 1500];
        while sender.read(&mut rtcp_buf).await.is_ok() {}
    });
    Ok(())
}

/// A webrtc-rs peer connection to one remote participant.
///
/// webrtc-rs 0.17 has no `rollback` for a local offer. Yielding to a remote
/// offer in `have-local-offer` replaces the connection with a fresh one that
/// carries the same local tracks and then applies the remote offer to it.
pub struct WebRtcLink {
    remote: ParticipantId,
    api: Arc<API>,
    configuration: RTCConfiguration,
    events: LinkEvents,
    peer_connection: RwLock<Arc<RTCPeerConnection>>,
    tracks: Mutex<HashMap<TrackKind, Arc<dyn TrackLocal + Send + Sync>>>,
}

impl WebRtcLink {
    /// The connection currently backing this link.
    pub fn peer_connection(&self) -> Arc<RTCPeerConnection> {
        let current = self
            .peer_connection
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&current)
    }

    fn swap_connection(&self, fresh: Arc<RTCPeerConnection>) -> Arc<RTCPeerConnection> {
        let mut current = self
            .peer_connection
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, fresh)
    }

    /// Drops the pending local offer by moving the tracks onto a new connection.
    async fn discard_local_offer(&self) -> Result<(), LinkError> {
        let fresh = Arc::new(
            self.api
                .new_peer_connection(self.configuration.clone())
                .await?,
        );
        let tracks: Vec<_> = self.tracks.lock().await.values().cloned().collect();
        for track in tracks {
            add_sender(&fresh, track).await?;
        }
        wire_callbacks(&fresh, self.events.clone());

        let stale = self.swap_connection(fresh);
        unwire_callbacks(&stale);
        if stale.current_remote_description().await.is_some() {
            warn!(
                "Replacing established connection to {:?} to yield its offer",
                self.remote
            );
        }
        if let Err(e) = stale.close().await {
            debug!("Failed to close replaced connection to {:?}: {}", self.remote, e);
        }
        Ok(())
    }
}

#[async_trait]
impl PeerLink for WebRtcLink {
    fn signaling_state(&self) -> SignalingState {
        match self.peer_connection().signaling_state() {
            RTCSignalingState::HaveLocalOffer => SignalingState::HaveLocalOffer,
            RTCSignalingState::HaveRemoteOffer => SignalingState::HaveRemoteOffer,
            RTCSignalingState::HaveLocalPranswer => SignalingState::HaveLocalPranswer,
            RTCSignalingState::HaveRemotePranswer => SignalingState::HaveRemotePranswer,
            RTCSignalingState::Closed => SignalingState::Closed,
            _ => SignalingState::Stable,
        }
    }

    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription, LinkError> {
        let options = ice_restart.then(|| RTCOfferOptions {
            ice_restart: true,
            ..Default::default()
        });
        let offer = self.peer_connection().create_offer(options).await?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, LinkError> {
        let answer = self.peer_connection().create_answer(None).await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), LinkError> {
        self.peer_connection()
            .set_local_description(to_rtc_description(desc)?)
            .await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), LinkError> {
        if desc.kind == SdpKind::Offer
            && self.peer_connection().signaling_state() == RTCSignalingState::HaveLocalOffer
        {
            debug!("Discarding local offer to {:?}", self.remote);
            self.discard_local_offer().await?;
        }

        self.peer_connection()
            .set_remote_description(to_rtc_description(desc)?)
            .await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), LinkError> {
        let peer_connection = self.peer_connection();
        if peer_connection.remote_description().await.is_none() {
            return Err(LinkError::InvalidState(
                "remote description not set".to_owned(),
            ));
        }

        peer_connection
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_m_line_index,
                username_fragment: candidate.username_fragment,
            })
            .await?;
        Ok(())
    }

    async fn attach_track(&self, track: &LocalTrack) -> Result<TrackAttachment, LinkError> {
        let sample_track: Arc<dyn TrackLocal + Send + Sync> = track.sample_track();
        let codec_type = sample_track.kind();
        let peer_connection = self.peer_connection();
        let mut tracks = self.tracks.lock().await;

        for sender in peer_connection.get_senders().await {
            let Some(current) = sender.track().await else {
                continue;
            };
            if current.kind() == codec_type {
                sender.replace_track(Some(Arc::clone(&sample_track))).await?;
                tracks.insert(track.kind(), sample_track);
                trace!("Replaced {} track for {:?}", track.kind(), self.remote);
                return Ok(TrackAttachment::Replaced);
            }
        }

        add_sender(&peer_connection, Arc::clone(&sample_track)).await?;
        tracks.insert(track.kind(), sample_track);
        trace!("Added {} track for {:?}", track.kind(), self.remote);
        Ok(TrackAttachment::Added)
    }

    async fn close(&self) -> Result<(), LinkError> {
        self.peer_connection().close().await?;
        Ok(())
    }
}

fn to_rtc_description(desc: SessionDescription) -> Result<RTCSessionDescription, LinkError> {
    let description = match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp)?,
    };
    Ok(description)
}

fn connection_state(state: RTCPeerConnectionState) -> Option<ConnectionState> {
    match state {
        RTCPeerConnectionState::New => Some(ConnectionState::New),
        RTCPeerConnectionState::Connecting => Some(ConnectionState::Connecting),
        RTCPeerConnectionState::Connected => Some(ConnectionState::Connected),
        RTCPeerConnectionState::Disconnected => Some(ConnectionState::Disconnected),
        RTCPeerConnectionState::Failed => Some(ConnectionState::Failed),
        RTCPeerConnectionState::Closed => Some(ConnectionState::Closed),
        _ => None,
    }
}

fn ice_state(state: RTCIceConnectionState) -> Option<IceState> {
    match state {
        RTCIceConnectionState::New => Some(IceState::New),
        RTCIceConnectionState::Checking => Some(IceState::Checking),
        RTCIceConnectionState::Connected => Some(IceState::Connected),
        RTCIceConnectionState::Completed => Some(IceState::Completed),
        RTCIceConnectionState::Disconnected => Some(IceState::Disconnected),
        RTCIceConnectionState::Failed => Some(IceState::Failed),
        RTCIceConnectionState::Closed => Some(IceState::Closed),
        _ => None,
    }
}
