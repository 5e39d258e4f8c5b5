use crate::config::{SessionConfig, TransportConfig};
use crate::error::{LinkError, SessionError};
use crate::media::{LocalStream, RemoteStream};
use crate::peer::{PeerInfo, PeerManager};
use crate::session::{RoomActor, SessionCommand, SessionObserver};
use crate::signaling::{PubSub, SignalingChannel};
use crate::transport::{LinkFactory, WebRtcLinkFactory};
use meshcall_core::{ParticipantId, RoomId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

struct ActiveRoom {
    room: RoomId,
    local_id: ParticipantId,
    command_tx: mpsc::Sender<SessionCommand>,
    task: JoinHandle<()>,
}

/// Handle to a participant's place in one room at a time.
///
/// ```no_run
/// # use meshcall_session::*;
/// # use std::sync::Arc;
/// # async fn demo(observer: Arc<dyn SessionObserver>) -> Result<(), Box<dyn std::error::Error>> {
/// let hub = LocalHub::new();
/// let mut session = MeshSession::with_webrtc(
///     SessionConfig::default(),
///     TransportConfig::default(),
///     Arc::new(hub),
///     observer,
/// )?;
///
/// let stream = LocalStream::capture(&[TrackKind::Audio, TrackKind::Video]);
/// session.join("r1".into(), "a1".into(), stream).await?;
/// session.leave().await?;
/// # Ok(())
/// # }
/// ```
pub struct MeshSession {
    config: SessionConfig,
    pubsub: Arc<dyn PubSub>,
    links: Arc<dyn LinkFactory>,
    observer: Arc<dyn SessionObserver>,
    active: Option<ActiveRoom>,
}

impl MeshSession {
    pub fn new(
        config: SessionConfig,
        pubsub: Arc<dyn PubSub>,
        links: Arc<dyn LinkFactory>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            config,
            pubsub,
            links,
            observer,
            active: None,
        }
    }

    /// Session backed by webrtc-rs peer connections.
    pub fn with_webrtc(
        config: SessionConfig,
        transport: TransportConfig,
        pubsub: Arc<dyn PubSub>,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Self, LinkError> {
        let links = Arc::new(WebRtcLinkFactory::new(transport)?);
        Ok(Self::new(config, pubsub, links, observer))
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.active.as_ref().map(|a| &a.room)
    }

    pub fn local_id(&self) -> Option<&ParticipantId> {
        self.active.as_ref().map(|a| &a.local_id)
    }

    pub fn is_joined(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| !a.command_tx.is_closed())
    }

    /// Joins `room` as `participant`. A room already joined is left first.
    pub async fn join(
        &mut self,
        room: RoomId,
        participant: ParticipantId,
        local_stream: LocalStream,
    ) -> Result<(), SessionError> {
        if self.active.is_some() {
            info!("Leaving previous room before joining {}", room);
            self.leave().await?;
        }

        let channel = SignalingChannel::subscribe(
            self.pubsub.as_ref(),
            &room,
            &participant,
            self.config.subscribe_timeout(),
        )
        .await?;

        if let Err(e) = channel.announce().await {
            warn!("Failed to announce presence on {}: {}", channel.topic(), e);
            let _ = channel.leave().await;
            return Err(e.into());
        }

        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let peers = PeerManager::new(
            participant.clone(),
            Arc::clone(&self.links),
            channel.sender(),
            Arc::clone(&self.observer),
            peer_tx,
            local_stream,
        );

        let (command_tx, command_rx) = mpsc::channel(self.config.command_buffer);
        let actor = RoomActor::new(
            room.clone(),
            channel,
            peers,
            command_rx,
            peer_rx,
            Arc::clone(&self.observer),
        );
        let task = tokio::spawn(actor.run());

        info!("Joined room {} as {:?}", room, participant);
        self.active = Some(ActiveRoom {
            room,
            local_id: participant,
            command_tx,
            task,
        });
        Ok(())
    }

    /// Replaces the local media on every peer: same kind is swapped, new kinds
    /// are added and trigger renegotiation.
    pub async fn update_local_stream(&self, stream: LocalStream) -> Result<(), SessionError> {
        self.request(|done| SessionCommand::UpdateLocalStream { stream, done })
            .await
    }

    pub async fn peer_count(&self) -> usize {
        self.request(|reply| SessionCommand::PeerCount { reply })
            .await
            .unwrap_or(0)
    }

    pub async fn remote_streams(&self) -> HashMap<ParticipantId, Arc<RemoteStream>> {
        self.request(|reply| SessionCommand::RemoteStreams { reply })
            .await
            .unwrap_or_default()
    }

    pub async fn peers(&self) -> Vec<PeerInfo> {
        self.request(|reply| SessionCommand::Peers { reply })
            .await
            .unwrap_or_default()
    }

    /// Closes every peer link and unsubscribes. Safe to call when not joined
    /// or more than once.
    pub async fn leave(&mut self) -> Result<(), SessionError> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };

        let (done_tx, done_rx) = oneshot::channel();
        if active
            .command_tx
            .send(SessionCommand::Leave { done: done_tx })
            .await
            .is_ok()
        {
            let _ = done_rx.await;
        }
        if let Err(e) = active.task.await {
            warn!("Room task for {} ended abnormally: {}", active.room, e);
        }

        info!("Left room {}", active.room);
        Ok(())
    }

    /// Leaves and releases the handle.
    pub async fn dispose(mut self) -> Result<(), SessionError> {
        self.leave().await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let active = self.active.as_ref().ok_or(SessionError::NotJoined)?;
        let (tx, rx) = oneshot::channel();
        active
            .command_tx
            .send(build(tx))
            .await
            .map_err(|_| SessionError::Stopped)?;
        rx.await.map_err(|_| SessionError::Stopped)
    }
}
