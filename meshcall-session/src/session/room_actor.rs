use crate::error::SessionError;
use crate::peer::PeerManager;
use crate::session::{SessionCommand, SessionObserver};
use crate::signaling::{ChannelEvent, SignalingChannel};
use crate::transport::PeerEvent;
use meshcall_core::RoomId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Single writer of a joined room's state.
pub(crate) struct RoomActor {
    room: RoomId,
    channel: SignalingChannel,
    channel_open: bool,
    peers: PeerManager,
    command_rx: mpsc::Receiver<SessionCommand>,
    peer_rx: mpsc::UnboundedReceiver<PeerEvent>,
    observer: Arc<dyn SessionObserver>,
}

impl RoomActor {
    pub fn new(
        room: RoomId,
        channel: SignalingChannel,
        peers: PeerManager,
        command_rx: mpsc::Receiver<SessionCommand>,
        peer_rx: mpsc::UnboundedReceiver<PeerEvent>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            room,
            channel,
            channel_open: true,
            peers,
            command_rx,
            peer_rx,
            observer,
        }
    }

    pub async fn run(mut self) {
        info!("Room {} event loop started for {:?}", self.room, self.peers.local_id());

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(SessionCommand::Leave { done }) => {
                            self.shutdown().await;
                            let _ = done.send(());
                            break;
                        }
                        Some(c) => self.handle_command(c).await,
                        None => {
                            info!("Session handle dropped. Leaving room {}.", self.room);
                            self.shutdown().await;
                            break;
                        }
                    }
                }

                evt = self.channel.recv(), if self.channel_open => {
                    match evt {
                        Some(e) => self.handle_channel_event(e).await,
                        None => {
                            error!("Signaling channel {} closed by the transport", self.channel.topic());
                            self.channel_open = false;
                            let err = SessionError::ChannelLost {
                                topic: self.channel.topic().to_owned(),
                            };
                            self.observer.on_error(&err).await;
                        }
                    }
                }

                Some(evt) = self.peer_rx.recv() => {
                    self.peers.handle_event(evt).await;
                }
            }
        }

        info!("Room {} event loop finished", self.room);
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::UpdateLocalStream { stream, done } => {
                self.peers.update_local_stream(stream).await;
                let _ = done.send(());
            }
            SessionCommand::PeerCount { reply } => {
                let _ = reply.send(self.peers.peer_count());
            }
            SessionCommand::RemoteStreams { reply } => {
                let _ = reply.send(self.peers.remote_streams());
            }
            SessionCommand::Peers { reply } => {
                let _ = reply.send(self.peers.peers());
            }
            SessionCommand::Leave { done } => {
                let _ = done.send(());
            }
        }
    }

    async fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::PresenceJoin(records) => {
                for record in records {
                    debug!("Presence join: {:?}", record.participant_id);
                    self.peers.ensure_peer(&record.participant_id).await;
                }
            }
            ChannelEvent::PresenceSync(records) => {
                for record in records {
                    self.peers.ensure_peer(&record.participant_id).await;
                }
            }
            ChannelEvent::PresenceLeave(records) => {
                for record in records {
                    debug!("Presence leave: {:?}", record.participant_id);
                    self.peers.remove_peer(&record.participant_id).await;
                }
            }
            ChannelEvent::Signal(message) => self.peers.handle_signal(message).await,
        }
    }

    async fn shutdown(&mut self) {
        self.peers.close_all().await;
        if let Err(e) = self.channel.leave().await {
            warn!("Failed to leave channel {}: {}", self.channel.topic(), e);
        }
    }
}
