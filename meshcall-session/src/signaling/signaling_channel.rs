use crate::error::SignalingError;
use crate::signaling::{PubSub, TopicEvent, TopicHandle};
use meshcall_core::{
    ParticipantId, PresenceRecord, RoomId, SIGNAL_EVENT, SignalMessage, SignalPayload,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Room-scoped view of the transport.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    PresenceJoin(Vec<PresenceRecord>),
    PresenceLeave(Vec<PresenceRecord>),
    PresenceSync(Vec<PresenceRecord>),
    /// Every decoded signal on the topic, whoever it is addressed to.
    Signal(SignalMessage),
}

/// Sends directed signals on the room topic. Cheap to clone into offer tasks.
#[derive(Clone)]
pub struct SignalSender {
    local_id: ParticipantId,
    handle: Arc<dyn TopicHandle>,
}

impl SignalSender {
    pub async fn send(&self, to: &ParticipantId, data: SignalPayload) -> Result<(), SignalingError> {
        let message = SignalMessage {
            from: self.local_id.clone(),
            to: to.clone(),
            data,
        };
        trace!("Sending {:?} to {:?}", message.kind(), to);
        let payload = serde_json::to_value(&message)?;
        self.handle.send(SIGNAL_EVENT, payload).await
    }
}

pub struct SignalingChannel {
    topic: String,
    local_id: ParticipantId,
    handle: Arc<dyn TopicHandle>,
    events: mpsc::UnboundedReceiver<TopicEvent>,
    left: AtomicBool,
}

impl SignalingChannel {
    /// Joins `webrtc:{room}` with presence keyed by `local_id`. Fails with
    /// `ChannelUnavailable` if the transport does not confirm within `timeout`.
    pub async fn subscribe(
        pubsub: &dyn PubSub,
        room: &RoomId,
        local_id: &ParticipantId,
        timeout: Duration,
    ) -> Result<Self, SignalingError> {
        let topic = room.topic();
        debug!("Subscribing to {} as {:?}", topic, local_id);

        let subscription = match tokio::time::timeout(timeout, pubsub.subscribe(&topic, local_id))
            .await
        {
            Ok(Ok(subscription)) => subscription,
            Ok(Err(e)) => {
                return Err(SignalingError::ChannelUnavailable {
                    topic,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(SignalingError::ChannelUnavailable {
                    topic,
                    reason: format!("not subscribed within {:?}", timeout),
                });
            }
        };

        info!("Subscribed to {}", topic);
        Ok(Self {
            topic,
            local_id: local_id.clone(),
            handle: subscription.handle,
            events: subscription.events,
            left: AtomicBool::new(false),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Starts presence tracking with `{ user_id, joined_at }`.
    pub async fn announce(&self) -> Result<(), SignalingError> {
        let joined_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        self.handle
            .track(PresenceRecord::new(self.local_id.clone(), joined_at))
            .await
    }

    pub fn sender(&self) -> SignalSender {
        SignalSender {
            local_id: self.local_id.clone(),
            handle: Arc::clone(&self.handle),
        }
    }

    /// Next presence transition or signal. `None` once the transport closed
    /// the subscription.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.events.recv().await? {
                TopicEvent::PresenceJoin(records) => return Some(ChannelEvent::PresenceJoin(records)),
                TopicEvent::PresenceLeave(records) => {
                    return Some(ChannelEvent::PresenceLeave(records));
                }
                TopicEvent::PresenceSync(records) => return Some(ChannelEvent::PresenceSync(records)),
                TopicEvent::Broadcast { event, payload } if event == SIGNAL_EVENT => {
                    match serde_json::from_value::<SignalMessage>(payload) {
                        Ok(message) => return Some(ChannelEvent::Signal(message)),
                        Err(e) => warn!("Dropping malformed signal on {}: {}", self.topic, e),
                    }
                }
                TopicEvent::Broadcast { event, .. } => {
                    trace!("Ignoring broadcast '{}' on {}", event, self.topic);
                }
            }
        }
    }

    /// Untracks presence, then unsubscribes. Later calls are no-ops.
    pub async fn leave(&self) -> Result<(), SignalingError> {
        if self.left.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Err(e) = self.handle.untrack().await {
            warn!("Failed to untrack presence on {}: {}", self.topic, e);
        }
        self.handle.unsubscribe().await?;
        info!("Left {}", self.topic);
        Ok(())
    }
}
