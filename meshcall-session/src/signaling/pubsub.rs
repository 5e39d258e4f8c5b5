use crate::error::SignalingError;
use async_trait::async_trait;
use meshcall_core::{ParticipantId, PresenceRecord};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Raw events delivered by the realtime transport for one topic.
#[derive(Debug, Clone)]
pub enum TopicEvent {
    Broadcast {
        event: String,
        payload: serde_json::Value,
    },
    PresenceJoin(Vec<PresenceRecord>),
    PresenceLeave(Vec<PresenceRecord>),
    /// Full current membership.
    PresenceSync(Vec<PresenceRecord>),
}

/// Operations on an active topic subscription.
#[async_trait]
pub trait TopicHandle: Send + Sync {
    async fn track(&self, presence: PresenceRecord) -> Result<(), SignalingError>;

    async fn untrack(&self) -> Result<(), SignalingError>;

    async fn send(&self, event: &str, payload: serde_json::Value) -> Result<(), SignalingError>;

    async fn unsubscribe(&self) -> Result<(), SignalingError>;
}

pub struct Subscription {
    pub handle: Arc<dyn TopicHandle>,
    /// Closed by the transport when the subscription is lost.
    pub events: mpsc::UnboundedReceiver<TopicEvent>,
}

/// The external realtime messaging service.
///
/// `subscribe` resolves once the transport confirms the subscription; it does
/// not retry.
#[async_trait]
pub trait PubSub: Send + Sync + 'static {
    async fn subscribe(
        &self,
        topic: &str,
        presence_key: &ParticipantId,
    ) -> Result<Subscription, SignalingError>;
}
