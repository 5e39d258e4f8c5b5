use crate::error::SignalingError;
use crate::signaling::{PubSub, Subscription, TopicEvent, TopicHandle};
use async_trait::async_trait;
use dashmap::DashMap;
use meshcall_core::{ParticipantId, PresenceRecord};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, trace};

struct Subscriber {
    key: ParticipantId,
    tx: mpsc::UnboundedSender<TopicEvent>,
    presence: Option<PresenceRecord>,
}

struct HeldBroadcast {
    from: u64,
    event: String,
    payload: serde_json::Value,
}

#[derive(Default)]
struct TopicState {
    subscribers: BTreeMap<u64, Subscriber>,
    held: Option<Vec<HeldBroadcast>>,
}

impl TopicState {
    fn members(&self) -> Vec<PresenceRecord> {
        self.subscribers
            .values()
            .filter_map(|s| s.presence.clone())
            .collect()
    }

    fn deliver(&self, event: TopicEvent, skip: Option<u64>) {
        for (id, subscriber) in &self.subscribers {
            if Some(*id) == skip {
                continue;
            }
            let _ = subscriber.tx.send(event.clone());
        }
    }

    fn deliver_presence(&self, change: TopicEvent) {
        self.deliver(change, None);
        self.deliver(TopicEvent::PresenceSync(self.members()), None);
    }
}

struct HubInner {
    topics: DashMap<String, TopicState>,
    reachable: AtomicBool,
    next_id: AtomicU64,
}

/// In-process pub/sub with presence, for single-process rooms and tests.
///
/// Broadcasts are not echoed back to the sender. `hold`/`release` buffer
/// broadcasts on a topic so that racing signals can be delivered at a chosen
/// point.
#[derive(Clone)]
pub struct LocalHub {
    inner: Arc<HubInner>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                topics: DashMap::new(),
                reachable: AtomicBool::new(true),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// While unreachable, `subscribe` never completes.
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::Release);
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .topics
            .get(topic)
            .map(|t| t.subscribers.len())
            .unwrap_or(0)
    }

    pub fn members(&self, topic: &str) -> Vec<PresenceRecord> {
        self.inner
            .topics
            .get(topic)
            .map(|t| t.members())
            .unwrap_or_default()
    }

    pub fn hold(&self, topic: &str) {
        let mut state = self.inner.topics.entry(topic.to_owned()).or_default();
        if state.held.is_none() {
            state.held = Some(Vec::new());
        }
    }

    pub fn held_messages(&self, topic: &str) -> usize {
        self.inner
            .topics
            .get(topic)
            .and_then(|t| t.held.as_ref().map(Vec::len))
            .unwrap_or(0)
    }

    /// Delivers every held broadcast in send order and stops holding.
    pub fn release(&self, topic: &str) {
        let Some(mut state) = self.inner.topics.get_mut(topic) else {
            return;
        };
        let held = state.held.take().unwrap_or_default();
        debug!("Releasing {} held broadcasts on {}", held.len(), topic);

        for message in held {
            state.deliver(
                TopicEvent::Broadcast {
                    event: message.event,
                    payload: message.payload,
                },
                Some(message.from),
            );
        }
    }

    /// Re-sends the current membership to every subscriber.
    pub fn resync(&self, topic: &str) {
        if let Some(state) = self.inner.topics.get(topic) {
            state.deliver(TopicEvent::PresenceSync(state.members()), None);
        }
    }

    /// Drops every subscription on the topic as if the transport lost it.
    pub fn close_topic(&self, topic: &str) {
        if self.inner.topics.remove(topic).is_some() {
            debug!("Closed topic {}", topic);
        }
    }

    fn track(&self, topic: &str, id: u64, record: PresenceRecord) -> Result<(), SignalingError> {
        let mut state = self
            .inner
            .topics
            .get_mut(topic)
            .ok_or(SignalingError::Closed)?;
        let subscriber = state
            .subscribers
            .get_mut(&id)
            .ok_or(SignalingError::Closed)?;
        subscriber.presence = Some(record.clone());

        trace!("Presence join {:?} on {}", record.participant_id, topic);
        state.deliver_presence(TopicEvent::PresenceJoin(vec![record]));
        Ok(())
    }

    fn untrack(&self, topic: &str, id: u64) -> Result<(), SignalingError> {
        let mut state = self
            .inner
            .topics
            .get_mut(topic)
            .ok_or(SignalingError::Closed)?;
        let record = state
            .subscribers
            .get_mut(&id)
            .ok_or(SignalingError::Closed)?
            .presence
            .take();

        if let Some(record) = record {
            trace!("Presence leave {:?} on {}", record.participant_id, topic);
            state.deliver_presence(TopicEvent::PresenceLeave(vec![record]));
        }
        Ok(())
    }

    fn broadcast(
        &self,
        topic: &str,
        from: u64,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), SignalingError> {
        let mut state = self
            .inner
            .topics
            .get_mut(topic)
            .ok_or(SignalingError::Closed)?;
        if !state.subscribers.contains_key(&from) {
            return Err(SignalingError::Closed);
        }

        if let Some(held) = state.held.as_mut() {
            held.push(HeldBroadcast {
                from,
                event: event.to_owned(),
                payload,
            });
            return Ok(());
        }

        state.deliver(
            TopicEvent::Broadcast {
                event: event.to_owned(),
                payload,
            },
            Some(from),
        );
        Ok(())
    }

    fn unsubscribe(&self, topic: &str, id: u64) {
        let Some(mut state) = self.inner.topics.get_mut(topic) else {
            return;
        };
        let Some(subscriber) = state.subscribers.remove(&id) else {
            return;
        };
        debug!("{:?} unsubscribed from {}", subscriber.key, topic);

        if let Some(record) = subscriber.presence {
            state.deliver_presence(TopicEvent::PresenceLeave(vec![record]));
        }
    }
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSub for LocalHub {
    async fn subscribe(
        &self,
        topic: &str,
        presence_key: &ParticipantId,
    ) -> Result<Subscription, SignalingError> {
        if !self.inner.reachable.load(Ordering::Acquire) {
            std::future::pending::<()>().await;
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut state = self.inner.topics.entry(topic.to_owned()).or_default();
            let members = state.members();
            if !members.is_empty() {
                let _ = tx.send(TopicEvent::PresenceSync(members));
            }
            state.subscribers.insert(
                id,
                Subscriber {
                    key: presence_key.clone(),
                    tx,
                    presence: None,
                },
            );
        }
        debug!("{:?} subscribed to {}", presence_key, topic);

        Ok(Subscription {
            handle: Arc::new(LocalTopicHandle {
                hub: self.clone(),
                topic: topic.to_owned(),
                id,
            }),
            events: rx,
        })
    }
}

struct LocalTopicHandle {
    hub: LocalHub,
    topic: String,
    id: u64,
}

#[async_trait]
impl TopicHandle for LocalTopicHandle {
    async fn track(&self, presence: PresenceRecord) -> Result<(), SignalingError> {
        self.hub.track(&self.topic, self.id, presence)
    }

    async fn untrack(&self) -> Result<(), SignalingError> {
        self.hub.untrack(&self.topic, self.id)
    }

    async fn send(&self, event: &str, payload: serde_json::Value) -> Result<(), SignalingError> {
        self.hub.broadcast(&self.topic, self.id, event, payload)
    }

    async fn unsubscribe(&self) -> Result<(), SignalingError> {
        self.hub.unsubscribe(&self.topic, self.id);
        Ok(())
    }
}
