//! In-process pub/sub hub.
//!
//! Nodes attached to the same [`MemoryHub`] see each other's publications on
//! topics they subscribe to, with the same local echo semantics as the swarm.
//! Used by tests and by single-process simulations.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::NetError;
use crate::pubsub::{InboundMessage, PubSub};

const INBOX_CAPACITY: usize = 1024;

struct Member {
    topics: HashSet<String>,
    inbox: mpsc::Sender<InboundMessage>,
}

#[derive(Default)]
struct HubState {
    members: HashMap<String, Member>,
}

/// Shared broker connecting [`MemoryPubSub`] endpoints.
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new endpoint identified by `peer_id`.
    pub fn join(&self, peer_id: &str) -> (MemoryPubSub, mpsc::Receiver<InboundMessage>) {
        let (inbox, rx) = mpsc::channel(INBOX_CAPACITY);
        if let Ok(mut state) = self.state.lock() {
            state.members.insert(
                peer_id.to_string(),
                Member {
                    topics: HashSet::new(),
                    inbox,
                },
            );
        }
        let endpoint = MemoryPubSub {
            hub: self.clone(),
            peer_id: peer_id.to_string(),
            calls: Arc::new(Mutex::new(CallLog::default())),
        };
        (endpoint, rx)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HubState>, NetError> {
        self.state.lock().map_err(|_| NetError::ChannelClosed)
    }
}

/// Counters and injected failures for one endpoint.
#[derive(Default)]
struct CallLog {
    subscribes: HashMap<String, usize>,
    unsubscribes: HashMap<String, usize>,
    published: Vec<String>,
    fail_subscribe: HashSet<String>,
    fail_unsubscribe: HashSet<String>,
}

/// One endpoint on a [`MemoryHub`].
#[derive(Clone)]
pub struct MemoryPubSub {
    hub: MemoryHub,
    peer_id: String,
    calls: Arc<Mutex<CallLog>>,
}

impl MemoryPubSub {
    /// Topics this endpoint is currently subscribed to at the hub.
    pub fn subscribed_topics(&self) -> Vec<String> {
        let Ok(state) = self.hub.state.lock() else {
            return Vec::new();
        };
        let mut topics: Vec<String> = state
            .members
            .get(&self.peer_id)
            .map(|m| m.topics.iter().cloned().collect())
            .unwrap_or_default();
        topics.sort();
        topics
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscribed_topics().iter().any(|t| t == topic)
    }

    /// Number of transport-level subscribe calls issued for `topic`.
    pub fn subscribe_calls(&self, topic: &str) -> usize {
        self.calls
            .lock()
            .map(|c| c.subscribes.get(topic).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Number of transport-level unsubscribe calls issued for `topic`.
    pub fn unsubscribe_calls(&self, topic: &str) -> usize {
        self.calls
            .lock()
            .map(|c| c.unsubscribes.get(topic).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Topics published to, in order.
    pub fn published_topics(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|c| c.published.clone())
            .unwrap_or_default()
    }

    /// Make subsequent subscribe calls for `topic` fail.
    pub fn fail_subscribe(&self, topic: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.fail_subscribe.insert(topic.to_string());
        }
    }

    /// Make subsequent unsubscribe calls for `topic` fail.
    pub fn fail_unsubscribe(&self, topic: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.fail_unsubscribe.insert(topic.to_string());
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.fail_subscribe.clear();
            calls.fail_unsubscribe.clear();
        }
    }
}

#[async_trait]
impl PubSub for MemoryPubSub {
    fn local_peer_id(&self) -> &str {
        &self.peer_id
    }

    async fn subscribe(&self, topic: &str) -> Result<(), NetError> {
        {
            let mut calls = self.calls.lock().map_err(|_| NetError::ChannelClosed)?;
            if calls.fail_subscribe.contains(topic) {
                return Err(NetError::Subscribe {
                    topic: topic.to_string(),
                    reason: "injected failure".to_string(),
                });
            }
            *calls.subscribes.entry(topic.to_string()).or_default() += 1;
        }
        let mut state = self.hub.lock()?;
        if let Some(member) = state.members.get_mut(&self.peer_id) {
            member.topics.insert(topic.to_string());
        }
        trace!(peer = %self.peer_id, topic, "Memory subscribe");
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), NetError> {
        {
            let mut calls = self.calls.lock().map_err(|_| NetError::ChannelClosed)?;
            if calls.fail_unsubscribe.contains(topic) {
                return Err(NetError::Unsubscribe {
                    topic: topic.to_string(),
                    reason: "injected failure".to_string(),
                });
            }
            *calls.unsubscribes.entry(topic.to_string()).or_default() += 1;
        }
        let mut state = self.hub.lock()?;
        if let Some(member) = state.members.get_mut(&self.peer_id) {
            member.topics.remove(topic);
        }
        trace!(peer = %self.peer_id, topic, "Memory unsubscribe");
        Ok(())
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), NetError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.published.push(topic.to_string());
        }

        // Collect the inboxes first so no lock is held across an await
        let inboxes: Vec<mpsc::Sender<InboundMessage>> = {
            let state = self.hub.lock()?;
            state
                .members
                .values()
                .filter(|m| m.topics.contains(topic))
                .map(|m| m.inbox.clone())
                .collect()
        };

        debug!(peer = %self.peer_id, topic, receivers = inboxes.len(), "Memory publish");
        for inbox in inboxes {
            let _ = inbox
                .send(InboundMessage {
                    data: data.clone(),
                    from: self.peer_id.clone(),
                    topic: topic.to_string(),
                })
                .await;
        }
        Ok(())
    }
}
