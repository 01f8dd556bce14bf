//! Reference-counted topic subscriptions.
//!
//! Several local accounts can belong to the same `(group, subgroup)` pair.
//! The transport sees one subscription per topic string no matter how many
//! accounts need it; the real subscribe happens on the 0 -> 1 transition and
//! the real unsubscribe on 1 -> 0.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use distort_shared::topics::{cert_topic, message_topic, TopicKind};

use crate::error::NetError;
use crate::pubsub::PubSub;

#[derive(Debug, Clone, Copy)]
struct TopicRef {
    count: usize,
    kind: TopicKind,
}

pub struct SubscriptionManager {
    transport: Arc<dyn PubSub>,
    // Held across transport calls so concurrent callers observe a count that
    // always matches what the transport has actually been told.
    topics: Mutex<HashMap<String, TopicRef>>,
}

impl SubscriptionManager {
    pub fn new(transport: Arc<dyn PubSub>) -> Self {
        Self {
            transport,
            topics: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to the message topic of `(group, index)` and the group's
    /// certificate topic.
    ///
    /// If the certificate topic fails, the message topic reference taken by
    /// this call is released again, so counts never outrun the transport.
    pub async fn subscribe(&self, group: &str, index: u32) -> Result<(), NetError> {
        let message = message_topic(group, index);
        let certs = cert_topic(group);

        let mut topics = self.topics.lock().await;
        self.acquire(&mut topics, &message, TopicKind::Message).await?;
        if let Err(e) = self.acquire(&mut topics, &certs, TopicKind::Certificate).await {
            if let Err(rollback) = self.release(&mut topics, &message).await {
                warn!(topic = %message, error = %rollback, "Rollback of message topic failed");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Drop one reference to each topic of `(group, index)`.
    ///
    /// Either both references are dropped or neither is, so a failed call can
    /// be retried without releasing anything twice.
    pub async fn unsubscribe(&self, group: &str, index: u32) -> Result<(), NetError> {
        let message = message_topic(group, index);
        let certs = cert_topic(group);

        let mut topics = self.topics.lock().await;
        self.release(&mut topics, &message).await?;
        if let Err(e) = self.release(&mut topics, &certs).await {
            if let Err(rollback) = self.acquire(&mut topics, &message, TopicKind::Message).await {
                warn!(topic = %message, error = %rollback, "Rollback of message topic release failed");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Handler a delivery on `topic` should be routed to, if we hold it.
    pub async fn handler_for(&self, topic: &str) -> Option<TopicKind> {
        self.topics.lock().await.get(topic).map(|r| r.kind)
    }

    pub async fn ref_count(&self, topic: &str) -> usize {
        self.topics.lock().await.get(topic).map_or(0, |r| r.count)
    }

    /// Currently held topics, sorted.
    pub async fn topics(&self) -> Vec<String> {
        let mut list: Vec<String> = self.topics.lock().await.keys().cloned().collect();
        list.sort();
        list
    }

    /// Returns the count after the increment.
    async fn acquire(
        &self,
        topics: &mut HashMap<String, TopicRef>,
        topic: &str,
        kind: TopicKind,
    ) -> Result<usize, NetError> {
        if let Some(entry) = topics.get_mut(topic) {
            entry.count += 1;
            return Ok(entry.count);
        }

        self.transport.subscribe(topic).await?;
        topics.insert(topic.to_string(), TopicRef { count: 1, kind });
        debug!(topic, "Subscribed");
        Ok(1)
    }

    /// Returns the count after the decrement. Unknown topics are a no-op.
    async fn release(
        &self,
        topics: &mut HashMap<String, TopicRef>,
        topic: &str,
    ) -> Result<usize, NetError> {
        let Some(entry) = topics.get_mut(topic) else {
            return Ok(0);
        };
        if entry.count > 1 {
            entry.count -= 1;
            return Ok(entry.count);
        }

        // Last reference: keep the entry if the transport refuses
        self.transport.unsubscribe(topic).await?;
        topics.remove(topic);
        debug!(topic, "Unsubscribed");
        Ok(0)
    }
}
