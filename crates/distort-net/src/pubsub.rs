//! Transport seam consumed by the protocol engine.

use async_trait::async_trait;

use crate::error::NetError;

/// A pub/sub delivery handed to the node's dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub data: Vec<u8>,
    /// Peer ID of the publishing node
    pub from: String,
    pub topic: String,
}

/// Topic-keyed publish/subscribe primitives.
///
/// Deliveries for subscribed topics arrive on the receiver returned alongside
/// the implementation, including the node's own publications.
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Transport identity of this node
    fn local_peer_id(&self) -> &str;

    async fn subscribe(&self, topic: &str) -> Result<(), NetError>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), NetError>;

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), NetError>;

    /// Connect to a remote node. Transports without addressing ignore this.
    async fn dial(&self, _address: &str) -> Result<(), NetError> {
        Ok(())
    }
}
