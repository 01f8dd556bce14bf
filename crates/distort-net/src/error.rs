use thiserror::Error;

/// Errors surfaced by the pub/sub layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetError {
    #[error("Swarm command channel closed")]
    ChannelClosed,

    #[error("Failed to subscribe to {topic}: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("Failed to unsubscribe from {topic}: {reason}")]
    Unsubscribe { topic: String, reason: String },

    #[error("Failed to publish to {topic}: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Failed to dial {address}: {reason}")]
    Dial { address: String, reason: String },
}
