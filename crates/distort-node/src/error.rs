use thiserror::Error;

use distort_net::NetError;
use distort_shared::error::{
    CryptoError, GroupTreeError, IdentityError, ProtocolError, TopicError,
};
use distort_store::StoreError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transport error: {0}")]
    Net(#[from] NetError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Topic error: {0}")]
    Topic(#[from] TopicError),

    #[error("Group tree error: {0}")]
    GroupTree(#[from] GroupTreeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Received message on {topic} but account {account} has no such group")]
    NoMatchingGroup { topic: String, account: String },

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Invalid account name: {0:?}")]
    InvalidAccountName(String),

    #[error("The root account cannot be disabled")]
    RootAccountRequired,

    #[error("Account {account} is not a member of group {group}")]
    NotAMember { account: String, group: String },

    #[error("Subgroup index {0} is outside the group tree")]
    InvalidSubgroup(u32),

    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    #[error("No valid certificate for {0}")]
    NoValidCertificate(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl NodeError {
    /// Decode and crypto failures expected from ordinary cover traffic.
    pub fn is_routine(&self) -> bool {
        matches!(
            self,
            NodeError::Protocol(_)
                | NodeError::Crypto(CryptoError::DecryptionFailed)
                | NodeError::Crypto(CryptoError::InvalidEncoding(_))
                | NodeError::Identity(IdentityError::InvalidSignature)
        )
    }
}
