//! # distort-node
//!
//! Protocol engine of a distort node: accounts and their groups, certificate
//! announcements, fixed-size message rounds along random group-tree paths and
//! the dispatch of inbound pub/sub deliveries. The binary wires it to a libp2p
//! swarm; tests wire it to the in-memory hub.

pub mod accounts;
pub mod certificates;
pub mod config;
pub mod error;
pub mod identity;
pub mod messaging;
pub mod node;

pub use accounts::Recipient;
pub use certificates::CertificateOutcome;
pub use config::NodeConfig;
pub use error::NodeError;
pub use messaging::{DequeueOutcome, MessageOutcome};
pub use node::{InboundOutcome, Node, NodeSettings};
