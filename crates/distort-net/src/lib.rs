// Pub/sub networking layer: libp2p gossipsub over QUIC, an in-memory hub for
// tests, and reference-counted topic subscriptions.

pub mod behaviour;
pub mod discovery;
pub mod error;
pub mod memory;
pub mod pubsub;
pub mod subscriptions;
pub mod swarm;
pub mod transport;

pub use behaviour::{DistortBehaviour, DistortEvent};
pub use discovery::{choose_redials, load_bootstrap_peers, parse_multiaddrs};
pub use error::NetError;
pub use memory::{MemoryHub, MemoryPubSub};
pub use pubsub::{InboundMessage, PubSub};
pub use subscriptions::SubscriptionManager;
pub use swarm::{spawn_swarm, SwarmCommand, SwarmConfig, SwarmHandle};
pub use transport::build_swarm;
