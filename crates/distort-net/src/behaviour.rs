//! Composed libp2p `NetworkBehaviour` for distort nodes.
//!
//! GossipSub carries message and certificate topics, Kademlia finds peers
//! beyond the bootstrap list, and Identify feeds observed addresses back
//! into Kademlia.

use libp2p::{
    gossipsub, identify,
    kad::{self, store::MemoryStore},
    swarm::NetworkBehaviour,
};

/// Network behaviour driven by the single swarm event loop.
/// Built by [`super::transport::build_swarm`].
#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "DistortEvent")]
pub struct DistortBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub kademlia: kad::Behaviour<MemoryStore>,
    pub identify: identify::Behaviour,
}

#[derive(Debug)]
pub enum DistortEvent {
    Gossipsub(gossipsub::Event),
    Kademlia(kad::Event),
    Identify(identify::Event),
}

impl From<gossipsub::Event> for DistortEvent {
    fn from(event: gossipsub::Event) -> Self {
        DistortEvent::Gossipsub(event)
    }
}

impl From<kad::Event> for DistortEvent {
    fn from(event: kad::Event) -> Self {
        DistortEvent::Kademlia(event)
    }
}

impl From<identify::Event> for DistortEvent {
    fn from(event: identify::Event) -> Self {
        DistortEvent::Identify(event)
    }
}
