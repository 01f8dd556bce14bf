//! Swarm orchestration with the tokio mpsc command/notification pattern.
//!
//! The swarm event loop runs in a dedicated tokio task. The rest of the node
//! talks to it through [`SwarmHandle`], which implements [`PubSub`] by sending
//! typed commands and awaiting their oneshot replies.

use std::collections::HashSet;

use async_trait::async_trait;
use futures::StreamExt;
use libp2p::{gossipsub, identify, kad, multiaddr::Protocol, swarm::SwarmEvent, Multiaddr, PeerId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use distort_shared::constants::DEFAULT_QUIC_PORT;

use crate::behaviour::DistortEvent;
use crate::error::NetError;
use crate::pubsub::{InboundMessage, PubSub};
use crate::transport::build_swarm;

type Reply = oneshot::Sender<Result<(), NetError>>;

/// Commands sent *into* the swarm task.
#[derive(Debug)]
pub enum SwarmCommand {
    Dial {
        address: Multiaddr,
        reply: Reply,
    },
    Publish {
        topic: String,
        data: Vec<u8>,
        reply: Reply,
    },
    Subscribe {
        topic: String,
        reply: Reply,
    },
    Unsubscribe {
        topic: String,
        reply: Reply,
    },
    Shutdown,
}

/// Configuration for spawning the swarm.
pub struct SwarmConfig {
    /// Port to listen on (defaults to `DEFAULT_QUIC_PORT`).
    pub listen_port: u16,
    /// Peers dialed on startup and added to Kademlia.
    pub bootstrap: Vec<Multiaddr>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_QUIC_PORT,
            bootstrap: Vec::new(),
        }
    }
}

/// Cloneable [`PubSub`] front for the swarm task.
#[derive(Clone)]
pub struct SwarmHandle {
    cmd_tx: mpsc::Sender<SwarmCommand>,
    local_peer_id: String,
}

impl SwarmHandle {
    async fn request(&self, build: impl FnOnce(Reply) -> SwarmCommand) -> Result<(), NetError> {
        let (reply, response) = oneshot::channel();
        self.cmd_tx
            .send(build(reply))
            .await
            .map_err(|_| NetError::ChannelClosed)?;
        response.await.map_err(|_| NetError::ChannelClosed)?
    }

    /// Ask the swarm task to stop. Pending commands are dropped.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(SwarmCommand::Shutdown).await;
    }
}

#[async_trait]
impl PubSub for SwarmHandle {
    fn local_peer_id(&self) -> &str {
        &self.local_peer_id
    }

    async fn subscribe(&self, topic: &str) -> Result<(), NetError> {
        let topic = topic.to_string();
        self.request(|reply| SwarmCommand::Subscribe { topic, reply })
            .await
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), NetError> {
        let topic = topic.to_string();
        self.request(|reply| SwarmCommand::Unsubscribe { topic, reply })
            .await
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), NetError> {
        let topic = topic.to_string();
        self.request(|reply| SwarmCommand::Publish { topic, data, reply })
            .await
    }

    async fn dial(&self, address: &str) -> Result<(), NetError> {
        let parsed: Multiaddr = address.parse().map_err(|e| NetError::Dial {
            address: address.to_string(),
            reason: format!("{e}"),
        })?;
        self.request(|reply| SwarmCommand::Dial {
            address: parsed,
            reply,
        })
        .await
    }
}

/// Spawn the libp2p swarm in a background tokio task.
///
/// Returns the handle used to drive it and the receiver of every gossipsub
/// delivery on subscribed topics.
pub async fn spawn_swarm(
    keypair: libp2p::identity::Keypair,
    config: SwarmConfig,
) -> anyhow::Result<(SwarmHandle, mpsc::Receiver<InboundMessage>)> {
    let mut swarm = build_swarm(keypair)?;
    let local_peer_id = *swarm.local_peer_id();

    let listen_addr_v4: Multiaddr =
        format!("/ip4/0.0.0.0/udp/{}/quic-v1", config.listen_port).parse()?;
    let listen_addr_v6: Multiaddr =
        format!("/ip6/::/udp/{}/quic-v1", config.listen_port).parse()?;
    swarm.listen_on(listen_addr_v4)?;
    swarm.listen_on(listen_addr_v6)?;

    info!(peer_id = %local_peer_id, port = config.listen_port, "Swarm listening");

    for addr in &config.bootstrap {
        if let Err(e) = swarm.dial(addr.clone()) {
            warn!(addr = %addr, error = %e, "Failed to dial bootstrap peer");
            continue;
        }
        if let Some(peer_id) = extract_peer_id(addr) {
            swarm
                .behaviour_mut()
                .kademlia
                .add_address(&peer_id, addr.clone());
        }
        debug!(addr = %addr, "Dialing bootstrap peer");
    }
    if !config.bootstrap.is_empty() {
        if let Err(e) = swarm.behaviour_mut().kademlia.bootstrap() {
            warn!(error = %e, "Kademlia bootstrap failed to start");
        }
    }

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<SwarmCommand>(256);
    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundMessage>(256);
    let local_peer_string = local_peer_id.to_string();

    tokio::spawn(async move {
        // Topics we are subscribed to; own publications on these loop back
        let mut subscribed: HashSet<String> = HashSet::new();

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(SwarmCommand::Dial { address, reply }) => {
                            let result = swarm.dial(address.clone()).map_err(|e| NetError::Dial {
                                address: address.to_string(),
                                reason: e.to_string(),
                            });
                            let _ = reply.send(result);
                        }
                        Some(SwarmCommand::Publish { topic, data, reply }) => {
                            let gossipsub_topic = gossipsub::IdentTopic::new(&topic);
                            let result = match swarm
                                .behaviour_mut()
                                .gossipsub
                                .publish(gossipsub_topic, data.clone())
                            {
                                Ok(_) => Ok(()),
                                Err(gossipsub::PublishError::InsufficientPeers) => {
                                    debug!(topic = %topic, "No peers on topic yet, published locally only");
                                    Ok(())
                                }
                                Err(e) => Err(NetError::Publish {
                                    topic: topic.clone(),
                                    reason: e.to_string(),
                                }),
                            };
                            if result.is_ok() && subscribed.contains(&topic) {
                                let _ = inbound_tx
                                    .send(InboundMessage {
                                        data,
                                        from: local_peer_id.to_string(),
                                        topic,
                                    })
                                    .await;
                            }
                            let _ = reply.send(result);
                        }
                        Some(SwarmCommand::Subscribe { topic, reply }) => {
                            let gossipsub_topic = gossipsub::IdentTopic::new(&topic);
                            let result = swarm
                                .behaviour_mut()
                                .gossipsub
                                .subscribe(&gossipsub_topic)
                                .map(|_| ())
                                .map_err(|e| NetError::Subscribe {
                                    topic: topic.clone(),
                                    reason: e.to_string(),
                                });
                            if result.is_ok() {
                                subscribed.insert(topic);
                            }
                            let _ = reply.send(result);
                        }
                        Some(SwarmCommand::Unsubscribe { topic, reply }) => {
                            let gossipsub_topic = gossipsub::IdentTopic::new(&topic);
                            let result = swarm
                                .behaviour_mut()
                                .gossipsub
                                .unsubscribe(&gossipsub_topic)
                                .map(|_| ())
                                .map_err(|e| NetError::Unsubscribe {
                                    topic: topic.clone(),
                                    reason: e.to_string(),
                                });
                            if result.is_ok() {
                                subscribed.remove(&topic);
                            }
                            let _ = reply.send(result);
                        }
                        Some(SwarmCommand::Shutdown) => {
                            info!("Swarm shutdown requested");
                            break;
                        }
                        None => {
                            info!("Command channel closed, shutting down swarm");
                            break;
                        }
                    }
                }

                event = swarm.select_next_some() => {
                    match event {
                        SwarmEvent::Behaviour(DistortEvent::Gossipsub(
                            gossipsub::Event::Message { message, .. },
                        )) => {
                            let topic = message.topic.to_string();
                            let Some(source) = message.source else {
                                debug!(topic = %topic, "Dropping unsigned gossipsub message");
                                continue;
                            };
                            debug!(
                                topic = %topic,
                                source = %source,
                                len = message.data.len(),
                                "GossipSub message received"
                            );
                            let _ = inbound_tx
                                .send(InboundMessage {
                                    data: message.data,
                                    from: source.to_string(),
                                    topic,
                                })
                                .await;
                        }

                        SwarmEvent::Behaviour(DistortEvent::Kademlia(
                            kad::Event::OutboundQueryProgressed { result, .. },
                        )) => {
                            debug!(result = ?result, "Kademlia query progressed");
                        }

                        SwarmEvent::Behaviour(DistortEvent::Identify(
                            identify::Event::Received { peer_id, info, .. },
                        )) => {
                            debug!(
                                peer = %peer_id,
                                protocol = ?info.protocol_version,
                                "Identify: received info from peer"
                            );
                            for addr in &info.listen_addrs {
                                swarm
                                    .behaviour_mut()
                                    .kademlia
                                    .add_address(&peer_id, addr.clone());
                            }
                        }

                        SwarmEvent::ConnectionEstablished { peer_id, endpoint, .. } => {
                            info!(
                                peer = %peer_id,
                                addr = %endpoint.get_remote_address(),
                                "Peer connected"
                            );
                        }

                        SwarmEvent::ConnectionClosed { peer_id, num_established, .. } => {
                            if num_established == 0 {
                                info!(peer = %peer_id, "Peer disconnected");
                            }
                        }

                        SwarmEvent::NewListenAddr { address, .. } => {
                            info!(addr = %address, "Listening on new address");
                        }

                        SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                            warn!(peer = ?peer_id, error = %error, "Outgoing connection error");
                        }

                        SwarmEvent::IncomingConnectionError { error, .. } => {
                            warn!(error = %error, "Incoming connection error");
                        }

                        _ => {}
                    }
                }
            }
        }

        info!("Swarm event loop terminated");
    });

    let handle = SwarmHandle {
        cmd_tx,
        local_peer_id: local_peer_string,
    };
    Ok((handle, inbound_rx))
}

/// Extract a `PeerId` from a multiaddr, if one is present.
fn extract_peer_id(addr: &Multiaddr) -> Option<PeerId> {
    addr.iter().find_map(|p| {
        if let Protocol::P2p(peer_id) = p {
            Some(peer_id)
        } else {
            None
        }
    })
}
