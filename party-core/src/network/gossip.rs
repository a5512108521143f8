//! libp2p gossip transport
//!
//! Realises the named peer channel as a gossipsub topic with:
//! - mDNS for local network discovery
//! - TCP + noise + yamux transport
//! - identify and ping for connection upkeep

use std::collections::HashSet;
use std::time::Duration;

use futures::StreamExt;
use libp2p::swarm::behaviour::toggle::Toggle;
use libp2p::{
    gossipsub, identify, identity, mdns, noise, ping, swarm::NetworkBehaviour, swarm::SwarmEvent,
    tcp, yamux, Multiaddr, PeerId, Swarm,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::channel::{ChannelError, ChannelEvent, PeerChannel};

/// Gossip transport configuration
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Multiaddr to listen on
    pub listen_addr: String,
    /// Whether to enable mDNS for local network discovery
    pub enable_mdns: bool,
    /// Peers to dial on startup
    pub bootstrap_peers: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "/ip4/0.0.0.0/tcp/0".to_string(),
            enable_mdns: true,
            bootstrap_peers: Vec::new(),
        }
    }
}

#[derive(NetworkBehaviour)]
struct GossipBehaviour {
    ping: ping::Behaviour,
    mdns: Toggle<mdns::tokio::Behaviour>,
    identify: identify::Behaviour,
    gossipsub: gossipsub::Behaviour,
}

#[derive(Debug)]
enum GossipCommand {
    Publish(Vec<u8>),
    Shutdown,
}

/// Handle to the running gossip task
#[derive(Clone)]
pub struct GossipChannel {
    name: String,
    command_tx: mpsc::UnboundedSender<GossipCommand>,
    pub local_peer_id: String,
}

impl PeerChannel for GossipChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, payload: Vec<u8>) -> Result<(), ChannelError> {
        self.command_tx
            .send(GossipCommand::Publish(payload))
            .map_err(|_| ChannelError::Closed)
    }

    fn close(&self) {
        let _ = self.command_tx.send(GossipCommand::Shutdown);
    }
}

/// Owns the swarm; runs in a background task once started
pub struct GossipTransport {
    keypair: identity::Keypair,
    local_peer_id: PeerId,
    config: NetworkConfig,
    topic: gossipsub::IdentTopic,
    /// Peers subscribed to our topic
    topic_peers: HashSet<PeerId>,
}

impl GossipTransport {
    pub fn new(channel: &str, config: NetworkConfig) -> Self {
        let keypair = identity::Keypair::generate_ed25519();
        let local_peer_id = PeerId::from(keypair.public());
        info!("Local peer ID: {}", local_peer_id);

        Self {
            keypair,
            local_peer_id,
            config,
            topic: gossipsub::IdentTopic::new(channel),
            topic_peers: HashSet::new(),
        }
    }

    /// Build the swarm and spawn its event loop on the current tokio runtime
    pub fn start(
        self,
    ) -> Result<(GossipChannel, mpsc::UnboundedReceiver<ChannelEvent>), ChannelError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let listen_addr: Multiaddr = self
            .config
            .listen_addr
            .parse()
            .map_err(|e| ChannelError::Transport(format!("bad listen address: {}", e)))?;
        let mut swarm = self.create_swarm()?;
        swarm
            .listen_on(listen_addr)
            .map_err(|e| ChannelError::Transport(e.to_string()))?;
        swarm
            .behaviour_mut()
            .gossipsub
            .subscribe(&self.topic)
            .map_err(|e| ChannelError::Transport(e.to_string()))?;

        for addr in &self.config.bootstrap_peers {
            match addr.parse::<Multiaddr>() {
                Ok(addr) => {
                    if let Err(e) = swarm.dial(addr.clone()) {
                        warn!("Failed to dial {}: {}", addr, e);
                    }
                }
                Err(e) => warn!("Invalid multiaddr {}: {}", addr, e),
            }
        }

        let channel = GossipChannel {
            name: self.topic.to_string(),
            command_tx,
            local_peer_id: self.local_peer_id.to_string(),
        };

        tokio::spawn(self.run(swarm, event_tx, command_rx));
        Ok((channel, event_rx))
    }

    fn create_swarm(&self) -> Result<Swarm<GossipBehaviour>, ChannelError> {
        let enable_mdns = self.config.enable_mdns;

        let swarm = libp2p::SwarmBuilder::with_existing_identity(self.keypair.clone())
            .with_tokio()
            .with_tcp(
                tcp::Config::default().nodelay(true),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|e| ChannelError::Transport(e.to_string()))?
            .with_behaviour(|keypair| {
                let ping = ping::Behaviour::new(
                    ping::Config::new()
                        .with_interval(Duration::from_secs(15))
                        .with_timeout(Duration::from_secs(20)),
                );

                let mdns = if enable_mdns {
                    Some(
                        mdns::tokio::Behaviour::new(
                            mdns::Config::default(),
                            keypair.public().to_peer_id(),
                        )
                        .map_err(|e| e.to_string())?,
                    )
                } else {
                    None
                };

                // Tuned for small groups
                // Must satisfy: mesh_outbound_min <= mesh_n_low <= mesh_n <= mesh_n_high
                let gossipsub_config = gossipsub::ConfigBuilder::default()
                    .heartbeat_interval(Duration::from_secs(1))
                    .validation_mode(gossipsub::ValidationMode::Strict)
                    .mesh_outbound_min(0)
                    .mesh_n_low(1)
                    .mesh_n(3)
                    .mesh_n_high(6)
                    .gossip_lazy(3)
                    .build()
                    .map_err(|e| e.to_string())?;

                let gossipsub = gossipsub::Behaviour::new(
                    gossipsub::MessageAuthenticity::Signed(keypair.clone()),
                    gossipsub_config,
                )
                .map_err(|e| e.to_string())?;

                let identify = identify::Behaviour::new(identify::Config::new(
                    "/listening-party/1.0.0".into(),
                    keypair.public(),
                ));

                Ok(GossipBehaviour {
                    ping,
                    mdns: Toggle::from(mdns),
                    identify,
                    gossipsub,
                })
            })
            .map_err(|e| ChannelError::Transport(e.to_string()))?
            .with_swarm_config(|c| c.with_idle_connection_timeout(Duration::from_secs(60)))
            .build();

        Ok(swarm)
    }

    async fn run(
        mut self,
        mut swarm: Swarm<GossipBehaviour>,
        event_tx: mpsc::UnboundedSender<ChannelEvent>,
        mut command_rx: mpsc::UnboundedReceiver<GossipCommand>,
    ) {
        loop {
            tokio::select! {
                event = swarm.select_next_some() => {
                    self.handle_swarm_event(&mut swarm, event, &event_tx);
                }
                cmd = command_rx.recv() => match cmd {
                    Some(GossipCommand::Publish(payload)) => {
                        if let Err(e) = swarm
                            .behaviour_mut()
                            .gossipsub
                            .publish(self.topic.clone(), payload)
                        {
                            debug!("Publish error (may be no peers yet): {}", e);
                        }
                    }
                    Some(GossipCommand::Shutdown) | None => {
                        info!("Gossip transport shutting down");
                        let _ = swarm.behaviour_mut().gossipsub.unsubscribe(&self.topic);
                        if !self.topic_peers.is_empty() {
                            let _ = event_tx.send(ChannelEvent::Disconnected);
                        }
                        break;
                    }
                }
            }
        }
    }

    fn peer_left(&mut self, peer_id: &PeerId, event_tx: &mpsc::UnboundedSender<ChannelEvent>) {
        if self.topic_peers.remove(peer_id) && self.topic_peers.is_empty() {
            info!("Last peer left {}", self.topic);
            let _ = event_tx.send(ChannelEvent::Disconnected);
        }
    }

    fn handle_swarm_event(
        &mut self,
        swarm: &mut Swarm<GossipBehaviour>,
        event: SwarmEvent<GossipBehaviourEvent>,
        event_tx: &mpsc::UnboundedSender<ChannelEvent>,
    ) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                info!("Listening on {}/p2p/{}", address, self.local_peer_id);
            }

            SwarmEvent::Behaviour(GossipBehaviourEvent::Mdns(mdns::Event::Discovered(peers))) => {
                for (peer_id, addr) in peers {
                    if peer_id != self.local_peer_id {
                        info!("mDNS discovered peer: {} at {}", peer_id, addr);
                        swarm.behaviour_mut().gossipsub.add_explicit_peer(&peer_id);
                        if swarm.dial(addr).is_ok() {
                            debug!("Dialing discovered peer {}", peer_id);
                        }
                    }
                }
            }

            SwarmEvent::Behaviour(GossipBehaviourEvent::Mdns(mdns::Event::Expired(peers))) => {
                for (peer_id, _) in peers {
                    debug!("mDNS peer expired: {}", peer_id);
                }
            }

            SwarmEvent::Behaviour(GossipBehaviourEvent::Gossipsub(gossipsub::Event::Message {
                propagation_source,
                message,
                ..
            })) => {
                let from = message.source.unwrap_or(propagation_source);
                debug!("Received {} bytes from {}", message.data.len(), from);
                let _ = event_tx.send(ChannelEvent::Message {
                    from: from.to_string(),
                    payload: message.data,
                });
            }

            SwarmEvent::Behaviour(GossipBehaviourEvent::Gossipsub(
                gossipsub::Event::Subscribed { peer_id, topic },
            )) => {
                if topic == self.topic.hash() && self.topic_peers.insert(peer_id) {
                    info!("Peer {} joined {}", peer_id, self.topic);
                    let _ = event_tx.send(ChannelEvent::Connected);
                }
            }

            SwarmEvent::Behaviour(GossipBehaviourEvent::Gossipsub(
                gossipsub::Event::Unsubscribed { peer_id, topic },
            )) => {
                if topic == self.topic.hash() {
                    self.peer_left(&peer_id, event_tx);
                }
            }

            SwarmEvent::Behaviour(GossipBehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                debug!("Identified peer {} running {}", peer_id, info.protocol_version);
            }

            SwarmEvent::ConnectionEstablished { peer_id, endpoint, .. } => {
                debug!("Connection established with {} via {:?}", peer_id, endpoint);
                swarm.behaviour_mut().gossipsub.add_explicit_peer(&peer_id);
            }

            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                ..
            } => {
                debug!("Connection closed with {}", peer_id);
                if num_established == 0 {
                    self.peer_left(&peer_id, event_tx);
                }
            }

            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                if let Some(peer) = peer_id {
                    warn!("Failed to connect to {}: {}", peer, error);
                } else {
                    warn!("Outgoing connection error: {}", error);
                }
            }

            SwarmEvent::ListenerError { listener_id, error } => {
                warn!("Listener {:?} error: {}", listener_id, error);
            }

            _ => {}
        }
    }
}
