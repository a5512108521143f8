//! Peer broadcast channel
//!
//! The channel abstraction plus two transports: libp2p gossipsub for real
//! networks and an in-process loopback group.

mod channel;
mod gossip;
mod memory;

pub use channel::{ChannelError, ChannelEvent, PeerChannel};
pub use gossip::{GossipChannel, GossipTransport, NetworkConfig};
pub use memory::{LoopbackChannel, LoopbackGroup};
