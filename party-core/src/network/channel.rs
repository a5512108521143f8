//! Peer channel abstraction
//!
//! A named, best-effort group channel: messages may be lost, duplicated or
//! reordered. Transports deliver [`ChannelEvent`]s on an unbounded receiver
//! and accept outbound payloads through [`PeerChannel::send`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("peer channel closed")]
    Closed,

    #[error("failed to set up transport: {0}")]
    Transport(String),
}

/// Events surfaced by a peer channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// We joined the peer group, or a new peer showed up
    Connected,
    /// We're no longer connected to anyone
    Disconnected,
    Message { from: String, payload: Vec<u8> },
}

pub trait PeerChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Queue a payload for every other peer in the group
    fn send(&self, payload: Vec<u8>) -> Result<(), ChannelError>;

    /// Stop the transport; later sends fail with [`ChannelError::Closed`]
    fn close(&self) {}
}
