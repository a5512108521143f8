//! Peer broadcast protocol
//!
//! Binary now-playing messages exchanged over the peer channel, and the cache
//! of what everyone else is listening to.

mod cache;
mod handler;
mod protocol;

pub use cache::{PeerCache, PeerSnapshot};
pub use handler::PeerBroadcaster;
pub use protocol::{
    PeerMessage, ProtocolError, TrackUpdate, MAX_STRING_BYTES, TAG_HANDSHAKE, TAG_TRACK_UPDATE,
};
