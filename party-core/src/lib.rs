//! Listening Party - Core Library
//!
//! Shared Spotify listening sessions: one host's playback is mirrored to the
//! members of a party, and peers swap now-playing snapshots over a
//! best-effort broadcast channel.

pub mod auth;
pub mod broadcast;
pub mod clock;
pub mod commands;
pub mod config;
pub mod hub;
pub mod logging;
pub mod network;
pub mod party;
pub mod remote;
pub mod spotify;
pub mod sync;

// Re-exports for convenience
pub use auth::{Identity, MemoryProfileStore, ProfileStore, SessionManager};
pub use broadcast::{PeerBroadcaster, PeerCache, PeerMessage, PeerSnapshot, TrackUpdate};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CoreConfig;
pub use hub::{ChannelSource, HubDeps, HubError, PartyHub};
pub use party::{Party, PartyCode, PartyManager, PartyRegistry};
pub use remote::{
    CurrentPlayback, Device, PlaybackApi, PlaybackControl, RemoteError, RepeatMode, TokenGrant,
};
pub use spotify::SpotifyClient;
pub use sync::{SyncEngine, SyncReport};
