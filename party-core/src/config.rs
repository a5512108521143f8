//! Runtime configuration
//!
//! Plain structs with sensible defaults. Loading them from disk is left to the
//! embedding application.

use crate::network::NetworkConfig;

/// Name of the peer broadcast channel (also the gossip topic)
pub const CHANNEL_NAME: &str = "spotifymod";

/// Minimum time between two member syncs
pub const SYNC_INTERVAL_MS: u64 = 1000;

/// Maximum position drift (in ms) tolerated before a correction is flagged
pub const DRIFT_THRESHOLD_MS: u64 = 3000;

/// Interval between periodic track broadcasts
pub const BROADCAST_INTERVAL_MS: u64 = 5000;

/// Peer snapshots older than this are treated as gone
pub const STALE_AFTER_MS: u64 = 15_000;

/// Party capacity, host included
pub const MAX_MEMBERS: usize = 10;

/// Default Spotify OAuth redirect
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8888/callback";

/// Spotify Web API base URL
pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";

/// Spotify accounts service base URL
pub const DEFAULT_ACCOUNTS_BASE: &str = "https://accounts.spotify.com";

/// Scopes requested during authorization
pub const DEFAULT_SCOPES: &[&str] = &[
    "user-read-playback-state",
    "user-modify-playback-state",
    "user-read-currently-playing",
    "playlist-read-private",
    "playlist-read-collaborative",
];

/// What a member does once drift exceeds the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriftCorrection {
    /// Log and report the drift, leave playback alone
    #[default]
    ReportOnly,
    /// Seek local playback to the host's estimated position
    Seek,
}

/// Member sync settings
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub sync_interval_ms: u64,
    pub drift_threshold_ms: u64,
    pub drift_correction: DriftCorrection,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval_ms: SYNC_INTERVAL_MS,
            drift_threshold_ms: DRIFT_THRESHOLD_MS,
            drift_correction: DriftCorrection::default(),
        }
    }
}

/// Peer broadcast settings
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub channel: String,
    pub broadcast_interval_ms: u64,
    pub stale_after_ms: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            channel: CHANNEL_NAME.to_string(),
            broadcast_interval_ms: BROADCAST_INTERVAL_MS,
            stale_after_ms: STALE_AFTER_MS,
        }
    }
}

/// Party directory settings
#[derive(Debug, Clone)]
pub struct PartyConfig {
    pub max_members: usize,
    /// How many fresh codes to draw before giving up on a collision streak
    pub code_attempts: usize,
}

impl Default for PartyConfig {
    fn default() -> Self {
        Self {
            max_members: MAX_MEMBERS,
            code_attempts: 8,
        }
    }
}

/// Spotify application credentials and endpoints
#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub api_base: String,
    pub accounts_base: String,
    pub scopes: Vec<String>,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            accounts_base: DEFAULT_ACCOUNTS_BASE.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SpotifyConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            ..Self::default()
        }
    }

    /// Both credentials are present
    pub fn is_valid(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }
}

/// Everything the [`crate::PartyHub`] needs
#[derive(Debug, Clone, Default)]
pub struct CoreConfig {
    pub sync: SyncConfig,
    pub broadcast: BroadcastConfig,
    pub party: PartyConfig,
    pub spotify: SpotifyConfig,
    pub network: NetworkConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.sync.sync_interval_ms, 1000);
        assert_eq!(config.sync.drift_threshold_ms, 3000);
        assert_eq!(config.sync.drift_correction, DriftCorrection::ReportOnly);
        assert_eq!(config.broadcast.channel, "spotifymod");
        assert_eq!(config.broadcast.broadcast_interval_ms, 5000);
        assert_eq!(config.broadcast.stale_after_ms, 15_000);
        assert_eq!(config.party.max_members, 10);
        assert_eq!(config.spotify.redirect_uri, "http://127.0.0.1:8888/callback");
    }

    #[test]
    fn test_spotify_credentials_validity() {
        assert!(!SpotifyConfig::default().is_valid());
        assert!(!SpotifyConfig::new("id", "  ").is_valid());
        assert!(SpotifyConfig::new("id", "secret").is_valid());
    }
}
