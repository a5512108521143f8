//! Remote playback control
//!
//! The music service is reached through [`PlaybackApi`]. Every call is keyed
//! by a bearer token; callers go through [`crate::auth::SessionManager`],
//! which makes sure that token is valid first.

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use thiserror::Error;

/// What the local player is doing right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentPlayback {
    /// Opaque track reference (URI or id)
    pub track_id: String,
    pub artist: String,
    pub title: String,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub is_playing: bool,
}

/// Result of an authorization-code or refresh-token exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Only sometimes rotated on refresh
    pub refresh_token: Option<String>,
    pub expires_in_secs: u64,
}

/// A player the account can route playback to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub name: String,
    /// "Computer", "Smartphone", "Speaker", ...
    pub kind: String,
    pub is_active: bool,
    /// Absent for devices that do not expose volume
    pub volume_percent: Option<u8>,
}

/// Repeat setting of the player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatMode {
    Off,
    Track,
    Context,
}

impl RepeatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::Off => "off",
            RepeatMode::Track => "track",
            RepeatMode::Context => "context",
        }
    }
}

/// Errors that can occur when talking to the music service
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("access token rejected")]
    Unauthorized,

    #[error("no active playback device")]
    NoActiveDevice,

    #[error("unexpected response (HTTP {0})")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Simple playback commands that carry no response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackControl {
    Play,
    Pause,
    Next,
    Previous,
    Seek(u64),
    /// Percent, clamped to 100 by the service
    Volume(u8),
    Shuffle(bool),
    Repeat(RepeatMode),
}

impl PlaybackControl {
    pub fn name(&self) -> &'static str {
        match self {
            PlaybackControl::Play => "play",
            PlaybackControl::Pause => "pause",
            PlaybackControl::Next => "next",
            PlaybackControl::Previous => "previous",
            PlaybackControl::Seek(_) => "seek",
            PlaybackControl::Volume(_) => "volume",
            PlaybackControl::Shuffle(_) => "shuffle",
            PlaybackControl::Repeat(_) => "repeat",
        }
    }
}

/// Async client for the remote music-control API
#[async_trait]
pub trait PlaybackApi: Send + Sync {
    /// `Ok(None)` when nothing is playing
    async fn current_playback(&self, token: &str) -> Result<Option<CurrentPlayback>, RemoteError>;

    async fn play(&self, token: &str) -> Result<(), RemoteError>;

    async fn pause(&self, token: &str) -> Result<(), RemoteError>;

    async fn next(&self, token: &str) -> Result<(), RemoteError>;

    async fn previous(&self, token: &str) -> Result<(), RemoteError>;

    async fn seek(&self, token: &str, position_ms: u64) -> Result<(), RemoteError>;

    async fn set_volume(&self, token: &str, percent: u8) -> Result<(), RemoteError>;

    async fn set_shuffle(&self, token: &str, enabled: bool) -> Result<(), RemoteError>;

    async fn set_repeat(&self, token: &str, mode: RepeatMode) -> Result<(), RemoteError>;

    /// Players available to the account, active or not
    async fn devices(&self, token: &str) -> Result<Vec<Device>, RemoteError>;

    /// Move playback to `device_id`, starting it when `play` is set
    async fn transfer_playback(
        &self,
        token: &str,
        device_id: &str,
        play: bool,
    ) -> Result<(), RemoteError>;

    async fn exchange_auth_code(&self, code: &str) -> Result<TokenGrant, RemoteError>;

    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, RemoteError>;

    /// Dispatch a [`PlaybackControl`] to the matching method
    async fn control(&self, token: &str, action: PlaybackControl) -> Result<(), RemoteError> {
        match action {
            PlaybackControl::Play => self.play(token).await,
            PlaybackControl::Pause => self.pause(token).await,
            PlaybackControl::Next => self.next(token).await,
            PlaybackControl::Previous => self.previous(token).await,
            PlaybackControl::Seek(position_ms) => self.seek(token, position_ms).await,
            PlaybackControl::Volume(percent) => self.set_volume(token, percent).await,
            PlaybackControl::Shuffle(enabled) => self.set_shuffle(token, enabled).await,
            PlaybackControl::Repeat(mode) => self.set_repeat(token, mode).await,
        }
    }
}
