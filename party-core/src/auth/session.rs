//! Session and token lifecycle
//!
//! [`SessionManager`] owns the access/refresh token pair for the active user
//! and gates every outbound call to the playback service on a valid token.
//! Public operations never fail loudly: problems are logged and surface as
//! `false` / `None` with the session left as it was.

use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::profile::ProfileStore;
use crate::clock::Clock;
use crate::remote::{CurrentPlayback, Device, PlaybackApi, PlaybackControl, RemoteError, RepeatMode};

/// Errors raised inside the session lifecycle
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("no refresh token available")]
    MissingRefreshToken,

    #[error("session changed while the request was in flight")]
    Superseded,

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Token pair for the active user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at_ms: u64,
}

impl Session {
    fn has_tokens(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }
}

#[derive(Debug, Default)]
struct SessionState {
    session: Option<Session>,
    /// Bumped whenever the session is replaced or cleared
    generation: u64,
}

pub struct SessionManager {
    api: Arc<dyn PlaybackApi>,
    profiles: Arc<dyn ProfileStore>,
    clock: Arc<dyn Clock>,
    state: RwLock<SessionState>,
    /// Serializes refreshes started from `ensure_valid`
    refresh_gate: tokio::sync::Mutex<()>,
}

impl SessionManager {
    pub fn new(
        api: Arc<dyn PlaybackApi>,
        profiles: Arc<dyn ProfileStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            api,
            profiles,
            clock,
            state: RwLock::new(SessionState::default()),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Load whatever tokens the profile store kept from last time
    pub fn restore(&self) -> bool {
        let Some(tokens) = self.profiles.stored_tokens() else {
            debug!("No stored tokens to restore");
            return false;
        };

        let mut state = self.state.write();
        state.session = Some(Session {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at_ms: tokens.expires_at_ms,
        });
        state.generation += 1;
        info!("Restored session (expires at {})", tokens.expires_at_ms);
        true
    }

    /// Install a token pair and persist it
    pub fn set_tokens(&self, access_token: &str, refresh_token: &str, expires_at_ms: u64) {
        {
            let mut state = self.state.write();
            state.session = Some(Session {
                access_token: access_token.to_string(),
                refresh_token: refresh_token.to_string(),
                expires_at_ms,
            });
            state.generation += 1;
        }
        self.profiles
            .persist_tokens(access_token, refresh_token, expires_at_ms);
    }

    /// Forget the session. In-flight exchanges started before this are discarded.
    pub fn clear(&self) {
        let mut state = self.state.write();
        if state.session.take().is_some() {
            info!("Session cleared");
        }
        state.generation += 1;
    }

    pub fn session(&self) -> Option<Session> {
        self.state.read().session.clone()
    }

    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Both tokens present and non-empty
    pub fn is_authenticated(&self) -> bool {
        self.state
            .read()
            .session
            .as_ref()
            .is_some_and(Session::has_tokens)
    }

    /// No session, or the access token's lifetime is over
    pub fn is_expired(&self) -> bool {
        let now = self.clock.now_ms();
        match &self.state.read().session {
            Some(session) => now >= session.expires_at_ms,
            None => true,
        }
    }

    /// Make sure a usable access token exists, refreshing if needed
    ///
    /// Concurrent callers that find the token expired queue behind a single
    /// refresh; whoever comes second re-checks and returns without another
    /// exchange.
    pub async fn ensure_valid(&self) -> bool {
        if !self.is_expired() {
            return true;
        }

        let _gate = self.refresh_gate.lock().await;
        if !self.is_expired() {
            debug!("Token was refreshed by a concurrent caller");
            return true;
        }

        self.refresh().await
    }

    /// Exchange the refresh token for a new access token
    pub async fn refresh(&self) -> bool {
        match self.try_refresh().await {
            Ok(expires_at_ms) => {
                info!("Access token refreshed (expires at {})", expires_at_ms);
                true
            }
            Err(e) => {
                warn!("Token refresh failed: {}", e);
                false
            }
        }
    }

    async fn try_refresh(&self) -> Result<u64, AuthError> {
        let (refresh_token, generation) = {
            let state = self.state.read();
            let session = state.session.as_ref().ok_or(AuthError::NotAuthenticated)?;
            if session.refresh_token.is_empty() {
                return Err(AuthError::MissingRefreshToken);
            }
            (session.refresh_token.clone(), state.generation)
        };

        let grant = self.api.exchange_refresh_token(&refresh_token).await?;
        if grant.access_token.is_empty() {
            return Err(RemoteError::Malformed("empty access token".to_string()).into());
        }
        let expires_at_ms = self.expires_at(grant.expires_in_secs);

        let updated = {
            let mut state = self.state.write();
            if state.generation != generation {
                return Err(AuthError::Superseded);
            }
            let session = state.session.as_mut().ok_or(AuthError::Superseded)?;
            session.access_token = grant.access_token;
            if let Some(rotated) = grant.refresh_token {
                session.refresh_token = rotated;
            }
            session.expires_at_ms = expires_at_ms;
            session.clone()
        };

        self.profiles.persist_tokens(
            &updated.access_token,
            &updated.refresh_token,
            updated.expires_at_ms,
        );
        Ok(expires_at_ms)
    }

    /// Absolute expiry for a grant lifetime, clamped rather than overflowing
    fn expires_at(&self, expires_in_secs: u64) -> u64 {
        self.clock
            .now_ms()
            .saturating_add(expires_in_secs.saturating_mul(1000))
    }

    /// Exchange a one-time authorization code for a fresh token pair
    pub async fn authenticate(&self, code: &str) -> bool {
        match self.try_authenticate(code).await {
            Ok(()) => {
                info!("Authenticated");
                true
            }
            Err(e) => {
                warn!("Authentication failed: {}", e);
                false
            }
        }
    }

    async fn try_authenticate(&self, code: &str) -> Result<(), AuthError> {
        let generation = self.generation();
        let grant = self.api.exchange_auth_code(code).await?;

        let refresh_token = grant
            .refresh_token
            .ok_or(AuthError::MissingRefreshToken)?;
        if grant.access_token.is_empty() {
            return Err(RemoteError::Malformed("empty access token".to_string()).into());
        }
        let expires_at_ms = self.expires_at(grant.expires_in_secs);

        {
            let mut state = self.state.write();
            if state.generation != generation {
                return Err(AuthError::Superseded);
            }
            state.session = Some(Session {
                access_token: grant.access_token.clone(),
                refresh_token: refresh_token.clone(),
                expires_at_ms,
            });
            state.generation += 1;
        }

        self.profiles
            .persist_tokens(&grant.access_token, &refresh_token, expires_at_ms);
        Ok(())
    }

    /// Valid access token, refreshed first if necessary
    async fn access_token(&self) -> Option<String> {
        if !self.ensure_valid().await {
            return None;
        }
        self.state
            .read()
            .session
            .as_ref()
            .map(|s| s.access_token.clone())
            .filter(|t| !t.is_empty())
    }

    /// What the local player is doing, `None` on any failure or when idle
    pub async fn current_playback(&self) -> Option<CurrentPlayback> {
        let token = self.access_token().await?;
        match self.api.current_playback(&token).await {
            Ok(playback) => playback,
            Err(e) => {
                warn!("Failed to fetch current playback: {}", e);
                None
            }
        }
    }

    /// Issue a playback command, `false` if it could not be delivered
    pub async fn control(&self, action: PlaybackControl) -> bool {
        let Some(token) = self.access_token().await else {
            debug!("Skipping {}: no valid session", action.name());
            return false;
        };
        match self.api.control(&token, action).await {
            Ok(()) => true,
            Err(e) => {
                warn!("{} failed: {}", action.name(), e);
                false
            }
        }
    }

    pub async fn play(&self) -> bool {
        self.control(PlaybackControl::Play).await
    }

    pub async fn pause(&self) -> bool {
        self.control(PlaybackControl::Pause).await
    }

    pub async fn next(&self) -> bool {
        self.control(PlaybackControl::Next).await
    }

    pub async fn previous(&self) -> bool {
        self.control(PlaybackControl::Previous).await
    }

    pub async fn seek(&self, position_ms: u64) -> bool {
        self.control(PlaybackControl::Seek(position_ms)).await
    }

    pub async fn set_volume(&self, percent: u8) -> bool {
        self.control(PlaybackControl::Volume(percent.min(100))).await
    }

    pub async fn set_shuffle(&self, enabled: bool) -> bool {
        self.control(PlaybackControl::Shuffle(enabled)).await
    }

    pub async fn set_repeat(&self, mode: RepeatMode) -> bool {
        self.control(PlaybackControl::Repeat(mode)).await
    }

    /// Players on the account, `None` on any failure
    pub async fn devices(&self) -> Option<Vec<Device>> {
        let token = self.access_token().await?;
        match self.api.devices(&token).await {
            Ok(devices) => Some(devices),
            Err(e) => {
                warn!("Failed to list devices: {}", e);
                None
            }
        }
    }

    /// Route playback to `device_id`, `false` if the service refused
    pub async fn transfer_playback(&self, device_id: &str, play: bool) -> bool {
        let Some(token) = self.access_token().await else {
            debug!("Skipping transfer: no valid session");
            return false;
        };
        match self.api.transfer_playback(&token, device_id, play).await {
            Ok(()) => {
                info!("Playback transferred to {}", device_id);
                true
            }
            Err(e) => {
                warn!("Transfer to {} failed: {}", device_id, e);
                false
            }
        }
    }

    /// Make sure some device can receive commands.
    ///
    /// Without an active device every player command fails, so a member
    /// could never be brought in line with the host. If none is active,
    /// playback is moved (paused) to the first device listed.
    pub async fn ensure_active_device(&self) -> bool {
        let Some(devices) = self.devices().await else {
            return false;
        };
        if devices.iter().any(|d| d.is_active) {
            return true;
        }
        match devices.first() {
            Some(device) => self.transfer_playback(&device.id, false).await,
            None => {
                warn!("No playback devices available");
                false
            }
        }
    }
}
