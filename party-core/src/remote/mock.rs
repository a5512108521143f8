//! In-memory [`PlaybackApi`] for unit tests

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{CurrentPlayback, Device, PlaybackApi, RemoteError, RepeatMode, TokenGrant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    CurrentPlayback(String),
    Play,
    Pause,
    Next,
    Previous,
    Seek(u64),
    Volume(u8),
    Shuffle(bool),
    Repeat(RepeatMode),
    Devices,
    Transfer(String, bool),
    AuthCode(String),
    Refresh(String),
}

#[derive(Default)]
pub(crate) struct MockPlayback {
    pub playback: Mutex<Option<CurrentPlayback>>,
    pub fail_playback: Mutex<bool>,
    pub devices: Mutex<Vec<Device>>,
    /// `None` makes the exchange fail
    pub refresh_grant: Mutex<Option<TokenGrant>>,
    pub auth_grant: Mutex<Option<TokenGrant>>,
    pub exchange_delay: Mutex<Option<Duration>>,
    pub calls: Mutex<Vec<Call>>,
}

impl MockPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn playing(track_id: &str, position_ms: u64, is_playing: bool) -> CurrentPlayback {
        CurrentPlayback {
            track_id: track_id.to_string(),
            artist: "Artist".to_string(),
            title: format!("Title of {}", track_id),
            position_ms,
            duration_ms: 240_000,
            is_playing,
        }
    }

    pub fn device(id: &str, is_active: bool) -> Device {
        Device {
            id: id.to_string(),
            name: format!("Device {}", id),
            kind: "Computer".to_string(),
            is_active,
            volume_percent: Some(50),
        }
    }

    pub fn set_playback(&self, playback: Option<CurrentPlayback>) {
        *self.playback.lock() = playback;
    }

    pub fn grant(access: &str, refresh: Option<&str>, expires_in_secs: u64) -> TokenGrant {
        TokenGrant {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_in_secs,
        }
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    async fn delay(&self) {
        let delay = *self.exchange_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PlaybackApi for MockPlayback {
    async fn current_playback(&self, token: &str) -> Result<Option<CurrentPlayback>, RemoteError> {
        self.record(Call::CurrentPlayback(token.to_string()));
        if *self.fail_playback.lock() {
            return Err(RemoteError::Status(500));
        }
        Ok(self.playback.lock().clone())
    }

    async fn play(&self, _token: &str) -> Result<(), RemoteError> {
        self.record(Call::Play);
        Ok(())
    }

    async fn pause(&self, _token: &str) -> Result<(), RemoteError> {
        self.record(Call::Pause);
        Ok(())
    }

    async fn next(&self, _token: &str) -> Result<(), RemoteError> {
        self.record(Call::Next);
        Ok(())
    }

    async fn previous(&self, _token: &str) -> Result<(), RemoteError> {
        self.record(Call::Previous);
        Ok(())
    }

    async fn seek(&self, _token: &str, position_ms: u64) -> Result<(), RemoteError> {
        self.record(Call::Seek(position_ms));
        Ok(())
    }

    async fn set_volume(&self, _token: &str, percent: u8) -> Result<(), RemoteError> {
        self.record(Call::Volume(percent));
        Ok(())
    }

    async fn set_shuffle(&self, _token: &str, enabled: bool) -> Result<(), RemoteError> {
        self.record(Call::Shuffle(enabled));
        Ok(())
    }

    async fn set_repeat(&self, _token: &str, mode: RepeatMode) -> Result<(), RemoteError> {
        self.record(Call::Repeat(mode));
        Ok(())
    }

    async fn devices(&self, _token: &str) -> Result<Vec<Device>, RemoteError> {
        self.record(Call::Devices);
        Ok(self.devices.lock().clone())
    }

    async fn transfer_playback(
        &self,
        _token: &str,
        device_id: &str,
        play: bool,
    ) -> Result<(), RemoteError> {
        self.record(Call::Transfer(device_id.to_string(), play));
        if self.devices.lock().iter().any(|d| d.id == device_id) {
            Ok(())
        } else {
            Err(RemoteError::NoActiveDevice)
        }
    }

    async fn exchange_auth_code(&self, code: &str) -> Result<TokenGrant, RemoteError> {
        self.record(Call::AuthCode(code.to_string()));
        self.delay().await;
        let grant = self.auth_grant.lock().clone();
        grant.ok_or(RemoteError::Status(400))
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, RemoteError> {
        self.record(Call::Refresh(refresh_token.to_string()));
        self.delay().await;
        let grant = self.refresh_grant.lock().clone();
        grant.ok_or_else(|| RemoteError::Transport("connection reset".to_string()))
    }
}
