//! Spotify Web API HTTP client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use tracing::{debug, instrument, warn};

use super::types::{CurrentlyPlayingResponse, DevicesResponse, TokenResponse};
use crate::config::SpotifyConfig;
use crate::remote::{CurrentPlayback, Device, PlaybackApi, RemoteError, RepeatMode, TokenGrant};

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RemoteError::Transport("request timed out".to_string())
        } else if e.is_connect() {
            RemoteError::Transport(format!("connection refused ({})", e))
        } else if e.is_decode() {
            RemoteError::Malformed(e.to_string())
        } else {
            RemoteError::Transport(e.to_string())
        }
    }
}

/// Map a player endpoint status onto the error model
fn check_status(status: StatusCode) -> Result<(), RemoteError> {
    match status.as_u16() {
        200..=299 => Ok(()),
        401 | 403 => Err(RemoteError::Unauthorized),
        404 => Err(RemoteError::NoActiveDevice),
        other => Err(RemoteError::Status(other)),
    }
}

/// Client for the Spotify player and accounts endpoints
#[derive(Debug, Clone)]
pub struct SpotifyClient {
    http: Client,
    config: SpotifyConfig,
}

impl SpotifyClient {
    pub fn new(config: SpotifyConfig) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .connect_timeout(CONNECTION_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &SpotifyConfig {
        &self.config
    }

    /// URL the user opens in a browser to grant access
    pub fn authorize_url(&self) -> Result<String, RemoteError> {
        let scopes = self.config.scopes.join(" ");
        let url = Url::parse_with_params(
            &format!("{}/authorize", self.config.accounts_base),
            &[
                ("client_id", self.config.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", scopes.as_str()),
            ],
        )
        .map_err(|e| RemoteError::Malformed(e.to_string()))?;

        Ok(url.into())
    }

    /// Build an authenticated player request
    fn player(&self, method: Method, path: &str, token: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/me/player{}", self.config.api_base, path);
        self.http.request(method, &url).bearer_auth(token)
    }

    async fn send_control(&self, req: reqwest::RequestBuilder) -> Result<(), RemoteError> {
        // The player endpoints reject body-less PUT/POST without a length
        let resp = req.header(reqwest::header::CONTENT_LENGTH, 0).send().await?;
        check_status(resp.status())
    }

    /// JSON body for `PUT /me/player`
    fn transfer_body(device_id: &str, play: bool) -> serde_json::Value {
        serde_json::json!({ "device_ids": [device_id], "play": play })
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenGrant, RemoteError> {
        let url = format!("{}/api/token", self.config.accounts_base);
        let resp = self.http.post(&url).form(form).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Token exchange failed (HTTP {}): {}", status.as_u16(), body);
            return Err(RemoteError::Status(status.as_u16()));
        }

        let bytes = resp.bytes().await?;
        let token: TokenResponse =
            serde_json::from_slice(&bytes).map_err(|e| RemoteError::Malformed(e.to_string()))?;

        if token.access_token.is_empty() {
            return Err(RemoteError::Malformed("empty access token".to_string()));
        }

        Ok(token.into())
    }
}

#[async_trait]
impl PlaybackApi for SpotifyClient {
    #[instrument(skip_all)]
    async fn current_playback(&self, token: &str) -> Result<Option<CurrentPlayback>, RemoteError> {
        let resp = self
            .player(Method::GET, "/currently-playing", token)
            .send()
            .await?;

        if resp.status() == StatusCode::NO_CONTENT {
            debug!("Nothing playing");
            return Ok(None);
        }
        check_status(resp.status())?;

        let bytes = resp.bytes().await?;
        let body: CurrentlyPlayingResponse =
            serde_json::from_slice(&bytes).map_err(|e| RemoteError::Malformed(e.to_string()))?;

        Ok(body.into_playback())
    }

    async fn play(&self, token: &str) -> Result<(), RemoteError> {
        self.send_control(self.player(Method::PUT, "/play", token)).await
    }

    async fn pause(&self, token: &str) -> Result<(), RemoteError> {
        self.send_control(self.player(Method::PUT, "/pause", token)).await
    }

    async fn next(&self, token: &str) -> Result<(), RemoteError> {
        self.send_control(self.player(Method::POST, "/next", token)).await
    }

    async fn previous(&self, token: &str) -> Result<(), RemoteError> {
        self.send_control(self.player(Method::POST, "/previous", token)).await
    }

    async fn seek(&self, token: &str, position_ms: u64) -> Result<(), RemoteError> {
        let req = self
            .player(Method::PUT, "/seek", token)
            .query(&[("position_ms", position_ms)]);
        self.send_control(req).await
    }

    async fn set_volume(&self, token: &str, percent: u8) -> Result<(), RemoteError> {
        let req = self
            .player(Method::PUT, "/volume", token)
            .query(&[("volume_percent", percent.min(100))]);
        self.send_control(req).await
    }

    async fn set_shuffle(&self, token: &str, enabled: bool) -> Result<(), RemoteError> {
        let req = self
            .player(Method::PUT, "/shuffle", token)
            .query(&[("state", enabled)]);
        self.send_control(req).await
    }

    async fn set_repeat(&self, token: &str, mode: RepeatMode) -> Result<(), RemoteError> {
        let req = self
            .player(Method::PUT, "/repeat", token)
            .query(&[("state", mode.as_str())]);
        self.send_control(req).await
    }

    #[instrument(skip_all)]
    async fn devices(&self, token: &str) -> Result<Vec<Device>, RemoteError> {
        let resp = self.player(Method::GET, "/devices", token).send().await?;
        check_status(resp.status())?;

        let bytes = resp.bytes().await?;
        let body: DevicesResponse =
            serde_json::from_slice(&bytes).map_err(|e| RemoteError::Malformed(e.to_string()))?;

        let devices = body.into_devices();
        debug!("{} playback devices", devices.len());
        Ok(devices)
    }

    #[instrument(skip(self, token))]
    async fn transfer_playback(
        &self,
        token: &str,
        device_id: &str,
        play: bool,
    ) -> Result<(), RemoteError> {
        let resp = self
            .player(Method::PUT, "", token)
            .json(&Self::transfer_body(device_id, play))
            .send()
            .await?;
        check_status(resp.status())
    }

    #[instrument(skip_all)]
    async fn exchange_auth_code(&self, code: &str) -> Result<TokenGrant, RemoteError> {
        debug!("Exchanging authorization code");
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ])
        .await
    }

    #[instrument(skip_all)]
    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, RemoteError> {
        debug!("Refreshing access token");
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ])
        .await
    }
}
