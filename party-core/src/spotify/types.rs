//! Types for Spotify Web API responses

use serde::Deserialize;

use crate::remote::{CurrentPlayback, Device, TokenGrant};

/// Response body of `GET /me/player/currently-playing`
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentlyPlayingResponse {
    /// Progress into the current item
    #[serde(default)]
    pub progress_ms: Option<u64>,

    #[serde(default)]
    pub is_playing: bool,

    /// Null for ads and some podcast states
    #[serde(default)]
    pub item: Option<TrackObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackObject {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub uri: Option<String>,

    pub name: String,

    #[serde(default)]
    pub artists: Vec<ArtistObject>,

    #[serde(default)]
    pub album: Option<AlbumObject>,

    #[serde(default)]
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistObject {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumObject {
    pub name: String,
}

impl CurrentlyPlayingResponse {
    /// Flatten into the service-agnostic shape, `None` when no track item is present
    pub fn into_playback(self) -> Option<CurrentPlayback> {
        let item = self.item?;
        let track_id = item.uri.or(item.id).unwrap_or_default();
        let artist = item
            .artists
            .into_iter()
            .next()
            .map(|a| a.name)
            .unwrap_or_else(|| "Unknown Artist".to_string());

        Some(CurrentPlayback {
            track_id,
            artist,
            title: item.name,
            position_ms: self.progress_ms.unwrap_or(0),
            duration_ms: item.duration_ms,
            is_playing: self.is_playing,
        })
    }
}

/// Response body of `GET /me/player/devices`
#[derive(Debug, Clone, Deserialize)]
pub struct DevicesResponse {
    #[serde(default)]
    pub devices: Vec<DeviceObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceObject {
    /// Null for devices that cannot be addressed
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub is_active: bool,

    #[serde(default)]
    pub is_restricted: bool,

    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub volume_percent: Option<u8>,
}

impl DevicesResponse {
    /// Addressable, unrestricted devices only
    pub fn into_devices(self) -> Vec<Device> {
        self.devices
            .into_iter()
            .filter(|d| !d.is_restricted)
            .filter_map(|d| {
                Some(Device {
                    id: d.id.filter(|id| !id.is_empty())?,
                    name: d.name,
                    kind: d.kind,
                    is_active: d.is_active,
                    volume_percent: d.volume_percent,
                })
            })
            .collect()
    }
}

/// Response body of `POST /api/token`
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    #[serde(default)]
    pub refresh_token: Option<String>,

    pub expires_in: u64,

    #[serde(default)]
    pub token_type: Option<String>,

    #[serde(default)]
    pub scope: Option<String>,
}

impl From<TokenResponse> for TokenGrant {
    fn from(resp: TokenResponse) -> Self {
        Self {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token.filter(|t| !t.is_empty()),
            expires_in_secs: resp.expires_in,
        }
    }
}
