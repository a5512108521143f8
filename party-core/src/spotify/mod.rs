//! Spotify Web API client
//!
//! Concrete [`crate::remote::PlaybackApi`] implementation over reqwest.

mod client;
mod types;

pub use client::SpotifyClient;
pub use types::*;
