//! Now-playing broadcaster
//!
//! Announces the local track to the peer group on an interval and on request,
//! and folds peers' announcements into the [`PeerCache`].

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::cache::PeerCache;
use super::protocol::{PeerMessage, TrackUpdate};
use crate::auth::SessionManager;
use crate::clock::Clock;
use crate::config::BroadcastConfig;
use crate::network::{ChannelEvent, PeerChannel};
use crate::remote::CurrentPlayback;

pub struct PeerBroadcaster {
    peer_id: Uuid,
    session: Arc<SessionManager>,
    channel: Arc<dyn PeerChannel>,
    cache: Arc<PeerCache>,
    clock: Arc<dyn Clock>,
    config: BroadcastConfig,
    handle: Handle,
    /// Fetches tagged with the session generation they started under
    tasks: JoinSet<(u64, Option<CurrentPlayback>)>,
    last_broadcast_ms: Option<u64>,
}

impl PeerBroadcaster {
    pub fn new(
        session: Arc<SessionManager>,
        channel: Arc<dyn PeerChannel>,
        clock: Arc<dyn Clock>,
        config: BroadcastConfig,
        handle: Handle,
    ) -> Self {
        let peer_id = Uuid::new_v4();
        debug!("Broadcasting on {} as {}", channel.name(), peer_id);
        Self {
            peer_id,
            session,
            channel,
            cache: Arc::new(PeerCache::new(config.stale_after_ms)),
            clock,
            config,
            handle,
            tasks: JoinSet::new(),
            last_broadcast_ms: None,
        }
    }

    pub fn peer_id(&self) -> Uuid {
        self.peer_id
    }

    pub fn cache(&self) -> &Arc<PeerCache> {
        &self.cache
    }

    pub fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {
                info!("Connected to peer channel {}", self.channel.name());
                self.send(&PeerMessage::Handshake);
            }
            ChannelEvent::Disconnected => {
                info!("Disconnected from peer channel {}", self.channel.name());
                self.cache.clear();
            }
            ChannelEvent::Message { from, payload } => match PeerMessage::decode(&payload) {
                Ok(PeerMessage::Handshake) => {
                    debug!("Handshake from {}", from);
                    self.broadcast_now();
                }
                Ok(PeerMessage::TrackUpdate(update)) => {
                    if update.peer_id == self.peer_id {
                        return;
                    }
                    debug!(
                        "{} is {} {} - {}",
                        update.peer_id,
                        if update.is_playing { "playing" } else { "paused on" },
                        update.artist,
                        update.track
                    );
                    self.cache.record(update, self.clock.now_ms());
                }
                Err(e) => warn!("Dropping malformed message from {}: {}", from, e),
            },
        }
    }

    /// Apply finished fetches, evict stale peers, and announce when due
    pub fn tick(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            match result {
                Ok((generation, playback)) => self.announce(generation, playback),
                Err(e) => warn!("Broadcast task failed: {}", e),
            }
        }

        let now = self.clock.now_ms();
        let evicted = self.cache.evict_stale(now);
        if evicted > 0 {
            debug!("Evicted {} stale peer(s)", evicted);
        }

        let due = match self.last_broadcast_ms {
            Some(last) => now.saturating_sub(last) > self.config.broadcast_interval_ms,
            None => true,
        };
        if due {
            self.last_broadcast_ms = Some(now);
            self.broadcast_now();
        }
    }

    /// Fetch the local track and announce it once the fetch lands
    pub fn broadcast_now(&mut self) {
        if !self.session.is_authenticated() {
            debug!("Not authenticated, skipping broadcast");
            return;
        }

        let session = self.session.clone();
        let generation = session.generation();
        self.tasks.spawn_on(
            async move { (generation, session.current_playback().await) },
            &self.handle,
        );
    }

    /// Wait for in-flight fetches and send what they produced
    pub async fn settle(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            match result {
                Ok((generation, playback)) => self.announce(generation, playback),
                Err(e) => warn!("Broadcast task failed: {}", e),
            }
        }
    }

    /// Drop pending fetches and every cached peer
    pub fn reset(&mut self) {
        self.tasks.abort_all();
        self.cache.clear();
        self.last_broadcast_ms = None;
    }

    fn announce(&self, generation: u64, playback: Option<CurrentPlayback>) {
        if generation != self.session.generation() {
            debug!("Session changed since fetch, not broadcasting");
            return;
        }
        let Some(playback) = playback else {
            debug!("Nothing playing, skipping broadcast");
            return;
        };

        self.send(&PeerMessage::TrackUpdate(TrackUpdate {
            peer_id: self.peer_id,
            is_playing: playback.is_playing,
            artist: playback.artist,
            track: playback.title,
        }));
    }

    fn send(&self, message: &PeerMessage) {
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode peer message: {}", e);
                return;
            }
        };
        if let Err(e) = self.channel.send(payload) {
            warn!("Failed to send on {}: {}", self.channel.name(), e);
        }
    }
}
