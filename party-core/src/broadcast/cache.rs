//! Last-seen track per peer

use dashmap::DashMap;
use uuid::Uuid;

use super::protocol::TrackUpdate;

const ARTIST_DISPLAY_CHARS: usize = 12;
const TRACK_DISPLAY_CHARS: usize = 18;

/// What a peer last told us it was playing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSnapshot {
    pub peer_id: Uuid,
    pub artist: String,
    pub track: String,
    pub is_playing: bool,
    pub received_at_ms: u64,
}

impl PeerSnapshot {
    /// Short label for rendering above a player, e.g. `Artist - Track`
    pub fn compact_display(&self) -> String {
        if !self.is_playing {
            return "[Paused]".to_string();
        }
        format!(
            "{} - {}",
            shorten(&self.artist, ARTIST_DISPLAY_CHARS),
            shorten(&self.track, TRACK_DISPLAY_CHARS)
        )
    }
}

fn shorten(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars - 2).collect();
    out.push_str("..");
    out
}

/// Peer snapshots with time-based expiry
///
/// Each update replaces the previous snapshot for that peer. Reads skip
/// anything older than `stale_after_ms` and always return copies.
#[derive(Debug)]
pub struct PeerCache {
    entries: DashMap<Uuid, PeerSnapshot>,
    stale_after_ms: u64,
}

impl PeerCache {
    pub fn new(stale_after_ms: u64) -> Self {
        Self {
            entries: DashMap::new(),
            stale_after_ms,
        }
    }

    fn is_fresh(&self, snapshot: &PeerSnapshot, now_ms: u64) -> bool {
        now_ms.saturating_sub(snapshot.received_at_ms) <= self.stale_after_ms
    }

    pub fn record(&self, update: TrackUpdate, now_ms: u64) {
        self.entries.insert(
            update.peer_id,
            PeerSnapshot {
                peer_id: update.peer_id,
                artist: update.artist,
                track: update.track,
                is_playing: update.is_playing,
                received_at_ms: now_ms,
            },
        );
    }

    pub fn get(&self, peer_id: &Uuid, now_ms: u64) -> Option<PeerSnapshot> {
        self.entries
            .get(peer_id)
            .filter(|s| self.is_fresh(s, now_ms))
            .map(|s| s.value().clone())
    }

    pub fn snapshots(&self, now_ms: u64) -> Vec<PeerSnapshot> {
        self.entries
            .iter()
            .filter(|s| self.is_fresh(s, now_ms))
            .map(|s| s.value().clone())
            .collect()
    }

    /// Drop stale entries, returning how many went
    pub fn evict_stale(&self, now_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, s| self.is_fresh(s, now_ms));
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Entries held, stale ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(peer: u64, track: &str) -> TrackUpdate {
        TrackUpdate {
            peer_id: Uuid::from_u64_pair(0, peer),
            is_playing: true,
            artist: "Artist".into(),
            track: track.into(),
        }
    }

    #[test]
    fn test_staleness_boundary() {
        let cache = PeerCache::new(15_000);
        let now = 100_000;
        cache.record(update(1, "old"), now - 15_001);
        cache.record(update(2, "fresh"), now - 14_999);
        cache.record(update(3, "edge"), now - 15_000);

        let mut tracks: Vec<_> = cache.snapshots(now).into_iter().map(|s| s.track).collect();
        tracks.sort();
        assert_eq!(tracks, vec!["edge", "fresh"]);

        assert!(cache.get(&Uuid::from_u64_pair(0, 1), now).is_none());
        assert!(cache.get(&Uuid::from_u64_pair(0, 2), now).is_some());

        assert_eq!(cache.evict_stale(now), 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_last_writer_wins() {
        let cache = PeerCache::new(15_000);
        cache.record(update(1, "first"), 1_000);
        cache.record(update(1, "second"), 2_000);

        let snapshot = cache.get(&Uuid::from_u64_pair(0, 1), 2_000).unwrap();
        assert_eq!(snapshot.track, "second");
        assert_eq!(snapshot.received_at_ms, 2_000);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_compact_display() {
        let mut snapshot = PeerSnapshot {
            peer_id: Uuid::nil(),
            artist: "Daft Punk".into(),
            track: "One More Time".into(),
            is_playing: true,
            received_at_ms: 0,
        };
        assert_eq!(snapshot.compact_display(), "Daft Punk - One More Time");

        snapshot.artist = "The Very Long Band Name".into();
        snapshot.track = "An Extremely Long Song Title".into();
        assert_eq!(snapshot.compact_display(), "The Very L.. - An Extremely Lon..");

        snapshot.is_playing = false;
        assert_eq!(snapshot.compact_display(), "[Paused]");
    }
}
