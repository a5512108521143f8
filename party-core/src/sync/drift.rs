//! Dead reckoning and drift evaluation

use crate::config::SyncConfig;
use crate::party::PartyCode;
use crate::remote::{CurrentPlayback, PlaybackControl};

/// Estimate where the host is now, given the last reported position
///
/// While playing, the time elapsed since the report is added; a paused
/// position stays put.
pub fn adjusted_position_ms(
    position_ms: u64,
    is_playing: bool,
    last_update_ms: u64,
    now_ms: u64,
) -> u64 {
    if is_playing {
        position_ms + now_ms.saturating_sub(last_update_ms)
    } else {
        position_ms
    }
}

/// Where a member should be, per the party record read this tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTarget {
    pub track: Option<String>,
    pub position_ms: u64,
    pub is_playing: bool,
}

/// Outcome of one member sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub code: PartyCode,
    pub target_position_ms: u64,
    pub local_position_ms: u64,
    /// Local minus target; positive means we're ahead of the host
    pub drift_ms: i64,
    pub exceeds_threshold: bool,
    pub track_matches: bool,
    /// Play or pause issued to match the host
    pub state_change: Option<PlaybackControl>,
    pub seek_issued: bool,
}

impl SyncReport {
    pub fn evaluate(
        code: &PartyCode,
        target: &SyncTarget,
        local: &CurrentPlayback,
        config: &SyncConfig,
    ) -> Self {
        let drift_ms = local.position_ms as i64 - target.position_ms as i64;
        let state_change = if local.is_playing == target.is_playing {
            None
        } else if target.is_playing {
            Some(PlaybackControl::Play)
        } else {
            Some(PlaybackControl::Pause)
        };

        Self {
            code: code.clone(),
            target_position_ms: target.position_ms,
            local_position_ms: local.position_ms,
            drift_ms,
            exceeds_threshold: drift_ms.unsigned_abs() > config.drift_threshold_ms,
            track_matches: target.track.as_deref() == Some(local.track_id.as_str()),
            state_change,
            seek_issued: false,
        }
    }

    pub fn drift_abs_ms(&self) -> u64 {
        self.drift_ms.unsigned_abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(track: &str, position_ms: u64, is_playing: bool) -> CurrentPlayback {
        CurrentPlayback {
            track_id: track.into(),
            artist: "A".into(),
            title: "T".into(),
            position_ms,
            duration_ms: 300_000,
            is_playing,
        }
    }

    fn target(position_ms: u64, is_playing: bool) -> SyncTarget {
        SyncTarget {
            track: Some("spotify:track:x".into()),
            position_ms,
            is_playing,
        }
    }

    #[test]
    fn test_adjusted_position() {
        let t = 1_000_000;
        assert_eq!(adjusted_position_ms(60_000, true, t, t + 5_000), 65_000);
        assert_eq!(adjusted_position_ms(60_000, false, t, t + 5_000), 60_000);
        // Clock behind the report never rewinds
        assert_eq!(adjusted_position_ms(60_000, true, t, t - 10), 60_000);
    }

    #[test]
    fn test_drift_threshold() {
        let code = PartyCode::parse("ABCDEFGH").unwrap();
        let config = SyncConfig::default();

        let report = SyncReport::evaluate(&code, &target(12_000, true), &local("spotify:track:x", 3_000, true), &config);
        assert_eq!(report.drift_ms, -9_000);
        assert_eq!(report.drift_abs_ms(), 9_000);
        assert!(report.exceeds_threshold);
        assert!(report.track_matches);
        assert_eq!(report.state_change, None);

        let report = SyncReport::evaluate(&code, &target(12_000, true), &local("spotify:track:x", 15_000, true), &config);
        assert!(!report.exceeds_threshold);

        let report = SyncReport::evaluate(&code, &target(12_000, true), &local("spotify:track:y", 15_001, true), &config);
        assert!(report.exceeds_threshold);
        assert!(!report.track_matches);
    }

    #[test]
    fn test_play_state_mismatch() {
        let code = PartyCode::parse("ABCDEFGH").unwrap();
        let config = SyncConfig::default();

        let report = SyncReport::evaluate(&code, &target(0, true), &local("spotify:track:x", 0, false), &config);
        assert_eq!(report.state_change, Some(PlaybackControl::Play));

        let report = SyncReport::evaluate(&code, &target(0, false), &local("spotify:track:x", 0, true), &config);
        assert_eq!(report.state_change, Some(PlaybackControl::Pause));
    }
}
