//! Periodic sync driver
//!
//! Called from the host application's tick. Remote calls run as tasks on the
//! runtime; their results come back through a [`JoinSet`] and are applied on
//! the next tick, after checking that the membership they were issued for is
//! still the current one.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use super::drift::{adjusted_position_ms, SyncReport, SyncTarget};
use crate::auth::SessionManager;
use crate::clock::Clock;
use crate::config::{DriftCorrection, SyncConfig};
use crate::party::{Membership, PartyManager, Role};
use crate::remote::{CurrentPlayback, PlaybackControl};

enum Completion {
    HostPlayback {
        membership: Membership,
        playback: Option<CurrentPlayback>,
    },
    MemberPlayback {
        membership: Membership,
        target: SyncTarget,
        playback: Option<CurrentPlayback>,
    },
    Control {
        action: PlaybackControl,
        delivered: bool,
    },
}

pub struct SyncEngine {
    session: Arc<SessionManager>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    handle: Handle,
    tasks: JoinSet<Completion>,
    last_sync_ms: Option<u64>,
    host_fetch_pending: bool,
    last_report: Option<SyncReport>,
}

impl SyncEngine {
    pub fn new(
        session: Arc<SessionManager>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
        handle: Handle,
    ) -> Self {
        Self {
            session,
            clock,
            config,
            handle,
            tasks: JoinSet::new(),
            last_sync_ms: None,
            host_fetch_pending: false,
            last_report: None,
        }
    }

    /// Outcome of the most recent member sync
    pub fn last_report(&self) -> Option<&SyncReport> {
        self.last_report.as_ref()
    }

    /// Remote calls still in flight
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    pub fn tick(&mut self, party: &PartyManager) {
        while let Some(result) = self.tasks.try_join_next() {
            self.handle_result(result, party);
        }

        let Some(membership) = party.membership() else {
            return;
        };
        match membership.role {
            Role::Host => self.tick_host(membership),
            Role::Member => self.tick_member(party, membership),
        }
    }

    /// Wait for every in-flight call (and any follow-ups) and apply the results
    pub async fn settle(&mut self, party: &PartyManager) {
        while let Some(result) = self.tasks.join_next().await {
            self.handle_result(result, party);
        }
    }

    /// Abort in-flight calls and forget timing state
    pub fn reset(&mut self) {
        self.tasks.abort_all();
        self.last_sync_ms = None;
        self.host_fetch_pending = false;
        self.last_report = None;
    }

    fn tick_host(&mut self, membership: Membership) {
        if self.host_fetch_pending {
            return;
        }
        self.host_fetch_pending = true;

        let session = self.session.clone();
        self.tasks.spawn_on(
            async move {
                let playback = session.current_playback().await;
                Completion::HostPlayback {
                    membership,
                    playback,
                }
            },
            &self.handle,
        );
    }

    fn tick_member(&mut self, party: &PartyManager, membership: Membership) {
        if party.forget_disbanded() {
            self.last_report = None;
            return;
        }

        let now = self.clock.now_ms();
        if let Some(last) = self.last_sync_ms {
            if now.saturating_sub(last) < self.config.sync_interval_ms {
                return;
            }
        }
        self.last_sync_ms = Some(now);

        let Some(snapshot) = party.current_party() else {
            return;
        };
        party.touch(&membership);

        if snapshot.current_track.is_none() {
            debug!("Host of {} has not reported a track yet", snapshot.code);
            return;
        }

        let target = SyncTarget {
            position_ms: adjusted_position_ms(
                snapshot.current_position_ms,
                snapshot.is_playing,
                snapshot.last_update_ms,
                now,
            ),
            track: snapshot.current_track,
            is_playing: snapshot.is_playing,
        };

        let session = self.session.clone();
        self.tasks.spawn_on(
            async move {
                let playback = session.current_playback().await;
                Completion::MemberPlayback {
                    membership,
                    target,
                    playback,
                }
            },
            &self.handle,
        );
    }

    fn dispatch(&mut self, action: PlaybackControl) {
        let session = self.session.clone();
        self.tasks.spawn_on(
            async move {
                let delivered = session.control(action).await;
                Completion::Control { action, delivered }
            },
            &self.handle,
        );
    }

    fn handle_result(&mut self, result: Result<Completion, JoinError>, party: &PartyManager) {
        match result {
            Ok(completion) => self.apply(completion, party),
            Err(e) => {
                warn!("Sync task failed: {}", e);
                self.host_fetch_pending = false;
            }
        }
    }

    fn apply(&mut self, completion: Completion, party: &PartyManager) {
        match completion {
            Completion::HostPlayback {
                membership,
                playback,
            } => {
                self.host_fetch_pending = false;
                if !party.is_current(&membership) {
                    debug!("Dropping host playback for a party we already left");
                    return;
                }
                let Some(playback) = playback else {
                    debug!("Host has nothing playing");
                    return;
                };
                if let Err(e) = party.update_party_state(
                    &membership,
                    Some(playback.track_id),
                    playback.position_ms,
                    playback.is_playing,
                ) {
                    warn!("Failed to update party state: {}", e);
                }
            }

            Completion::MemberPlayback {
                membership,
                target,
                playback,
            } => {
                if !party.is_current(&membership) {
                    debug!("Dropping sync result for a party we already left");
                    return;
                }
                let Some(local) = playback else {
                    debug!("Nothing playing locally, skipping sync");
                    return;
                };
                self.correct(&membership, &target, &local);
            }

            Completion::Control { action, delivered } => {
                if delivered {
                    debug!("Sync: {} delivered", action.name());
                } else {
                    warn!("Sync: {} could not be delivered", action.name());
                }
            }
        }
    }

    fn correct(&mut self, membership: &Membership, target: &SyncTarget, local: &CurrentPlayback) {
        let mut report = SyncReport::evaluate(&membership.code, target, local, &self.config);

        debug!(
            "Sync: drift {:+}ms (target: {}ms, local: {}ms)",
            report.drift_ms, report.target_position_ms, report.local_position_ms
        );

        if let Some(action) = report.state_change {
            info!("Sync: host is {}, issuing {}", if target.is_playing { "playing" } else { "paused" }, action.name());
            self.dispatch(action);
        }

        if report.exceeds_threshold {
            warn!(
                "Drift detected: {}ms exceeds {}ms (target: {}ms, local: {}ms)",
                report.drift_abs_ms(),
                self.config.drift_threshold_ms,
                report.target_position_ms,
                report.local_position_ms
            );

            if self.config.drift_correction == DriftCorrection::Seek {
                if report.track_matches {
                    self.dispatch(PlaybackControl::Seek(report.target_position_ms));
                    report.seek_issued = true;
                } else {
                    debug!("Not seeking: local track differs from the host's");
                }
            }
        }

        self.last_report = Some(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryProfileStore;
    use crate::clock::ManualClock;
    use crate::config::PartyConfig;
    use crate::party::{PartyCode, PartyRegistry};
    use crate::remote::mock::{Call, MockPlayback};

    const START: u64 = 1_000_000;

    struct Peer {
        api: Arc<MockPlayback>,
        party: PartyManager,
        engine: SyncEngine,
    }

    fn peer(
        id: &str,
        registry: &Arc<PartyRegistry>,
        clock: &Arc<ManualClock>,
        config: SyncConfig,
    ) -> Peer {
        let api = Arc::new(MockPlayback::new());
        let profiles = Arc::new(MemoryProfileStore::with_identity(id, id));
        let session = Arc::new(SessionManager::new(api.clone(), profiles.clone(), clock.clone()));
        session.set_tokens("access", "refresh", u64::MAX);

        let party = PartyManager::new(registry.clone(), profiles, clock.clone(), PartyConfig::default())
            .with_code_generator(|| PartyCode::parse("ABCDEFGH").unwrap());
        let engine = SyncEngine::new(session, clock.clone(), config, Handle::current());
        Peer { api, party, engine }
    }

    fn pair(config: SyncConfig) -> (Arc<ManualClock>, Peer, Peer) {
        let registry = Arc::new(PartyRegistry::new());
        let clock = Arc::new(ManualClock::new(START));
        let host = peer("host", &registry, &clock, SyncConfig::default());
        let member = peer("member", &registry, &clock, config);

        host.party.create_party("Test").unwrap();
        assert!(member.party.join_party("ABCDEFGH"));
        (clock, host, member)
    }

    fn fetches(api: &MockPlayback) -> usize {
        api.count(|c| matches!(c, Call::CurrentPlayback(_)))
    }

    #[tokio::test]
    async fn test_host_tick_publishes_playback() {
        let (_clock, mut host, _member) = pair(SyncConfig::default());
        host.api
            .set_playback(Some(MockPlayback::playing("spotify:track:x", 10_000, true)));

        host.engine.tick(&host.party);
        // A second tick while the fetch is outstanding does not stack another
        host.engine.tick(&host.party);
        assert_eq!(host.engine.pending(), 1);
        host.engine.settle(&host.party).await;

        let party = host.party.current_party().unwrap();
        assert_eq!(party.current_track.as_deref(), Some("spotify:track:x"));
        assert_eq!(party.current_position_ms, 10_000);
        assert!(party.is_playing);
        assert_eq!(party.last_update_ms, START);
        assert_eq!(fetches(&host.api), 1);
    }

    #[tokio::test]
    async fn test_host_with_nothing_playing_keeps_state() {
        let (_clock, mut host, _member) = pair(SyncConfig::default());

        host.engine.tick(&host.party);
        host.engine.settle(&host.party).await;

        assert!(host.party.current_party().unwrap().current_track.is_none());
    }

    async fn publish(host: &mut Peer, track: &str, position_ms: u64, is_playing: bool) {
        host.api
            .set_playback(Some(MockPlayback::playing(track, position_ms, is_playing)));
        host.engine.tick(&host.party);
        host.engine.settle(&host.party).await;
    }

    #[tokio::test]
    async fn test_member_reports_drift_without_seeking() {
        let (clock, mut host, mut member) = pair(SyncConfig::default());
        publish(&mut host, "spotify:track:x", 10_000, true).await;

        clock.advance(2_000);
        member
            .api
            .set_playback(Some(MockPlayback::playing("spotify:track:x", 3_000, true)));
        member.engine.tick(&member.party);
        member.engine.settle(&member.party).await;

        let report = member.engine.last_report().unwrap();
        assert_eq!(report.target_position_ms, 12_000);
        assert_eq!(report.local_position_ms, 3_000);
        assert_eq!(report.drift_abs_ms(), 9_000);
        assert!(report.exceeds_threshold);
        assert!(!report.seek_issued);
        assert_eq!(member.api.count(|c| matches!(c, Call::Seek(_))), 0);
        assert_eq!(member.api.count(|c| matches!(c, Call::Play | Call::Pause)), 0);
    }

    #[tokio::test]
    async fn test_member_seeks_when_enabled() {
        let config = SyncConfig {
            drift_correction: DriftCorrection::Seek,
            ..SyncConfig::default()
        };
        let (clock, mut host, mut member) = pair(config);
        publish(&mut host, "spotify:track:x", 10_000, true).await;

        clock.advance(2_000);
        member
            .api
            .set_playback(Some(MockPlayback::playing("spotify:track:x", 3_000, true)));
        member.engine.tick(&member.party);
        member.engine.settle(&member.party).await;

        assert!(member.engine.last_report().unwrap().seek_issued);
        assert_eq!(member.api.count(|c| *c == Call::Seek(12_000)), 1);
    }

    #[tokio::test]
    async fn test_join_does_not_move_dead_reckoning_anchor() {
        let registry = Arc::new(PartyRegistry::new());
        let clock = Arc::new(ManualClock::new(START));
        let mut host = peer("host", &registry, &clock, SyncConfig::default());
        let mut member = peer("member", &registry, &clock, SyncConfig::default());
        let late = peer("late", &registry, &clock, SyncConfig::default());

        host.party.create_party("Test").unwrap();
        assert!(member.party.join_party("ABCDEFGH"));
        publish(&mut host, "spotify:track:x", 10_000, true).await;

        clock.advance(1_500);
        assert!(late.party.join_party("ABCDEFGH"));
        clock.advance(500);

        member
            .api
            .set_playback(Some(MockPlayback::playing("spotify:track:x", 12_000, true)));
        member.engine.tick(&member.party);
        member.engine.settle(&member.party).await;

        let report = member.engine.last_report().unwrap();
        assert_eq!(report.target_position_ms, 12_000);
        assert_eq!(report.drift_ms, 0);
    }

    #[tokio::test]
    async fn test_member_matches_play_state() {
        let (_clock, mut host, mut member) = pair(SyncConfig::default());
        publish(&mut host, "spotify:track:x", 10_000, false).await;

        member
            .api
            .set_playback(Some(MockPlayback::playing("spotify:track:x", 10_500, true)));
        member.engine.tick(&member.party);
        member.engine.settle(&member.party).await;

        assert_eq!(member.api.count(|c| *c == Call::Pause), 1);
        assert_eq!(member.api.count(|c| *c == Call::Play), 0);
        // Paused host: no dead reckoning
        assert_eq!(member.engine.last_report().unwrap().target_position_ms, 10_000);
    }

    #[tokio::test]
    async fn test_member_sync_is_rate_limited() {
        let (clock, mut host, mut member) = pair(SyncConfig::default());
        publish(&mut host, "spotify:track:x", 10_000, true).await;
        member
            .api
            .set_playback(Some(MockPlayback::playing("spotify:track:x", 10_000, true)));

        member.engine.tick(&member.party);
        member.engine.settle(&member.party).await;
        clock.advance(999);
        member.engine.tick(&member.party);
        member.engine.settle(&member.party).await;
        assert_eq!(fetches(&member.api), 1);

        clock.advance(1);
        member.engine.tick(&member.party);
        member.engine.settle(&member.party).await;
        assert_eq!(fetches(&member.api), 2);
    }

    #[tokio::test]
    async fn test_member_waits_for_first_host_report() {
        let (_clock, _host, mut member) = pair(SyncConfig::default());

        member.engine.tick(&member.party);
        member.engine.settle(&member.party).await;

        assert_eq!(fetches(&member.api), 0);
        assert!(member.engine.last_report().is_none());
    }

    #[tokio::test]
    async fn test_result_after_leaving_is_ignored() {
        let (_clock, mut host, mut member) = pair(SyncConfig::default());
        publish(&mut host, "spotify:track:x", 10_000, true).await;
        member
            .api
            .set_playback(Some(MockPlayback::playing("spotify:track:x", 0, false)));

        member.engine.tick(&member.party);
        assert!(member.party.leave_current_party());
        member.engine.settle(&member.party).await;

        assert_eq!(fetches(&member.api), 1);
        assert_eq!(member.api.count(|c| *c == Call::Play), 0);
        assert!(member.engine.last_report().is_none());
    }

    #[tokio::test]
    async fn test_member_notices_disband() {
        let (_clock, host, mut member) = pair(SyncConfig::default());
        assert!(host.party.leave_current_party());

        member.engine.tick(&member.party);
        assert!(!member.party.is_in_party());
        assert_eq!(member.engine.pending(), 0);
    }

    #[tokio::test]
    async fn test_member_touches_last_seen() {
        let (clock, mut host, mut member) = pair(SyncConfig::default());
        publish(&mut host, "spotify:track:x", 10_000, true).await;

        clock.advance(5_000);
        member.engine.tick(&member.party);
        member.engine.settle(&member.party).await;

        let party = host.party.current_party().unwrap();
        assert_eq!(party.member("member").unwrap().last_seen_ms, START + 5_000);
    }
}
