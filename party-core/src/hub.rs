//! Facade for the embedding application
//!
//! Owns a tokio runtime plus the session, party, sync and broadcast
//! components. The host calls [`PartyHub::tick`] from its own loop; every
//! remote call runs on the runtime and is applied on a later tick.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::auth::{callback_addr, CallbackError, CallbackListener, ProfileStore, SessionManager};
use crate::broadcast::{PeerBroadcaster, PeerSnapshot};
use crate::clock::{Clock, SystemClock};
use crate::commands;
use crate::config::CoreConfig;
use crate::logging::init_tracing;
use crate::network::{ChannelError, ChannelEvent, GossipTransport, LoopbackGroup, PeerChannel};
use crate::party::{Party, PartyManager, PartyRegistry};
use crate::remote::{Device, PlaybackApi, RemoteError};
use crate::spotify::SpotifyClient;
use crate::sync::{SyncEngine, SyncReport};

#[derive(Debug, Error)]
pub enum HubError {
    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error(transparent)]
    Transport(#[from] ChannelError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Callback(#[from] CallbackError),

    #[error("redirect URI has no local address: {0}")]
    RedirectUri(String),
}

/// Where peer broadcast traffic goes
pub enum ChannelSource {
    /// libp2p gossipsub, configured by [`CoreConfig::network`]
    Gossip,
    /// In-process group, joined under `peer`
    Loopback { group: LoopbackGroup, peer: String },
}

pub struct HubDeps {
    pub api: Arc<dyn PlaybackApi>,
    pub profiles: Arc<dyn ProfileStore>,
    pub registry: Arc<PartyRegistry>,
    pub clock: Arc<dyn Clock>,
    pub channel: ChannelSource,
}

pub struct PartyHub {
    config: CoreConfig,
    clock: Arc<dyn Clock>,
    session: Arc<SessionManager>,
    party: Arc<PartyManager>,
    engine: Mutex<SyncEngine>,
    broadcaster: Mutex<PeerBroadcaster>,
    events: Mutex<UnboundedReceiver<ChannelEvent>>,
    channel: Arc<dyn PeerChannel>,
    runtime: Runtime,
}

impl PartyHub {
    pub fn new(config: CoreConfig, deps: HubDeps) -> Result<Self, HubError> {
        init_tracing();
        info!("Initializing party hub");

        let runtime = Runtime::new()?;
        let handle = runtime.handle().clone();

        let (channel, events) = match deps.channel {
            ChannelSource::Gossip => {
                let _guard = runtime.enter();
                let transport =
                    GossipTransport::new(&config.broadcast.channel, config.network.clone());
                let (channel, events) = transport.start()?;
                let channel: Arc<dyn PeerChannel> = Arc::new(channel);
                (channel, events)
            }
            ChannelSource::Loopback { group, peer } => {
                let (channel, events) = group.join(&peer);
                let channel: Arc<dyn PeerChannel> = Arc::new(channel);
                (channel, events)
            }
        };

        let session = Arc::new(SessionManager::new(
            deps.api,
            deps.profiles.clone(),
            deps.clock.clone(),
        ));
        if session.restore() {
            info!("Restored saved session");
        }

        let party = Arc::new(PartyManager::new(
            deps.registry,
            deps.profiles,
            deps.clock.clone(),
            config.party.clone(),
        ));
        let engine = SyncEngine::new(
            session.clone(),
            deps.clock.clone(),
            config.sync.clone(),
            handle.clone(),
        );
        let broadcaster = PeerBroadcaster::new(
            session.clone(),
            channel.clone(),
            deps.clock.clone(),
            config.broadcast.clone(),
            handle,
        );

        Ok(Self {
            config,
            clock: deps.clock,
            session,
            party,
            engine: Mutex::new(engine),
            broadcaster: Mutex::new(broadcaster),
            events: Mutex::new(events),
            channel,
            runtime,
        })
    }

    /// Spotify Web API with the system clock and gossip transport
    pub fn with_spotify(
        config: CoreConfig,
        profiles: Arc<dyn ProfileStore>,
        registry: Arc<PartyRegistry>,
    ) -> Result<Self, HubError> {
        let api = Arc::new(SpotifyClient::new(config.spotify.clone())?);
        Self::new(
            config,
            HubDeps {
                api,
                profiles,
                registry,
                clock: Arc::new(SystemClock),
                channel: ChannelSource::Gossip,
            },
        )
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn party_manager(&self) -> &Arc<PartyManager> {
        &self.party
    }

    /// Drive both periodic paths; call from the host loop
    ///
    /// Component locks are taken one at a time, never nested.
    pub fn tick(&self) {
        let events: Vec<ChannelEvent> = {
            let mut rx = self.events.lock();
            std::iter::from_fn(|| rx.try_recv().ok()).collect()
        };
        {
            let mut broadcaster = self.broadcaster.lock();
            for event in events {
                broadcaster.handle_event(event);
            }
        }

        self.engine.lock().tick(&self.party);
        self.broadcaster.lock().tick();
    }

    /// Block until every in-flight remote call has been applied
    pub fn settle(&self) {
        {
            let mut engine = self.engine.lock();
            self.runtime.block_on(engine.settle(&self.party));
        }
        let mut broadcaster = self.broadcaster.lock();
        self.runtime.block_on(broadcaster.settle());
    }

    /// Exchange an authorization code for tokens
    pub fn authenticate(&self, code: &str) -> bool {
        self.runtime.block_on(self.session.authenticate(code))
    }

    /// Wait for the browser redirect on the configured callback address,
    /// then exchange the code it carries
    pub fn authenticate_via_callback(&self) -> Result<bool, HubError> {
        let redirect = &self.config.spotify.redirect_uri;
        let addr = callback_addr(redirect).ok_or_else(|| HubError::RedirectUri(redirect.clone()))?;

        self.runtime.block_on(async {
            let listener = CallbackListener::bind(addr).await?;
            info!("Waiting for authorization on {}", listener.local_addr());
            let code = listener.wait_for_code().await?;
            Ok::<_, HubError>(self.session.authenticate(&code).await)
        })
    }

    pub fn create_party(&self, name: &str) -> Option<Party> {
        self.party.create_party(name)
    }

    /// Join, then make sure the local player has a device to follow the host on
    pub fn join_party(&self, code: &str) -> bool {
        if !self.party.join_party(code) {
            return false;
        }
        if !self.runtime.block_on(self.session.ensure_active_device()) {
            warn!("Joined {} without an active playback device", code);
        }
        true
    }

    pub fn devices(&self) -> Vec<Device> {
        self.runtime
            .block_on(self.session.devices())
            .unwrap_or_default()
    }

    pub fn transfer_playback(&self, device_id: &str, play: bool) -> bool {
        self.runtime
            .block_on(self.session.transfer_playback(device_id, play))
    }

    pub fn leave_party(&self) -> bool {
        self.party.leave_current_party()
    }

    pub fn current_party(&self) -> Option<Party> {
        self.party.current_party()
    }

    pub fn list_parties(&self) -> Vec<Party> {
        self.party.list_parties()
    }

    pub fn last_sync_report(&self) -> Option<SyncReport> {
        self.engine.lock().last_report().cloned()
    }

    /// Fresh peer snapshots
    pub fn peers(&self) -> Vec<PeerSnapshot> {
        let broadcaster = self.broadcaster.lock();
        broadcaster.cache().snapshots(self.clock.now_ms())
    }

    /// Run a `party ...` text command
    pub fn run_command(&self, line: &str) -> Vec<String> {
        commands::run(line, &self.party)
    }

    /// Leave, clear the registry and peer cache, stop the transport
    pub fn shutdown(&self) {
        info!("Shutting down party hub");
        self.engine.lock().reset();
        self.party.cleanup();
        self.broadcaster.lock().reset();
        self.channel.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryProfileStore;
    use crate::clock::ManualClock;
    use crate::remote::mock::{Call, MockPlayback};

    struct Fixture {
        api: Arc<MockPlayback>,
        hub: PartyHub,
    }

    fn hub(
        name: &str,
        group: &LoopbackGroup,
        registry: &Arc<PartyRegistry>,
        clock: &Arc<ManualClock>,
    ) -> Fixture {
        let api = Arc::new(MockPlayback::new());
        let hub = PartyHub::new(
            CoreConfig::default(),
            HubDeps {
                api: api.clone(),
                profiles: Arc::new(MemoryProfileStore::with_identity(name, name)),
                registry: registry.clone(),
                clock: clock.clone(),
                channel: ChannelSource::Loopback {
                    group: group.clone(),
                    peer: name.to_string(),
                },
            },
        )
        .unwrap();
        hub.session().set_tokens("access", "refresh", u64::MAX);
        Fixture { api, hub }
    }

    #[test]
    fn test_two_hubs_sync_and_share_tracks() {
        let group = LoopbackGroup::new("spotifymod");
        let registry = Arc::new(PartyRegistry::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let a = hub("alice", &group, &registry, &clock);
        let b = hub("bob", &group, &registry, &clock);

        let party = a.hub.create_party("Evening").unwrap();
        let lines = b.hub.run_command(&format!("party join {}", party.code));
        assert_eq!(lines[0], "Joined party: Evening");

        a.api
            .set_playback(Some(MockPlayback::playing("spotify:track:x", 30_000, true)));
        b.api
            .set_playback(Some(MockPlayback::playing("spotify:track:x", 30_500, true)));

        a.hub.tick();
        a.hub.settle();
        assert_eq!(
            a.hub.current_party().unwrap().current_track.as_deref(),
            Some("spotify:track:x")
        );

        clock.advance(1_000);
        b.hub.tick();
        b.hub.settle();

        let report = b.hub.last_sync_report().unwrap();
        assert_eq!(report.target_position_ms, 31_000);
        assert!(!report.exceeds_threshold);

        let peers = b.hub.peers();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].track, "Title of spotify:track:x");
    }

    #[test]
    fn test_tick_and_settle_from_different_threads() {
        use std::sync::mpsc;
        use std::thread;
        use std::time::Duration;

        let group = LoopbackGroup::new("spotifymod");
        let registry = Arc::new(PartyRegistry::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let a = hub("alice", &group, &registry, &clock);
        let _b = hub("bob", &group, &registry, &clock);
        a.api
            .set_playback(Some(MockPlayback::playing("spotify:track:x", 0, true)));
        assert!(a.hub.create_party("Busy").is_some());

        let hub = Arc::new(a.hub);
        let (done_tx, done_rx) = mpsc::channel();

        let ticker = {
            let hub = hub.clone();
            let clock = clock.clone();
            let done_tx = done_tx.clone();
            thread::spawn(move || {
                for _ in 0..300 {
                    clock.advance(5_000);
                    hub.tick();
                }
                let _ = done_tx.send("tick");
            })
        };
        let settler = {
            let hub = hub.clone();
            thread::spawn(move || {
                for _ in 0..300 {
                    hub.settle();
                }
                let _ = done_tx.send("settle");
            })
        };

        for _ in 0..2 {
            assert!(done_rx.recv_timeout(Duration::from_secs(30)).is_ok());
        }
        ticker.join().unwrap();
        settler.join().unwrap();
    }

    #[test]
    fn test_join_activates_a_device() {
        let group = LoopbackGroup::new("spotifymod");
        let registry = Arc::new(PartyRegistry::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let a = hub("alice", &group, &registry, &clock);
        let b = hub("bob", &group, &registry, &clock);
        b.api
            .devices
            .lock()
            .push(MockPlayback::device("laptop", false));

        let party = a.hub.create_party("Devices").unwrap();
        assert!(b.hub.join_party(party.code.as_str()));
        assert_eq!(
            b.api.count(|c| *c == Call::Transfer("laptop".into(), false)),
            1
        );
        assert_eq!(b.hub.devices().len(), 1);

        // no devices at all still joins
        let c = hub("carol", &group, &registry, &clock);
        assert!(c.hub.join_party(party.code.as_str()));
        assert!(c.hub.devices().is_empty());
        assert!(!c.hub.transfer_playback("nowhere", true));
    }

    #[test]
    fn test_shutdown_cleans_up() {
        let group = LoopbackGroup::new("spotifymod");
        let registry = Arc::new(PartyRegistry::new());
        let clock = Arc::new(ManualClock::new(0));
        let a = hub("alice", &group, &registry, &clock);

        assert!(a.hub.create_party("Later").is_some());
        a.hub.shutdown();

        assert!(a.hub.current_party().is_none());
        assert!(registry.is_empty());
        assert!(a.hub.peers().is_empty());
        assert_eq!(a.hub.run_command("party info"), vec!["You are not in a party."]);
    }

    #[test]
    fn test_restores_saved_session() {
        let group = LoopbackGroup::new("spotifymod");
        let profiles = Arc::new(MemoryProfileStore::with_identity("carol", "Carol"));
        profiles.set_tokens(Some(crate::auth::StoredTokens {
            access_token: "saved".into(),
            refresh_token: "r".into(),
            expires_at_ms: u64::MAX,
        }));

        let hub = PartyHub::new(
            CoreConfig::default(),
            HubDeps {
                api: Arc::new(MockPlayback::new()),
                profiles,
                registry: Arc::new(PartyRegistry::new()),
                clock: Arc::new(ManualClock::new(0)),
                channel: ChannelSource::Loopback {
                    group,
                    peer: "carol".into(),
                },
            },
        )
        .unwrap();
        assert!(hub.session().is_authenticated());
    }
}
