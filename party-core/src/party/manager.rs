//! Party membership state machine
//!
//! One [`PartyManager`] per local user. It tracks which party (if any) the user
//! is in and with which role, and performs create/join/leave against the
//! shared [`PartyRegistry`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::code::PartyCode;
use super::model::{Party, PartyError};
use super::registry::PartyRegistry;
use crate::auth::ProfileStore;
use crate::clock::Clock;
use crate::config::PartyConfig;

/// Source of candidate party codes
pub type CodeGenerator = Box<dyn Fn() -> PartyCode + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Member,
}

/// The local user's seat in a party
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub code: PartyCode,
    pub member_id: String,
    pub role: Role,
    /// Distinguishes successive memberships, even of the same party
    pub epoch: u64,
}

impl Membership {
    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }
}

/// Whether we're in a party (or not)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Participation {
    #[default]
    NotInParty,
    InParty(Membership),
}

impl Participation {
    pub fn membership(&self) -> Option<&Membership> {
        match self {
            Participation::InParty(m) => Some(m),
            Participation::NotInParty => None,
        }
    }
}

pub struct PartyManager {
    registry: Arc<PartyRegistry>,
    profiles: Arc<dyn ProfileStore>,
    clock: Arc<dyn Clock>,
    config: PartyConfig,
    codes: CodeGenerator,
    participation: RwLock<Participation>,
    epoch: AtomicU64,
}

impl PartyManager {
    pub fn new(
        registry: Arc<PartyRegistry>,
        profiles: Arc<dyn ProfileStore>,
        clock: Arc<dyn Clock>,
        config: PartyConfig,
    ) -> Self {
        Self {
            registry,
            profiles,
            clock,
            config,
            codes: Box::new(PartyCode::random),
            participation: RwLock::new(Participation::NotInParty),
            epoch: AtomicU64::new(0),
        }
    }

    /// Replace the random code source
    pub fn with_code_generator(
        mut self,
        codes: impl Fn() -> PartyCode + Send + Sync + 'static,
    ) -> Self {
        self.codes = Box::new(codes);
        self
    }

    pub fn registry(&self) -> &Arc<PartyRegistry> {
        &self.registry
    }

    pub fn participation(&self) -> Participation {
        self.participation.read().clone()
    }

    pub fn membership(&self) -> Option<Membership> {
        self.participation.read().membership().cloned()
    }

    pub fn is_in_party(&self) -> bool {
        self.membership().is_some()
    }

    pub fn is_host(&self) -> bool {
        self.membership().is_some_and(|m| m.is_host())
    }

    /// Is `membership` still the one we hold?
    pub fn is_current(&self, membership: &Membership) -> bool {
        self.participation.read().membership() == Some(membership)
    }

    /// Snapshot of the party we're in
    pub fn current_party(&self) -> Option<Party> {
        let membership = self.membership()?;
        self.registry.get(&membership.code)
    }

    pub fn party(&self, code: &str) -> Option<Party> {
        self.registry.get(&PartyCode::parse(code)?)
    }

    pub fn list_parties(&self) -> Vec<Party> {
        self.registry.list()
    }

    fn next_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Create a party hosted by the active profile
    pub fn create_party(&self, name: &str) -> Option<Party> {
        match self.try_create_party(name) {
            Ok(party) => Some(party),
            Err(e) => {
                warn!("Failed to create party '{}': {}", name, e);
                None
            }
        }
    }

    pub fn try_create_party(&self, name: &str) -> Result<Party, PartyError> {
        let identity = self
            .profiles
            .active_identity()
            .ok_or(PartyError::NoIdentity)?;

        for attempt in 1..=self.config.code_attempts {
            let code = (self.codes)();
            let party = Party::new(
                code.clone(),
                name,
                &identity,
                self.config.max_members,
                self.clock.now_ms(),
            );

            if !self.registry.insert_new(party.clone()) {
                debug!("Party code {} taken (attempt {}), drawing another", code, attempt);
                continue;
            }

            self.leave_current_party();
            *self.participation.write() = Participation::InParty(Membership {
                code: code.clone(),
                member_id: identity.id.clone(),
                role: Role::Host,
                epoch: self.next_epoch(),
            });

            info!("Created party '{}' with code {}", party.name, code);
            return Ok(party);
        }

        Err(PartyError::CodeExhausted(self.config.code_attempts))
    }

    /// Join an existing party as a regular member
    pub fn join_party(&self, code: &str) -> bool {
        match self.try_join_party(code) {
            Ok(_) => true,
            Err(e) => {
                warn!("Failed to join party {}: {}", code, e);
                false
            }
        }
    }

    pub fn try_join_party(&self, code: &str) -> Result<Party, PartyError> {
        let code = PartyCode::parse(code).ok_or_else(|| PartyError::NotFound(code.to_string()))?;
        let identity = self
            .profiles
            .active_identity()
            .ok_or(PartyError::NoIdentity)?;
        let now = self.clock.now_ms();

        let party = self
            .registry
            .update(&code, |party| {
                party.add_member(&identity, now).map(|()| party.clone())
            })
            .ok_or_else(|| PartyError::NotFound(code.to_string()))??;

        // Only now that the new seat is secured do we give up the old one
        self.leave_current_party();
        *self.participation.write() = Participation::InParty(Membership {
            code: code.clone(),
            member_id: identity.id.clone(),
            role: Role::Member,
            epoch: self.next_epoch(),
        });

        info!("Joined party '{}' ({})", party.name, code);
        Ok(party)
    }

    /// Leave whatever party we're in; a leaving host disbands it
    ///
    /// Returns whether there was anything to leave.
    pub fn leave_current_party(&self) -> bool {
        let previous = std::mem::take(&mut *self.participation.write());
        let Participation::InParty(membership) = previous else {
            return false;
        };

        match membership.role {
            Role::Host => {
                if self.registry.remove(&membership.code).is_some() {
                    info!("Disbanded party {}", membership.code);
                }
            }
            Role::Member => {
                let removed = self
                    .registry
                    .update(&membership.code, |p| p.remove_member(&membership.member_id))
                    .flatten();
                if removed.is_some() {
                    info!("Left party {}", membership.code);
                } else {
                    debug!("Party {} already gone when leaving", membership.code);
                }
            }
        }
        true
    }

    /// Host-only: publish local playback into the party record
    pub fn update_party_state(
        &self,
        membership: &Membership,
        track: Option<String>,
        position_ms: u64,
        is_playing: bool,
    ) -> Result<(), PartyError> {
        if !membership.is_host() || !self.is_current(membership) {
            return Err(PartyError::NotHost);
        }

        let now = self.clock.now_ms();
        self.registry
            .update(&membership.code, |party| {
                party.update_playback(track, position_ms, is_playing, now);
                party.touch_member(&membership.member_id, now);
            })
            .ok_or_else(|| PartyError::NotFound(membership.code.to_string()))
    }

    /// Refresh our own last-seen timestamp
    pub fn touch(&self, membership: &Membership) {
        let now = self.clock.now_ms();
        self.registry
            .update(&membership.code, |p| p.touch_member(&membership.member_id, now));
    }

    /// Drop a membership whose party vanished from the registry
    pub fn forget_disbanded(&self) -> bool {
        let mut participation = self.participation.write();
        let gone = match participation.membership() {
            Some(m) => !self.registry.contains(&m.code),
            None => false,
        };

        if gone {
            if let Participation::InParty(m) = std::mem::take(&mut *participation) {
                info!("Party {} was disbanded by its host", m.code);
            }
        }
        gone
    }

    /// Leave and drop every party (shutdown)
    pub fn cleanup(&self) {
        self.leave_current_party();
        self.registry.clear();
        info!("Party registry cleared");
    }
}
