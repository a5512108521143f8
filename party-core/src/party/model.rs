//! Party and member records

use thiserror::Error;

use super::code::PartyCode;
use crate::auth::Identity;

/// Errors from party directory operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartyError {
    #[error("no active profile")]
    NoIdentity,

    #[error("party not found: {0}")]
    NotFound(String),

    #[error("party is full ({0} members)")]
    Full(usize),

    #[error("already a member of this party")]
    AlreadyMember,

    #[error("only the host can update party playback")]
    NotHost,

    #[error("could not find a free party code after {0} attempts")]
    CodeExhausted(usize),
}

/// A participant in a listening party
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyMember {
    pub member_id: String,
    pub display_name: String,
    pub is_host: bool,
    pub last_seen_ms: u64,
}

/// A listening party
///
/// Membership is ordered by join time; the host is always the first entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    pub code: PartyCode,
    pub name: String,
    pub host_id: String,
    members: Vec<PartyMember>,
    pub max_members: usize,
    /// Track reference the host last reported
    pub current_track: Option<String>,
    pub current_position_ms: u64,
    pub is_playing: bool,
    /// When the playback fields were last written
    pub last_update_ms: u64,
}

impl Party {
    /// New party with `host` as its only member
    pub fn new(
        code: PartyCode,
        name: impl Into<String>,
        host: &Identity,
        max_members: usize,
        now_ms: u64,
    ) -> Self {
        Self {
            code,
            name: name.into(),
            host_id: host.id.clone(),
            members: vec![PartyMember {
                member_id: host.id.clone(),
                display_name: host.display_name.clone(),
                is_host: true,
                last_seen_ms: now_ms,
            }],
            max_members,
            current_track: None,
            current_position_ms: 0,
            is_playing: false,
            last_update_ms: now_ms,
        }
    }

    pub fn members(&self) -> &[PartyMember] {
        &self.members
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn member(&self, member_id: &str) -> Option<&PartyMember> {
        self.members.iter().find(|m| m.member_id == member_id)
    }

    pub fn is_member(&self, member_id: &str) -> bool {
        self.member(member_id).is_some()
    }

    pub fn host(&self) -> Option<&PartyMember> {
        self.members.iter().find(|m| m.is_host)
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.max_members
    }

    /// Add a non-host member
    pub fn add_member(&mut self, identity: &Identity, now_ms: u64) -> Result<(), PartyError> {
        if self.is_member(&identity.id) {
            return Err(PartyError::AlreadyMember);
        }
        if self.is_full() {
            return Err(PartyError::Full(self.max_members));
        }

        self.members.push(PartyMember {
            member_id: identity.id.clone(),
            display_name: identity.display_name.clone(),
            is_host: false,
            last_seen_ms: now_ms,
        });
        Ok(())
    }

    /// Membership changes leave the playback anchor (`last_update_ms`) alone
    pub fn remove_member(&mut self, member_id: &str) -> Option<PartyMember> {
        let idx = self.members.iter().position(|m| m.member_id == member_id)?;
        Some(self.members.remove(idx))
    }

    /// Overwrite the host's playback snapshot
    pub fn update_playback(
        &mut self,
        track: Option<String>,
        position_ms: u64,
        is_playing: bool,
        now_ms: u64,
    ) {
        self.current_track = track;
        self.current_position_ms = position_ms;
        self.is_playing = is_playing;
        self.last_update_ms = now_ms;
    }

    pub fn touch_member(&mut self, member_id: &str, now_ms: u64) {
        if let Some(member) = self.members.iter_mut().find(|m| m.member_id == member_id) {
            member.last_seen_ms = now_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn party(max_members: usize) -> Party {
        Party::new(
            PartyCode::parse("ABCDEFGH").unwrap(),
            "Friday Night",
            &Identity::new("host", "Hosty"),
            max_members,
            1_000,
        )
    }

    #[test]
    fn test_new_party_has_host() {
        let party = party(10);
        assert_eq!(party.member_count(), 1);
        let host = party.host().unwrap();
        assert_eq!(host.member_id, "host");
        assert!(host.is_host);
        assert_eq!(party.host_id, "host");
        assert!(party.current_track.is_none());
    }

    #[test]
    fn test_add_member_rules() {
        let mut party = party(3);
        party.add_member(&Identity::new("b", "Bee"), 2_000).unwrap();
        assert_eq!(party.last_update_ms, 1_000);
        assert_eq!(party.member("b").unwrap().last_seen_ms, 2_000);
        assert!(!party.member("b").unwrap().is_host);

        assert_eq!(
            party.add_member(&Identity::new("b", "Bee"), 2_100),
            Err(PartyError::AlreadyMember)
        );

        party.add_member(&Identity::new("c", "Cee"), 2_200).unwrap();
        assert!(party.is_full());
        assert_eq!(
            party.add_member(&Identity::new("d", "Dee"), 2_300),
            Err(PartyError::Full(3))
        );
        assert_eq!(party.member_count(), 3);
    }

    #[test]
    fn test_remove_member() {
        let mut party = party(10);
        party.add_member(&Identity::new("b", "Bee"), 2_000).unwrap();

        let removed = party.remove_member("b").unwrap();
        assert_eq!(removed.display_name, "Bee");
        assert!(party.remove_member("b").is_none());
    }

    #[test]
    fn test_membership_changes_keep_playback_anchor() {
        let mut party = party(10);
        party.update_playback(Some("spotify:track:x".into()), 10_000, true, 5_000);

        party.add_member(&Identity::new("b", "Bee"), 6_500).unwrap();
        party.add_member(&Identity::new("c", "Cee"), 6_600).unwrap();
        party.remove_member("c");

        assert_eq!(party.current_position_ms, 10_000);
        assert_eq!(party.last_update_ms, 5_000);
    }

    #[test]
    fn test_update_playback_refreshes_timestamp() {
        let mut party = party(10);
        party.update_playback(Some("spotify:track:x".into()), 10_000, true, 5_000);

        assert_eq!(party.current_track.as_deref(), Some("spotify:track:x"));
        assert_eq!(party.current_position_ms, 10_000);
        assert!(party.is_playing);
        assert_eq!(party.last_update_ms, 5_000);
    }
}
