//! Process-wide party directory

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::code::PartyCode;
use super::model::Party;

/// All live parties, keyed by code
///
/// Reads hand out clones; mutation goes through [`PartyRegistry::update`],
/// which holds the entry lock for the duration of the closure.
#[derive(Debug, Default)]
pub struct PartyRegistry {
    parties: DashMap<PartyCode, Party>,
}

impl PartyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert only if the code is free
    pub fn insert_new(&self, party: Party) -> bool {
        match self.parties.entry(party.code.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(party);
                true
            }
        }
    }

    pub fn get(&self, code: &PartyCode) -> Option<Party> {
        self.parties.get(code).map(|p| p.value().clone())
    }

    pub fn contains(&self, code: &PartyCode) -> bool {
        self.parties.contains_key(code)
    }

    /// Mutate a party in place; `None` if it does not exist
    pub fn update<R>(&self, code: &PartyCode, f: impl FnOnce(&mut Party) -> R) -> Option<R> {
        self.parties.get_mut(code).map(|mut p| f(p.value_mut()))
    }

    pub fn remove(&self, code: &PartyCode) -> Option<Party> {
        self.parties.remove(code).map(|(_, p)| p)
    }

    pub fn list(&self) -> Vec<Party> {
        self.parties.iter().map(|p| p.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.parties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parties.is_empty()
    }

    pub fn clear(&self) {
        self.parties.clear();
    }
}
