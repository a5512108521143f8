//! Profile store interface
//!
//! The on-disk profile format belongs to the host application; the core only
//! needs to know who the active user is and where to put fresh tokens.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

/// The user on whose behalf parties are created and joined
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub display_name: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Tokens as last persisted for the active profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at_ms: u64,
}

pub trait ProfileStore: Send + Sync {
    fn active_identity(&self) -> Option<Identity>;

    fn persist_tokens(&self, access_token: &str, refresh_token: &str, expires_at_ms: u64);

    /// Tokens saved by a previous run, if any
    fn stored_tokens(&self) -> Option<StoredTokens>;
}

/// Keeps the active profile in memory
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    identity: RwLock<Option<Identity>>,
    tokens: RwLock<Option<StoredTokens>>,
    persist_count: AtomicUsize,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        let store = Self::new();
        store.set_identity(Some(Identity::new(id, display_name)));
        store
    }

    pub fn set_identity(&self, identity: Option<Identity>) {
        *self.identity.write() = identity;
    }

    pub fn set_tokens(&self, tokens: Option<StoredTokens>) {
        *self.tokens.write() = tokens;
    }

    /// Number of times tokens were persisted
    pub fn persist_count(&self) -> usize {
        self.persist_count.load(Ordering::SeqCst)
    }
}

impl ProfileStore for MemoryProfileStore {
    fn active_identity(&self) -> Option<Identity> {
        self.identity.read().clone()
    }

    fn persist_tokens(&self, access_token: &str, refresh_token: &str, expires_at_ms: u64) {
        *self.tokens.write() = Some(StoredTokens {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            expires_at_ms,
        });
        self.persist_count.fetch_add(1, Ordering::SeqCst);
    }

    fn stored_tokens(&self) -> Option<StoredTokens> {
        self.tokens.read().clone()
    }
}
