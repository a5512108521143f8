//! Authentication
//!
//! Token lifecycle, the profile store seam and the OAuth redirect listener.

mod callback;
mod profile;
mod session;

pub use callback::{callback_addr, CallbackError, CallbackListener};
pub use profile::{Identity, MemoryProfileStore, ProfileStore, StoredTokens};
pub use session::{AuthError, Session, SessionManager};
