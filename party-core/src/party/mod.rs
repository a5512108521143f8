//! Listening parties
//!
//! Party records, the shared directory, and the per-user membership state
//! machine.

mod code;
mod manager;
mod model;
mod registry;

pub use code::{PartyCode, CODE_LENGTH};
pub use manager::{CodeGenerator, Membership, Participation, PartyManager, Role};
pub use model::{Party, PartyError, PartyMember};
pub use registry::PartyRegistry;
