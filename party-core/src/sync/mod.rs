//! Sync Engine
//!
//! Keeps members' playback in loose lockstep with the host.

mod drift;
mod engine;

pub use drift::{adjusted_position_ms, SyncReport, SyncTarget};
pub use engine::SyncEngine;
